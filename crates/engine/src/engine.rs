//! Per-tenant evaluation engine.
//!
//! An [`Engine`] owns one expression environment, the map of compiled
//! programs for its tenant's rules, and the active-rule cache. Rule
//! mutations keep the program map and the store consistent (compile before
//! write, roll back on store failure); evaluations run entirely in memory —
//! the only store access on the evaluate-all path is a single `list_active`
//! read when the cache is cold.
//!
//! Concurrency: the program map sits behind a read-write lock that is never
//! held across an await or during program execution. Readers (evaluations)
//! proceed in parallel; a writer (rule mutation) briefly excludes them.

use crate::cache::ActiveRuleCache;
use crate::env::ExprEnv;
use crate::model::{NewRule, Rule, RuleResult};
use crate::store::RuleStore;
use parking_lot::RwLock;
use rhai::AST;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use verdict_core::metrics::EngineMetrics;
use verdict_core::{logging, Error, Result};

/// A compiled rule. The display name rides along so evaluations never
/// read the store to label their results; the program itself is behind an
/// `Arc` so lookups hand it out without holding the map lock during
/// execution.
struct Program {
    name: String,
    ast: Arc<AST>,
}

/// A rule that failed to compile during a lenient engine build.
#[derive(Debug, Clone)]
pub struct CompileFailure {
    pub rule_id: String,
    pub name: String,
    pub error: String,
}

pub struct Engine {
    env: ExprEnv,
    store: Arc<dyn RuleStore>,
    programs: RwLock<HashMap<String, Program>>,
    active: ActiveRuleCache,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine and compile every active rule.
    ///
    /// Any rule that fails to compile aborts construction; used at process
    /// start and tenant creation, where a broken rule set must be fatal.
    pub async fn new(env: ExprEnv, store: Arc<dyn RuleStore>) -> Result<Self> {
        let engine = Self::empty(env, store);
        let rules = engine.store.list_active().await?;
        for rule in &rules {
            engine.compile_rule(&rule.id, &rule.name, &rule.expression)?;
        }
        engine.active.set(&rules);
        Ok(engine)
    }

    /// Lenient variant used for schema swaps: rules that no longer compile
    /// under the new environment are skipped and reported instead of
    /// aborting the swap.
    pub async fn rebuild(
        env: ExprEnv,
        store: Arc<dyn RuleStore>,
    ) -> Result<(Self, Vec<CompileFailure>)> {
        let engine = Self::empty(env, store);
        let rules = engine.store.list_active().await?;
        let mut skipped = Vec::new();
        for rule in &rules {
            if let Err(e) = engine.compile_rule(&rule.id, &rule.name, &rule.expression) {
                skipped.push(CompileFailure {
                    rule_id: rule.id.clone(),
                    name: rule.name.clone(),
                    error: e.to_string(),
                });
            }
        }
        engine.active.set(&rules);
        Ok((engine, skipped))
    }

    fn empty(env: ExprEnv, store: Arc<dyn RuleStore>) -> Self {
        Self {
            env,
            store,
            programs: RwLock::new(HashMap::new()),
            active: ActiveRuleCache::new(),
        }
    }

    pub fn env(&self) -> &ExprEnv {
        &self.env
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    /// Number of compiled programs currently held.
    pub fn program_count(&self) -> usize {
        self.programs.read().len()
    }

    pub fn has_program(&self, id: &str) -> bool {
        self.programs.read().contains_key(id)
    }

    /// Compile an expression and commit the program under the write lock.
    fn compile_rule(&self, id: &str, name: &str, expression: &str) -> Result<()> {
        let metrics = EngineMetrics::global();
        let ast = match self.env.compile(expression) {
            Ok(ast) => ast,
            Err(e) => {
                metrics.compile_errors_total.inc();
                return Err(e);
            }
        };
        metrics.compilations_total.inc();
        self.programs.write().insert(
            id.to_string(),
            Program {
                name: name.to_string(),
                ast: Arc::new(ast),
            },
        );
        Ok(())
    }

    /// Add a rule: probe for duplicates, compile, persist, invalidate.
    ///
    /// The store write comes after the compile so an invalid expression
    /// never reaches the database; a store failure rolls the cached
    /// program back out.
    pub async fn add_rule(&self, rule: NewRule) -> Result<Rule> {
        match self.store.get(&rule.id).await {
            Ok(_) => {
                return Err(Error::RuleAlreadyExists {
                    id: rule.id.clone(),
                })
            }
            Err(Error::RuleNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        self.compile_rule(&rule.id, &rule.name, &rule.expression)?;

        match self.store.add(&rule).await {
            Ok(stored) => {
                self.active.invalidate();
                Ok(stored)
            }
            Err(e) => {
                self.programs.write().remove(&rule.id);
                Err(e)
            }
        }
    }

    /// Update a rule: fetch-old, compile-new, persist, then commit the
    /// program. In this order a store failure leaves the old program in
    /// place and an invalid expression never touches the store.
    pub async fn update_rule(&self, rule: NewRule) -> Result<Rule> {
        self.store.get(&rule.id).await?;

        let metrics = EngineMetrics::global();
        let ast = match self.env.compile(&rule.expression) {
            Ok(ast) => ast,
            Err(e) => {
                metrics.compile_errors_total.inc();
                return Err(e);
            }
        };

        let stored = self.store.update(&rule).await?;

        metrics.compilations_total.inc();
        self.programs.write().insert(
            rule.id.clone(),
            Program {
                name: rule.name.clone(),
                ast: Arc::new(ast),
            },
        );
        self.active.invalidate();
        Ok(stored)
    }

    /// Delete a rule from the store, then drop its program. A store
    /// failure leaves the caches untouched.
    pub async fn delete_rule(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        self.programs.write().remove(id);
        self.active.invalidate();
        Ok(())
    }

    /// Evaluate a single rule.
    ///
    /// Evaluation-level failures (cost ceiling, missing field, type error,
    /// known-but-uncompiled rule) come back inside the result with
    /// `matched = false` and the error populated. `Err` is reserved for
    /// rules this tenant does not own (`RuleNotFound`) and store failures.
    pub async fn evaluate(&self, id: &str, facts: &Value) -> Result<RuleResult> {
        let program = {
            let programs = self.programs.read();
            programs.get(id).map(|p| (p.name.clone(), p.ast.clone()))
        };

        match program {
            Some((name, ast)) => Ok(self.run(id, &name, &ast, facts)),
            None => {
                // Unknown rule vs. known-but-uncompiled: one store read,
                // which also surfaces the rule's display name.
                let rule = self.store.get(id).await?;
                Ok(RuleResult::failed(id, rule.name, "rule is not compiled"))
            }
        }
    }

    /// Evaluate every active rule, in stored order.
    ///
    /// Per-rule failures are captured in their results and the loop
    /// continues; the call itself fails only when a cold cache forces a
    /// store read and that read fails. Warm caches issue no queries at
    /// all — there is never one query per rule.
    pub async fn evaluate_all(&self, facts: &Value) -> Result<Vec<RuleResult>> {
        let rules = self.active_list().await?;

        let mut results = Vec::with_capacity(rules.len());
        for rule in &rules {
            let program = {
                let programs = self.programs.read();
                programs
                    .get(&rule.id)
                    .map(|p| (p.name.clone(), p.ast.clone()))
            };
            let result = match program {
                Some((name, ast)) => self.run(&rule.id, &name, &ast, facts),
                None => RuleResult::failed(&rule.id, &rule.name, "rule is not compiled"),
            };
            results.push(result);
        }
        Ok(results)
    }

    /// The tenant's active rules, cache-first.
    pub async fn active_list(&self) -> Result<Vec<Rule>> {
        let metrics = EngineMetrics::global();
        if let Some(rules) = self.active.get() {
            metrics.cache_hits_total.inc();
            return Ok(rules);
        }
        metrics.cache_misses_total.inc();
        let rules = self.store.list_active().await?;
        self.active.set(&rules);
        Ok(rules)
    }

    fn run(&self, id: &str, name: &str, ast: &AST, facts: &Value) -> RuleResult {
        let metrics = EngineMetrics::global();
        metrics.evaluations_total.inc();

        match self.env.eval(ast, facts) {
            Ok(value) => {
                let trace = rhai::serde::from_dynamic::<Value>(&value).ok();
                match value.as_bool() {
                    Ok(true) => RuleResult::matched(id, name, trace),
                    // non-boolean results do not match, and carry no error
                    Ok(false) | Err(_) => RuleResult::unmatched(id, name, trace),
                }
            }
            Err(e) => {
                metrics.evaluation_errors_total.inc();
                if logging::sampler().should_log() {
                    warn!(rule = id, "rule evaluation failed: {}", e);
                } else {
                    metrics.suppressed_logs_total.inc();
                }
                RuleResult::failed(id, name, e.to_string())
            }
        }
    }
}
