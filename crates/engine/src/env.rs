//! Sandboxed expression environment.
//!
//! One [`ExprEnv`] is built per tenant engine from the tenant's schema. It
//! wraps a locked-down [`rhai::Engine`] that declares one top-level variable
//! per schema object and enforces the evaluation cost ceiling. The
//! environment is immutable once built and shared by every program compiled
//! in its engine.

use crate::schema::SchemaDef;
use rhai::{Dynamic, Scope, AST};
use serde_json::Value;
use verdict_core::{Error, Result};

/// Hard ceiling on evaluation cost, in interpreter operations. Exceeding it
/// aborts the evaluation deterministically with a per-rule error.
pub const MAX_EVAL_COST: u64 = 1_000_000;

const MAX_CALL_DEPTH: usize = 64;
const MAX_STRING_SIZE: usize = 1024 * 1024; // 1MB
const MAX_ARRAY_SIZE: usize = 10_000;
const MAX_MAP_SIZE: usize = 10_000;

/// A compiled-expression environment for one schema.
pub struct ExprEnv {
    engine: rhai::Engine,
    /// Declared top-level variable names, in stable (sorted) order. The
    /// compile-time scope and every evaluation scope push them in this
    /// exact order.
    variables: Vec<String>,
}

impl std::fmt::Debug for ExprEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExprEnv")
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

impl ExprEnv {
    /// Build an environment from a schema.
    ///
    /// An empty schema is valid here and yields an environment that can
    /// only compile expressions referencing no variables (e.g. `true`).
    pub fn new(schema: &SchemaDef) -> Self {
        let mut engine = rhai::Engine::new();

        // Security posture: bounded cost, bounded shapes, no expansion
        // facilities, and unknown identifiers rejected at compile time.
        engine.set_max_operations(MAX_EVAL_COST);
        engine.set_max_call_levels(MAX_CALL_DEPTH);
        engine.set_max_string_size(MAX_STRING_SIZE);
        engine.set_max_array_size(MAX_ARRAY_SIZE);
        engine.set_max_map_size(MAX_MAP_SIZE);
        engine.set_strict_variables(true);
        engine.set_fail_on_invalid_map_property(true);
        engine.disable_symbol("eval");

        let variables = schema.objects().map(String::from).collect();

        Self { engine, variables }
    }

    /// Declared top-level variable names.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Compile an expression into a program.
    ///
    /// Syntax errors and references to undeclared variables are rejected
    /// here; the returned error carries the compiler diagnostic.
    pub fn compile(&self, expression: &str) -> Result<AST> {
        let scope = self.declaration_scope();
        self.engine
            .compile_with_scope(&scope, expression)
            .map_err(|e| Error::InvalidExpression(e.to_string()))
    }

    /// Execute a compiled program against a fact payload.
    ///
    /// Facts are a JSON mapping of object name → field mapping. Declared
    /// objects absent from the payload are bound to empty maps, so field
    /// access on them fails the same way a missing field does: with an
    /// evaluation error, not a panic or a silent mismatch.
    pub fn eval(&self, ast: &AST, facts: &Value) -> Result<Dynamic> {
        let mut scope = Scope::new();
        for name in &self.variables {
            let bound = match facts.get(name) {
                Some(value) => rhai::serde::to_dynamic(value)
                    .map_err(|e| Error::Evaluation(e.to_string()))?,
                None => Dynamic::from(rhai::Map::new()),
            };
            scope.push_dynamic(name.as_str(), bound);
        }

        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map_err(|e| Error::Evaluation(e.to_string()))
    }

    /// Scope holding the declared variables, used at compile time so that
    /// strict-variables mode can resolve them.
    fn declaration_scope(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        for name in &self.variables {
            scope.push_dynamic(name.as_str(), Dynamic::UNIT);
        }
        scope
    }
}
