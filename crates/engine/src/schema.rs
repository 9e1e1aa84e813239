//! Fact schemas and their validation.
//!
//! A schema declares which top-level objects exist in a tenant's facts and
//! which fields each object carries. It is stored as JSON and controls only
//! which variables the expression environment declares; field types are
//! documentation for rule authors, not static types — facts stay dynamically
//! typed all the way down to evaluation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use verdict_core::{Error, Result};

/// Upper bound on objects per schema.
pub const MAX_OBJECTS: usize = 100;
/// Upper bound on fields per object.
pub const MAX_FIELDS_PER_OBJECT: usize = 200;
/// Upper bound on object and field name length.
pub const MAX_NAME_LEN: usize = 100;

/// Words rule expressions reserve; object and field names must avoid them.
pub const RESERVED_WORDS: &[&str] = &[
    "true",
    "false",
    "null",
    "in",
    "as",
    "break",
    "const",
    "continue",
    "else",
    "for",
    "function",
    "if",
    "import",
    "let",
    "loop",
    "package",
    "namespace",
    "return",
    "var",
    "void",
    "while",
];

/// The closed set of scalar type names a schema may use. Case-sensitive,
/// no surrounding whitespace.
pub const SCALAR_TYPES: &[&str] = &[
    "int",
    "int64",
    "float64",
    "string",
    "bool",
    "bytes",
    "timestamp",
    "duration",
];

/// A tenant's fact schema: object name → field name → scalar type name.
///
/// The on-disk representation is the same nested JSON mapping; key order is
/// irrelevant for equality and round-trips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDef(pub BTreeMap<String, BTreeMap<String, String>>);

impl SchemaDef {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Declared object names, in stable (sorted) order.
    pub fn objects(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Validate structure, identifiers and type names.
    ///
    /// Returns the first violation encountered, naming the offending
    /// object, field or type and the rule it breaks.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::InvalidSchema(
                "schema must declare at least one object".to_string(),
            ));
        }
        if self.0.len() > MAX_OBJECTS {
            return Err(Error::InvalidSchema(format!(
                "schema declares {} objects, maximum is {}",
                self.0.len(),
                MAX_OBJECTS
            )));
        }

        for (object, fields) in &self.0 {
            validate_name(object, "object")?;

            if fields.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "object '{}' must declare at least one field",
                    object
                )));
            }
            if fields.len() > MAX_FIELDS_PER_OBJECT {
                return Err(Error::InvalidSchema(format!(
                    "object '{}' declares {} fields, maximum is {}",
                    object,
                    fields.len(),
                    MAX_FIELDS_PER_OBJECT
                )));
            }

            for (field, type_name) in fields {
                validate_name(field, "field").map_err(|e| {
                    Error::InvalidSchema(format!("object '{}': {}", object, e))
                })?;

                if !is_scalar_type(type_name) {
                    return Err(Error::InvalidSchema(format!(
                        "object '{}', field '{}': unknown type '{}' (expected one of: {})",
                        object,
                        field,
                        type_name,
                        SCALAR_TYPES.join(", ")
                    )));
                }
            }
        }

        Ok(())
    }
}

/// `^[A-Za-z_][A-Za-z0-9_]*$`, 1–100 characters.
pub fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

pub fn is_scalar_type(name: &str) -> bool {
    SCALAR_TYPES.contains(&name)
}

fn validate_name(name: &str, what: &str) -> Result<()> {
    if !is_valid_identifier(name) {
        return Err(Error::InvalidSchema(format!(
            "{} name '{}' must match [A-Za-z_][A-Za-z0-9_]* and be 1-{} characters",
            what, name, MAX_NAME_LEN
        )));
    }
    if is_reserved_word(name) {
        return Err(Error::InvalidSchema(format!(
            "{} name '{}' is a reserved word",
            what, name
        )));
    }
    Ok(())
}
