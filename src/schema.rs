use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use jsonschema::JSONSchema;
use serde_json::Value;
use thiserror::Error;

/// Fixture directory shipped next to the crate sources.
pub const SCHEMA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/json_schemas");

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema file `{}` not found", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read schema file `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("schema file `{}` is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("schema can not be compiled: {0}")]
    Compile(String),

    #[error("document does not match schema: {}", join_violations(.0))]
    Invalid(Vec<Violation>),
}

/// One failed constraint, located by the JSON pointer of the offending value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Reads schema documents from a directory. Every call goes to disk.
#[derive(Debug, Clone)]
pub struct SchemaLoader {
    dir: PathBuf,
}

impl Default for SchemaLoader {
    fn default() -> Self {
        Self::new(SCHEMA_DIR)
    }
}

impl SchemaLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, name: &str) -> Result<Value, SchemaError> {
        let path = self.dir.join(name);

        let contents = std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                SchemaError::NotFound(path.clone())
            } else {
                SchemaError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&contents).map_err(|source| SchemaError::Parse { path, source })
    }
}

/// Checks `instance` against `schema`, reporting every violation rather than
/// the first one.
pub fn validate(schema: &Value, instance: &Value) -> Result<(), SchemaError> {
    let compiled =
        JSONSchema::compile(schema).map_err(|error| SchemaError::Compile(error.to_string()))?;

    if let Err(errors) = compiled.validate(instance) {
        let violations = errors
            .map(|error| {
                let path = error.instance_path.to_string();
                Violation {
                    path: if path.is_empty() { "/".into() } else { path },
                    message: error.to_string(),
                }
            })
            .collect();

        return Err(SchemaError::Invalid(violations));
    }

    Ok(())
}
