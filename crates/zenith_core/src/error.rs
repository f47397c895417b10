//! Error types for the Zenith core

use std::{io::Error as IoError, path::PathBuf};
use thiserror::Error;

/// Value typing and coercion errors
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("Unknown type tag: {0}")]
    UnknownTypeTag(String),

    #[error("Malformed type tag {tag}: {reason}")]
    MalformedTypeTag { tag: String, reason: String },

    #[error("Cannot convert {found} to {expected}")]
    Mismatch { expected: String, found: String },

    #[error("Value {value} is out of range for {expected}")]
    OutOfRange { expected: String, value: String },

    #[error("Unknown variant {variant} for enum {name}")]
    UnknownVariant { name: String, variant: String },

    #[error("Invalid {kind} literal {value}: {reason}")]
    InvalidLiteral {
        kind: String,
        value: String,
        reason: String,
    },
}

impl ValueError {
    pub(crate) fn mismatch(expected: impl ToString, found: &serde_json::Value) -> Self {
        ValueError::Mismatch {
            expected: expected.to_string(),
            found: describe_json(found).to_string(),
        }
    }
}

/// Short type description of a JSON value, used in log lines and errors
pub(crate) fn describe_json(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(n) if n.is_f64() => "float",
        serde_json::Value::Number(_) => "int",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "dict",
    }
}

/// Relational store errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Unsupported database driver: {0}")]
    UnsupportedDriver(String),

    #[error("Invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Failed to write backup {0}: {1}")]
    BackupWrite(PathBuf, IoError),
}

/// Schema migration errors
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Invalid migration version {0:?}")]
    InvalidVersion(String),

    #[error("Migration {version} failed after {attempts} attempts: {source}")]
    Exhausted {
        version: String,
        attempts: u32,
        #[source]
        source: DatabaseError,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Attribute store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Player {0} is not active")]
    NotActive(u64),

    #[error("Namespace {0} has no registered defaults")]
    UnknownNamespace(String),

    #[error("Failed to serialize namespace {namespace}: {source}")]
    Serialization {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(DatabaseError::Query(e))
    }
}

/// Configuration registry errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration not found: {module}/{group}/{key}")]
    NotFound {
        module: String,
        group: String,
        key: String,
    },

    #[error("Cast error for {key}: stored type is {stored}, requested {requested}")]
    Cast {
        key: String,
        stored: String,
        requested: String,
    },

    #[error("Configuration {module}/{group}/{key} is protected and cannot be modified by {caller}")]
    Protected {
        module: String,
        group: String,
        key: String,
        caller: String,
    },

    #[error("Failed to read config file {0}: {1}")]
    FileRead(PathBuf, IoError),

    #[error("Failed to write config file {0}: {1}")]
    FileWrite(PathBuf, IoError),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, serde_yaml::Error),

    #[error("Failed to serialize module {0}: {1}")]
    Serialize(String, serde_yaml::Error),

    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

// Result type aliases for convenience
pub type ValueResult<T> = Result<T, ValueError>;
pub type DatabaseResult<T> = Result<T, DatabaseError>;
pub type MigrationResult<T> = Result<T, MigrationError>;
pub type StoreResult<T> = Result<T, StoreError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
