//! Error types for configuration, address-space binding and method invocation.

use thiserror::Error;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for address-space operations.
pub type BindingResult<T> = Result<T, BindingError>;

/// Result type for remote valve invocations.
pub type InvocationResult<T> = Result<T, InvocationError>;

/// Errors raised while loading the XML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config document: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Invalid config: {what}")]
    Invalid { what: String },
}

/// Errors raised by the address space while nodes are created or updated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindingError {
    #[error("Node already exists: {path}")]
    DuplicateNode { path: String },

    #[error("Unknown node: {path}")]
    UnknownNode { path: String },

    #[error("Could not register namespace {uri}")]
    Namespace { uri: String },

    #[error("Address space rejected node {path}")]
    Insert { path: String },
}

/// Errors returned to a remote caller when a valve method is invoked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Missing argument: {name}")]
    MissingArgument { name: &'static str },

    #[error("Expected {expected} arguments, got {got}")]
    TooManyArguments { expected: usize, got: usize },

    #[error("Argument {name} must be an unsigned integer, got {found}")]
    TypeMismatch { name: &'static str, found: String },

    #[error("Argument {name} must not be negative, got {value}")]
    Negative { name: &'static str, value: i64 },

    #[error("Argument {name} out of range: {value} > {max}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        max: u32,
    },

    #[error("{kind} valve does not support {operation}")]
    Unsupported {
        kind: &'static str,
        operation: &'static str,
    },
}

/// Top-level error for server setup.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("OPC UA server could not be built: {what}")]
    Server { what: String },
}
