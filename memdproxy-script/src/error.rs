//! Script host error types.

use thiserror::Error;

/// Errors produced by the script host.
///
/// Compile errors are fatal at startup; runtime and marshal errors are
/// logged per invocation and never tear down a connection.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script compile error: {0}")]
    Compile(String),

    #[error("script runtime error: {0}")]
    Runtime(String),

    #[error("marshal error: {0}")]
    Marshal(String),
}

impl From<mlua::Error> for ScriptError {
    fn from(err: mlua::Error) -> Self {
        ScriptError::Runtime(err.to_string())
    }
}
