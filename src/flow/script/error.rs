// SPDX-License-Identifier: MIT

//! Errors raised while parsing or evaluating a fragment

use thiserror::Error;

/// A failure inside a fragment
///
/// Variant names follow the runtime failure classes fragment authors already
/// know, so the message reads naturally when surfaced to them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("SyntaxError: {message} (line {line})")]
    Syntax { message: String, line: usize },

    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("ValueError: {0}")]
    Value(String),

    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),

    #[error("IndexError: {0}")]
    Index(String),

    #[error("KeyError: {0}")]
    Key(String),

    #[error("AttributeError: {0}")]
    Attribute(String),

    #[error("ImportError: {0}")]
    Import(String),

    #[error("OverflowError: {0}")]
    Overflow(String),

    #[error("fragment exceeded its budget of {0} evaluation steps")]
    StepLimit(u64),
}

impl ScriptError {
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            line,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::Value(message.into())
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;
