//! Query evaluation errors

use thiserror::Error;

use crate::storage::StorageError;

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("syntax error in '{expr}' at offset {offset}: {message}")]
    Syntax {
        expr: String,
        offset: usize,
        message: String,
    },

    #[error("variable ${0} is not bound")]
    UnboundVariable(String),

    #[error("no namespace bound to prefix '{0}'")]
    UnboundPrefix(String),

    #[error("effective boolean value is not defined for {0}")]
    NoBooleanValue(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QueryError {
    pub(crate) fn syntax(expr: &str, offset: usize, message: impl Into<String>) -> Self {
        QueryError::Syntax {
            expr: expr.to_string(),
            offset,
            message: message.into(),
        }
    }
}
