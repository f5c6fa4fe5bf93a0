//! Error Types
//!
//! Every fallible operation in the engine returns [`GraphError`]. Errors
//! raised by vertex bodies travel through the same type, so a nested vertex
//! call can be propagated with `?` all the way to the outermost caller.

use std::error::Error as StdError;

use thiserror::Error;

/// Errors produced while evaluating or mutating the vertex graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A binding was re-entered while already on the evaluation stack.
    #[error("cycle detected: {path}")]
    Cycle {
        /// The offending chain, outermost caller first, e.g. `A.x -> A.y -> A.x`.
        path: String,
    },

    /// An input was mutated while a calculation was running on this thread.
    #[error("cannot change {binding} while a calculation is in progress")]
    MutationDuringCalculation {
        /// The binding the caller tried to change.
        binding: String,
    },

    /// A diddle was written or cleared with no scope open on this thread.
    #[error("cannot diddle {binding}: no diddle scope is open on this thread")]
    InvalidScopeUsage {
        /// The binding the caller tried to diddle.
        binding: String,
    },

    /// A stored value did not have the type the vertex declares.
    #[error("stored value for {binding} has an unexpected type")]
    TypeMismatch {
        /// The binding whose value failed to downcast.
        binding: String,
    },

    /// An error raised by a vertex body.
    #[error(transparent)]
    Computation(Box<dyn StdError + Send + Sync>),
}

impl GraphError {
    /// Wrap an arbitrary error raised by a vertex body.
    pub fn computation<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::Computation(error.into())
    }

    /// Check whether this error is a cycle error.
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computation_keeps_message() {
        let err = GraphError::computation("division by zero");
        assert_eq!(err.to_string(), "division by zero");
        assert!(!err.is_cycle());
    }

    #[test]
    fn cycle_message_names_path() {
        let err = GraphError::Cycle {
            path: "A.x -> A.y -> A.x".to_string(),
        };
        assert!(err.is_cycle());
        assert_eq!(err.to_string(), "cycle detected: A.x -> A.y -> A.x");
    }
}
