//! Application error types and remote error classification.

use thiserror::Error;

/// Neo4j status code reported when a procedure or function does not exist.
const PROCEDURE_NOT_FOUND: &str = "Neo.ClientError.Procedure.ProcedureNotFound";

/// Neo4j status code reported when a procedure threw during execution.
const PROCEDURE_CALL_FAILED: &str = "Neo.ClientError.Procedure.ProcedureCallFailed";

/// Markers the server puts in front of the user-facing reason of a failed call.
const ARGUMENT_MARKERS: [&str; 2] = [
    "java.lang.IllegalArgumentException: ",
    "java.lang.IllegalStateException: ",
];

/// Application-level errors for the query runner.
#[derive(Error, Debug)]
pub enum AppError {
    // Transport errors, surfaced as received
    #[error("Neo4j driver error: {0}")]
    Driver(#[from] neo4rs::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Query runner is closed")]
    Closed,

    // Raw server rejection, as reported by a transport
    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    // Reclassified remote errors
    #[error("Unknown endpoint `{target}`. Is the Graph Data Science plugin installed? ({original})")]
    UnknownEndpoint { target: String, original: String },

    #[error("Invalid argument for `{target}`: {reason} ({original})")]
    InvalidArgument {
        target: String,
        reason: String,
        original: String,
    },

    #[error("Server rejected `{target}` [{code}]: {original}")]
    ServerRejected {
        target: String,
        code: String,
        original: String,
    },

    // Configuration errors, reported before dispatch
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid call: {0}")]
    InvalidCall(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote call could not be completed.
    Transport,
    /// The server rejected or failed the call.
    RemoteExecution,
    /// Invalid endpoint, call shape or settings. Never sent to the server.
    Configuration,
    /// Local failure decoding a result.
    Internal,
}

impl AppError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Driver(neo4rs::Error::Neo4j(_)) => ErrorKind::RemoteExecution,
            AppError::Driver(_) | AppError::Http(_) | AppError::Transport(_) | AppError::Closed => {
                ErrorKind::Transport
            }
            AppError::Remote { .. }
            | AppError::UnknownEndpoint { .. }
            | AppError::InvalidArgument { .. }
            | AppError::ServerRejected { .. } => ErrorKind::RemoteExecution,
            AppError::InvalidEndpoint(_) | AppError::InvalidCall(_) | AppError::Config(_) => {
                ErrorKind::Configuration
            }
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the server status code and message of a raw remote error.
    ///
    /// Returns `None` for anything that is not an unclassified server rejection.
    pub fn remote_failure(&self) -> Option<(&str, &str)> {
        match self {
            AppError::Driver(neo4rs::Error::Neo4j(e)) => Some((e.code(), e.message())),
            AppError::Remote { code, message } => Some((code, message)),
            _ => None,
        }
    }

    /// Re-expresses a raw remote error in the application's own vocabulary.
    ///
    /// `target` names what was being called (an endpoint or a query). Only
    /// raw remote errors change; transport, configuration and already
    /// reclassified errors are returned as they are.
    pub fn reclassify(self, target: &str) -> AppError {
        let Some((code, message)) = self.remote_failure() else {
            return self;
        };

        let target = target.to_string();
        let original = message.to_string();

        if code == PROCEDURE_NOT_FOUND
            || message.starts_with("There is no procedure with the name")
            || message.starts_with("Unknown function")
        {
            return AppError::UnknownEndpoint { target, original };
        }

        if code == PROCEDURE_CALL_FAILED {
            if let Some(reason) = argument_reason(message) {
                return AppError::InvalidArgument {
                    target,
                    reason,
                    original,
                };
            }
        }

        AppError::ServerRejected {
            target,
            code: code.to_string(),
            original,
        }
    }
}

/// Extracts the user-facing reason from a wrapped server exception message.
fn argument_reason(message: &str) -> Option<String> {
    ARGUMENT_MARKERS.iter().find_map(|marker| {
        message
            .find(marker)
            .map(|idx| message[idx + marker.len()..].trim().to_string())
    })
}
