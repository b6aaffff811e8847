//! Wire transports the query runner dispatches through.
//!
//! Each transport implements [`CypherTransport`]: execute one Cypher
//! statement against an optional database, attaching the given causal
//! bookmarks, and report the normalized result together with the bookmarks
//! the server produced.
//!
//! # Available Transports
//!
//! | Transport | Module | Bookmarks |
//! |-----------|--------|-----------|
//! | Bolt (neo4rs driver) | [`bolt`] | not surfaced by the driver |
//! | Neo4j Query API (HTTP) | [`http`] | sent and received |
//!
//! # Implementing a Transport
//!
//! 1. Create a transport struct holding the connection (e.g., `BoltTransport`)
//! 2. Map parameters from JSON to the wire representation
//! 3. Normalize rows into a [`TabularResult`]
//! 4. Map server rejections so that [`AppError::remote_failure`] sees them
//! 5. Optionally override [`close`](CypherTransport::close)

pub mod bolt;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::call_parameters::CallParameters;
use crate::error::AppError;
use crate::query_runner::Bookmarks;
use crate::tabular::TabularResult;

pub use bolt::BoltTransport;
pub use http::HttpTransport;

/// One statement to execute, with the session state it runs under.
#[derive(Debug, Clone, Copy)]
pub struct CypherRequest<'a> {
    pub statement: &'a str,
    pub params: &'a CallParameters,
    /// Target database. `None` means the server default.
    pub database: Option<&'a str>,
    /// Bookmarks the server must have caught up to before running the statement.
    pub bookmarks: Option<&'a Bookmarks>,
}

/// What a completed statement produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub result: TabularResult,
    /// Bookmarks after the statement's transaction, if the transport reports them.
    pub bookmarks: Option<Bookmarks>,
}

/// Executes Cypher statements against a graph database server.
///
/// This is the single wire seam of the crate: procedure calls, function
/// calls, raw queries, progress polling and graph construction all reach
/// the server through [`execute`](CypherTransport::execute).
#[async_trait]
pub trait CypherTransport: Send + Sync {
    /// Executes a statement and waits for it, and its transaction, to complete.
    async fn execute(&self, request: CypherRequest<'_>) -> Result<QueryOutcome, AppError>;

    /// Releases connections held by the transport.
    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl<T: CypherTransport + ?Sized> CypherTransport for Arc<T> {
    async fn execute(&self, request: CypherRequest<'_>) -> Result<QueryOutcome, AppError> {
        (**self).execute(request).await
    }

    async fn close(&self) -> Result<(), AppError> {
        (**self).close().await
    }
}

#[async_trait]
impl<T: CypherTransport + ?Sized> CypherTransport for Box<T> {
    async fn execute(&self, request: CypherRequest<'_>) -> Result<QueryOutcome, AppError> {
        (**self).execute(request).await
    }

    async fn close(&self) -> Result<(), AppError> {
        (**self).close().await
    }
}
