//! gds-client - Graph Data Science query runner
//!
//! Calls server-side Graph Data Science procedures and functions, runs raw
//! Cypher, and threads session database and causal bookmarks through every
//! call, over either the Bolt protocol or the HTTP Query API.

pub mod call_parameters;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod graph_constructor;
pub mod query_runner;
pub mod server_version;
pub mod tabular;
pub mod transport;

pub use call_parameters::CallParameters;
pub use error::{AppError, ErrorKind};
pub use query_runner::{CallExt, CallOptions, CypherOptions, DispatchingRunner, QueryRunner};
pub use server_version::ServerVersion;
pub use tabular::TabularResult;
