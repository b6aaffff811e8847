//! Query runner: one call surface for procedures, functions and Cypher.
//!
//! # Architecture
//!
//! - [`QueryRunner`] - the polymorphic contract every runner implements
//! - [`EndpointCall`] - a validated procedure or function invocation
//! - [`SessionState`] - target database and causal bookmarks
//! - [`DispatchingRunner`] - the concrete runner over any
//!   [`CypherTransport`](crate::transport::CypherTransport)
//!
//! Procedure and function calls both flow through the single dispatch
//! primitive [`QueryRunner::call_endpoint`]; they differ only in the
//! [`EndpointType`] they carry.
//!
//! # Usage
//!
//! ```ignore
//! use gds_client::query_runner::{CallExt, CallOptions, DispatchingRunner, QueryRunner};
//!
//! let runner = DispatchingRunner::new(transport);
//! runner.set_database(Some("analytics".into()));
//!
//! // Procedure, all fields
//! let graphs = runner.call_procedure("gds.graph.list", CallOptions::new()).await?;
//!
//! // Procedure through the fluent builder, with progress logging
//! let stats = runner
//!     .procedure("gds.pageRank.write")
//!     .param("graph_name", "g")
//!     .param("config", serde_json::json!({"writeProperty": "rank"}))
//!     .yields(["nodePropertiesWritten"])
//!     .logging(true)
//!     .fetch()
//!     .await?;
//!
//! // Raw Cypher
//! let rows = runner.run_cypher("RETURN 1 AS x", CypherOptions::new()).await?;
//! ```

mod dispatching;
mod endpoint;
mod progress;
mod session;

pub use dispatching::DispatchingRunner;
pub use endpoint::{
    shape_call, validate_endpoint_name, EndpointCall, EndpointCatalog, EndpointType,
    FUNCTION_VALUE_COLUMN,
};
pub use progress::{
    ensure_job_id, progress_endpoint, ProgressObserver, TracingProgressObserver, CONFIG_PARAM,
    JOB_ID_KEY,
};
pub use session::{Bookmarks, SessionSnapshot, SessionState};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::call_parameters::CallParameters;
use crate::error::AppError;
use crate::graph_constructor::GraphConstructor;
use crate::server_version::ServerVersion;
use crate::tabular::TabularResult;

/// Optional arguments of a procedure or function call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    pub params: Option<CallParameters>,
    /// Fields to project. `None` returns all fields.
    pub yields: Option<Vec<String>>,
    /// Database for this call only. `None` uses the session database.
    pub database: Option<String>,
    /// Stream progress while a procedure runs. Rejected for functions.
    pub logging: bool,
    /// Reclassify remote errors into [`AppError`]'s own variants.
    pub custom_error: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            params: None,
            yields: None,
            database: None,
            logging: false,
            custom_error: true,
        }
    }
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: CallParameters) -> Self {
        self.params = Some(params);
        self
    }

    pub fn yields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.yields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn custom_error(mut self, custom_error: bool) -> Self {
        self.custom_error = custom_error;
        self
    }
}

/// Optional arguments of a raw Cypher query.
#[derive(Debug, Clone, PartialEq)]
pub struct CypherOptions {
    pub params: Option<CallParameters>,
    pub database: Option<String>,
    pub custom_error: bool,
}

impl Default for CypherOptions {
    fn default() -> Self {
        Self {
            params: None,
            database: None,
            custom_error: true,
        }
    }
}

impl CypherOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: CallParameters) -> Self {
        self.params = Some(params);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn custom_error(mut self, custom_error: bool) -> Self {
        self.custom_error = custom_error;
        self
    }
}

/// Applies the `custom_error` policy to a failed call.
pub(crate) fn apply_error_policy(err: AppError, custom_error: bool, target: &str) -> AppError {
    if custom_error {
        err.reclassify(target)
    } else {
        err
    }
}

/// The query runner contract.
///
/// Runners are session-scoped: they own a target database and causal
/// bookmarks that every call reads and every completed call updates.
/// A runner may be shared behind an `Arc`; session reads and writes are
/// serialized by the implementation.
///
/// No call returns before the remote operation, and its bookmark side
/// effect, has completed. Dropping a call's future does not undo whatever
/// the server may already have done.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// The dispatch primitive behind [`call_procedure`](Self::call_procedure)
    /// and [`call_function`](Self::call_function).
    ///
    /// Performs the remote call and records the bookmarks it produced in
    /// the session before returning.
    async fn call_endpoint(&self, call: EndpointCall) -> Result<TabularResult, AppError>;

    /// Calls a server-side procedure.
    ///
    /// With `logging`, progress is forwarded to the runner's progress
    /// observer while the procedure runs.
    async fn call_procedure(
        &self,
        endpoint: &str,
        options: CallOptions,
    ) -> Result<TabularResult, AppError> {
        let custom_error = options.custom_error;
        let call = EndpointCall::new(EndpointType::Procedure, endpoint, options)?;
        self.call_endpoint(call)
            .await
            .map_err(|e| apply_error_policy(e, custom_error, endpoint))
    }

    /// Calls a server-side function.
    ///
    /// Functions have no progress channel: `logging = true` is rejected
    /// with [`AppError::InvalidCall`] before anything is sent.
    async fn call_function(
        &self,
        endpoint: &str,
        options: CallOptions,
    ) -> Result<TabularResult, AppError> {
        let custom_error = options.custom_error;
        let call = EndpointCall::new(EndpointType::Function, endpoint, options)?;
        self.call_endpoint(call)
            .await
            .map_err(|e| apply_error_policy(e, custom_error, endpoint))
    }

    /// Runs a raw Cypher query.
    async fn run_cypher(
        &self,
        query: &str,
        options: CypherOptions,
    ) -> Result<TabularResult, AppError>;

    /// Sets the database targeted by subsequent calls. `None` reverts to the
    /// server default. Calls already in flight are unaffected.
    fn set_database(&self, database: Option<String>);

    fn database(&self) -> Option<String>;

    /// Sets the bookmarks attached to the next outgoing call.
    fn set_bookmarks(&self, bookmarks: Option<Bookmarks>);

    /// Bookmarks the next outgoing call will carry.
    fn bookmarks(&self) -> Option<Bookmarks>;

    /// Bookmarks produced by the most recently completed call.
    fn last_bookmarks(&self) -> Option<Bookmarks>;

    /// Creates a handle that bulk-loads data into a named server-side graph.
    ///
    /// The handle captures the session database and bookmarks at the time
    /// of this call.
    fn create_graph_constructor(
        &self,
        graph_name: &str,
        concurrency: usize,
        undirected_relationship_types: Option<Vec<String>>,
    ) -> Box<dyn GraphConstructor>;

    /// Informs the runner of the server plugin version. Ignored by default.
    fn set_server_version(&self, _version: &ServerVersion) {}

    /// Releases runner-held resources. A no-op by default.
    ///
    /// Safe to call more than once. Must not be called while other calls
    /// on this runner are still in flight.
    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Detects the server plugin version and hands it to the runner.
pub async fn detect_server_version<R: QueryRunner + ?Sized>(
    runner: &R,
) -> Result<ServerVersion, AppError> {
    let result = runner
        .call_function("gds.version", CallOptions::new().yields(["version"]))
        .await?;

    let version: ServerVersion = result
        .squeeze()
        .and_then(JsonValue::as_str)
        .ok_or_else(|| AppError::Internal("gds.version returned no version".into()))?
        .parse()?;

    tracing::debug!(%version, "Detected server version");
    runner.set_server_version(&version);
    Ok(version)
}

/// A fluent builder for one procedure or function call.
///
/// # Example
///
/// ```ignore
/// let exists: bool = runner
///     .function("gds.graph.exists")
///     .param("graph_name", "g")
///     .fetch_scalar()
///     .await?;
/// ```
pub struct Call<'a, R: QueryRunner + ?Sized> {
    runner: &'a R,
    endpoint_type: EndpointType,
    endpoint: String,
    params: CallParameters,
    options: CallOptions,
    error: Option<AppError>,
}

impl<'a, R: QueryRunner + ?Sized> Call<'a, R> {
    pub fn new(runner: &'a R, endpoint_type: EndpointType, endpoint: &str) -> Self {
        Self {
            runner,
            endpoint_type,
            endpoint: endpoint.to_string(),
            params: CallParameters::new(),
            options: CallOptions::new(),
            error: None,
        }
    }

    /// Adds a positional parameter.
    ///
    /// A value that fails to serialize is reported when the call is fetched.
    pub fn param<T: Serialize>(mut self, name: &str, value: T) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.params.insert(name, value) {
                self.error = Some(AppError::InvalidCall(format!(
                    "parameter `{}` cannot be serialized: {}",
                    name, e
                )));
            }
        }
        self
    }

    pub fn yields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.yields(fields);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.options = self.options.database(database);
        self
    }

    pub fn logging(mut self, logging: bool) -> Self {
        self.options = self.options.logging(logging);
        self
    }

    pub fn custom_error(mut self, custom_error: bool) -> Self {
        self.options = self.options.custom_error(custom_error);
        self
    }

    /// Executes the call and returns the full result.
    pub async fn fetch(self) -> Result<TabularResult, AppError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let options = self.options.params(self.params);
        match self.endpoint_type {
            EndpointType::Procedure => self.runner.call_procedure(&self.endpoint, options).await,
            EndpointType::Function => self.runner.call_function(&self.endpoint, options).await,
        }
    }

    /// Executes the call and deserializes its single value.
    pub async fn fetch_scalar<T: DeserializeOwned>(self) -> Result<T, AppError> {
        let endpoint = self.endpoint.clone();
        let result = self.fetch().await?;
        let value = result.squeeze().ok_or_else(|| {
            AppError::Internal(format!(
                "`{}` returned {} rows and {} columns, expected a single value",
                endpoint,
                result.len(),
                result.columns().len()
            ))
        })?;
        serde_json::from_value(value.clone())
            .map_err(|e| AppError::Internal(format!("failed to deserialize result: {}", e)))
    }
}

/// Extension trait providing `procedure()` and `function()` builders.
///
/// Automatically implemented for every [`QueryRunner`].
pub trait CallExt: QueryRunner {
    fn procedure(&self, endpoint: &str) -> Call<'_, Self> {
        Call::new(self, EndpointType::Procedure, endpoint)
    }

    fn function(&self, endpoint: &str) -> Call<'_, Self> {
        Call::new(self, EndpointType::Function, endpoint)
    }
}

impl<R: QueryRunner + ?Sized> CallExt for R {}
