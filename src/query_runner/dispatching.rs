//! The concrete query runner over any transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::call_parameters::CallParameters;
use crate::config::RunnerConfig;
use crate::error::AppError;
use crate::graph_constructor::{CypherGraphConstructor, GraphConstructor};
use crate::query_runner::endpoint::{EndpointCall, EndpointCatalog, EndpointType};
use crate::query_runner::progress::{
    ensure_job_id, progress_endpoint, ProgressObserver, ProgressPoll, TracingProgressObserver,
};
use crate::query_runner::session::{Bookmarks, SessionState};
use crate::query_runner::{apply_error_policy, CypherOptions, QueryRunner};
use crate::server_version::ServerVersion;
use crate::tabular::TabularResult;
use crate::transport::{CypherRequest, CypherTransport};

/// Lists the plugin's endpoints of one type.
const SHOW_ENDPOINTS: [(EndpointType, &str); 2] = [
    (
        EndpointType::Procedure,
        "SHOW PROCEDURES YIELD name WHERE name STARTS WITH 'gds.' RETURN name",
    ),
    (
        EndpointType::Function,
        "SHOW FUNCTIONS YIELD name WHERE name STARTS WITH 'gds.' RETURN name",
    ),
];

/// Query runner that shapes calls into Cypher and dispatches them through a
/// [`CypherTransport`].
///
/// Owns the session state: per-call database resolution, bookmark
/// attachment on the way out, and bookmark recording on completion.
///
/// # Example
///
/// ```ignore
/// let transport = HttpTransport::new("http://localhost:7474", "neo4j", Some("password"));
/// let runner = DispatchingRunner::new(transport).with_database(Some("analytics".into()));
///
/// runner.call_procedure("gds.graph.drop", CallOptions::new()
///     .params(call_params!(graph_name = "g"))).await?;
/// ```
pub struct DispatchingRunner<T> {
    transport: Arc<T>,
    session: Arc<SessionState>,
    catalog: RwLock<Option<EndpointCatalog>>,
    server_version: RwLock<Option<ServerVersion>>,
    progress_observer: Arc<dyn ProgressObserver>,
    progress_interval: Duration,
    closed: AtomicBool,
}

impl<T: CypherTransport + 'static> DispatchingRunner<T> {
    /// Creates a runner targeting the server default database.
    pub fn new(transport: T) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    /// Creates a runner over a shared transport.
    pub fn from_arc(transport: Arc<T>) -> Self {
        Self {
            transport,
            session: Arc::new(SessionState::default()),
            catalog: RwLock::new(None),
            server_version: RwLock::new(None),
            progress_observer: Arc::new(TracingProgressObserver::default()),
            progress_interval: Duration::from_millis(500),
            closed: AtomicBool::new(false),
        }
    }

    /// Sets the initial session database.
    pub fn with_database(self, database: Option<String>) -> Self {
        self.session.set_database(database);
        self
    }

    pub fn with_progress_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.progress_observer = observer;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Applies runner settings from configuration.
    pub fn with_config(self, config: &RunnerConfig) -> Self {
        self.with_progress_interval(config.progress_poll_interval())
    }

    /// Checks every endpoint call against `catalog` before dispatch.
    pub fn with_catalog(self, catalog: EndpointCatalog) -> Self {
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Some(catalog);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn server_version(&self) -> Option<ServerVersion> {
        *self
            .server_version
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads the plugin's procedures and functions from the server and
    /// checks subsequent endpoint calls against them.
    pub async fn load_endpoint_catalog(&self) -> Result<EndpointCatalog, AppError> {
        let mut catalog = EndpointCatalog::new();

        for (endpoint_type, statement) in SHOW_ENDPOINTS {
            let result = self
                .execute_tracked(statement, &CallParameters::new(), None)
                .await?;
            for row in result.rows() {
                catalog.register(row.get::<String>("name")?, endpoint_type);
            }
        }

        tracing::debug!(endpoints = catalog.len(), "Loaded endpoint catalog");
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Some(catalog.clone());
        Ok(catalog)
    }

    fn ensure_open(&self) -> Result<(), AppError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Closed);
        }
        Ok(())
    }

    fn check_catalog(&self, call: &EndpointCall) -> Result<(), AppError> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        match catalog.as_ref() {
            Some(catalog) => catalog.check(call.endpoint(), call.endpoint_type()),
            None => Ok(()),
        }
    }

    /// Executes one statement under the current session state and records
    /// the bookmarks it produced.
    async fn execute_tracked(
        &self,
        statement: &str,
        params: &CallParameters,
        database: Option<&str>,
    ) -> Result<TabularResult, AppError> {
        self.ensure_open()?;

        let snapshot = self.session.snapshot(database);
        let request = CypherRequest {
            statement,
            params,
            database: snapshot.database.as_deref(),
            bookmarks: snapshot.bookmarks.as_ref(),
        };

        let outcome = self.transport.execute(request).await?;
        self.session.record_completion(outcome.bookmarks);
        Ok(outcome.result)
    }

    async fn dispatch(&self, mut call: EndpointCall) -> Result<TabularResult, AppError> {
        self.check_catalog(&call)?;

        let job_id = if call.logging() {
            let job_id = ensure_job_id(call.params_mut());
            if job_id.is_none() {
                tracing::debug!(
                    endpoint = call.endpoint(),
                    "No config map to carry a job id; progress logging skipped"
                );
            }
            job_id
        } else {
            None
        };

        let statement = call.statement();
        tracing::debug!(
            endpoint = call.endpoint(),
            endpoint_type = %call.endpoint_type(),
            "Dispatching endpoint call"
        );

        let work = self.execute_tracked(&statement, call.params(), call.database());

        match job_id {
            Some(job_id) => {
                let poll = ProgressPoll {
                    transport: self.transport.clone(),
                    observer: Arc::clone(&self.progress_observer),
                    endpoint: progress_endpoint(self.server_version()),
                    job_id,
                    database: self.session.snapshot(call.database()).database,
                    interval: self.progress_interval,
                };
                poll.around(work).await
            }
            None => work.await,
        }
    }
}

#[async_trait]
impl<T: CypherTransport + 'static> QueryRunner for DispatchingRunner<T> {
    async fn call_endpoint(&self, call: EndpointCall) -> Result<TabularResult, AppError> {
        let custom_error = call.custom_error();
        let endpoint = call.endpoint().to_string();
        self.dispatch(call)
            .await
            .map_err(|e| apply_error_policy(e, custom_error, &endpoint))
    }

    async fn run_cypher(
        &self,
        query: &str,
        options: CypherOptions,
    ) -> Result<TabularResult, AppError> {
        let CypherOptions {
            params,
            database,
            custom_error,
        } = options;
        let params = params.unwrap_or_default();

        tracing::debug!(query, "Running Cypher");
        self.execute_tracked(query, &params, database.as_deref())
            .await
            .map_err(|e| apply_error_policy(e, custom_error, query))
    }

    fn set_database(&self, database: Option<String>) {
        self.session.set_database(database);
    }

    fn database(&self) -> Option<String> {
        self.session.database()
    }

    fn set_bookmarks(&self, bookmarks: Option<Bookmarks>) {
        self.session.set_bookmarks(bookmarks);
    }

    fn bookmarks(&self) -> Option<Bookmarks> {
        self.session.bookmarks()
    }

    fn last_bookmarks(&self) -> Option<Bookmarks> {
        self.session.last_bookmarks()
    }

    fn create_graph_constructor(
        &self,
        graph_name: &str,
        concurrency: usize,
        undirected_relationship_types: Option<Vec<String>>,
    ) -> Box<dyn GraphConstructor> {
        Box::new(CypherGraphConstructor::new(
            self.transport.clone(),
            Arc::clone(&self.session),
            graph_name,
            concurrency,
            undirected_relationship_types.unwrap_or_default(),
        ))
    }

    fn set_server_version(&self, version: &ServerVersion) {
        *self
            .server_version
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(*version);
    }

    async fn close(&self) -> Result<(), AppError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("Closing query runner");
        self.transport.close().await
    }
}
