//! Graph construction handles.
//!
//! A [`GraphConstructor`] is obtained from
//! [`QueryRunner::create_graph_constructor`](crate::query_runner::QueryRunner::create_graph_constructor)
//! and is the only channel through which bulk data becomes a named graph on
//! the server. It is consumed by [`run`](GraphConstructor::run).
//!
//! # Input frames
//!
//! Node frames need a `nodeId` column and may carry `labels` (a string or a
//! list of strings); every other column is a node property.
//!
//! Relationship frames need `sourceNodeId` and `targetNodeId` and may carry
//! `relationshipType`; every other column is a relationship property.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use crate::call_parameters::CallParameters;
use crate::error::AppError;
use crate::query_runner::{Bookmarks, SessionSnapshot, SessionState};
use crate::tabular::TabularResult;
use crate::transport::{CypherRequest, CypherTransport};

pub const NODE_ID: &str = "nodeId";
pub const LABELS: &str = "labels";
pub const SOURCE_NODE_ID: &str = "sourceNodeId";
pub const TARGET_NODE_ID: &str = "targetNodeId";
pub const RELATIONSHIP_TYPE: &str = "relationshipType";

/// Projects every row through Cypher aggregation in a single statement.
const PROJECT_STATEMENT: &str = "UNWIND $rows AS row \
WITH gds.graph.project($graph_name, row.source, row.target, row.data, \
{undirectedRelationshipTypes: $undirected_relationship_types, readConcurrency: $concurrency}) AS g \
RETURN g.graphName AS graphName, g.nodeCount AS nodeCount, g.relationshipCount AS relationshipCount";

/// Materializes bulk data as a named server-side graph.
#[async_trait]
pub trait GraphConstructor: Send + Sync {
    fn graph_name(&self) -> &str;

    fn concurrency(&self) -> usize;

    fn undirected_relationship_types(&self) -> &[String];

    /// Loads the frames and creates the graph, consuming the handle.
    ///
    /// Returns the server's summary of the created graph.
    async fn run(
        self: Box<Self>,
        nodes: Vec<TabularResult>,
        relationships: Vec<TabularResult>,
    ) -> Result<TabularResult, AppError>;
}

/// Constructs graphs with `gds.graph.project` Cypher aggregation.
///
/// Runs against the database and bookmarks captured when the handle was
/// created, and records the bookmarks it produces in the owning session.
pub struct CypherGraphConstructor {
    transport: Arc<dyn CypherTransport>,
    session: Arc<SessionState>,
    database: Option<String>,
    bookmarks: Option<Bookmarks>,
    graph_name: String,
    concurrency: usize,
    undirected_relationship_types: Vec<String>,
}

impl CypherGraphConstructor {
    pub fn new(
        transport: Arc<dyn CypherTransport>,
        session: Arc<SessionState>,
        graph_name: &str,
        concurrency: usize,
        undirected_relationship_types: Vec<String>,
    ) -> Self {
        let SessionSnapshot {
            database,
            bookmarks,
        } = session.snapshot(None);
        Self {
            transport,
            session,
            database,
            bookmarks,
            graph_name: graph_name.to_string(),
            concurrency,
            undirected_relationship_types,
        }
    }

    fn build_params(
        &self,
        nodes: &[TabularResult],
        relationships: &[TabularResult],
    ) -> Result<CallParameters, AppError> {
        let mut rows = Vec::new();
        for frame in nodes {
            node_rows(frame, &mut rows)?;
        }
        for frame in relationships {
            relationship_rows(frame, &mut rows)?;
        }

        Ok(CallParameters::new()
            .with("rows", rows)
            .with("graph_name", self.graph_name.as_str())
            .with(
                "undirected_relationship_types",
                self.undirected_relationship_types.clone(),
            )
            .with("concurrency", self.concurrency))
    }
}

#[async_trait]
impl GraphConstructor for CypherGraphConstructor {
    fn graph_name(&self) -> &str {
        &self.graph_name
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn undirected_relationship_types(&self) -> &[String] {
        &self.undirected_relationship_types
    }

    async fn run(
        self: Box<Self>,
        nodes: Vec<TabularResult>,
        relationships: Vec<TabularResult>,
    ) -> Result<TabularResult, AppError> {
        let params = self.build_params(&nodes, &relationships)?;

        tracing::info!(
            graph_name = %self.graph_name,
            node_frames = nodes.len(),
            relationship_frames = relationships.len(),
            "Constructing graph"
        );

        let request = CypherRequest {
            statement: PROJECT_STATEMENT,
            params: &params,
            database: self.database.as_deref(),
            bookmarks: self.bookmarks.as_ref(),
        };

        let outcome = self
            .transport
            .execute(request)
            .await
            .map_err(|e| e.reclassify("gds.graph.project"))?;
        self.session.record_completion(outcome.bookmarks);
        Ok(outcome.result)
    }
}

/// Column index, or a configuration error naming the missing column.
fn required_column(frame: &TabularResult, name: &str) -> Result<usize, AppError> {
    frame.column_index(name).ok_or_else(|| {
        AppError::InvalidCall(format!("graph construction frame is missing `{}`", name))
    })
}

/// Collects every column not in `reserved` into a property map.
fn properties(frame: &TabularResult, values: &[JsonValue], reserved: &[&str]) -> JsonValue {
    let map: Map<String, JsonValue> = frame
        .columns()
        .iter()
        .zip(values)
        .filter(|(column, _)| !reserved.contains(&column.as_str()))
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();
    JsonValue::Object(map)
}

fn node_rows(frame: &TabularResult, rows: &mut Vec<JsonValue>) -> Result<(), AppError> {
    let id = required_column(frame, NODE_ID)?;
    let labels = frame.column_index(LABELS);
    let reserved = [NODE_ID, LABELS];

    for row in frame.rows() {
        let values = row.values();
        let mut data = Map::new();
        if let Some(idx) = labels {
            let labels = match &values[idx] {
                JsonValue::String(label) => JsonValue::Array(vec![JsonValue::String(label.clone())]),
                other => other.clone(),
            };
            data.insert("sourceNodeLabels".into(), labels);
        }
        data.insert(
            "sourceNodeProperties".into(),
            properties(frame, values, &reserved),
        );

        rows.push(serde_json::json!({
            "source": values[id],
            "target": JsonValue::Null,
            "data": data,
        }));
    }
    Ok(())
}

fn relationship_rows(frame: &TabularResult, rows: &mut Vec<JsonValue>) -> Result<(), AppError> {
    let source = required_column(frame, SOURCE_NODE_ID)?;
    let target = required_column(frame, TARGET_NODE_ID)?;
    let rel_type = frame.column_index(RELATIONSHIP_TYPE);
    let reserved = [SOURCE_NODE_ID, TARGET_NODE_ID, RELATIONSHIP_TYPE];

    for row in frame.rows() {
        let values = row.values();
        let mut data = Map::new();
        if let Some(idx) = rel_type {
            data.insert("relationshipType".into(), values[idx].clone());
        }
        data.insert(
            "relationshipProperties".into(),
            properties(frame, values, &reserved),
        );

        rows.push(serde_json::json!({
            "source": values[source],
            "target": values[target],
            "data": data,
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;

    use crate::transport::QueryOutcome;

    #[derive(Default)]
    struct CapturingTransport {
        seen: Mutex<Option<(String, CallParameters, Option<String>, Option<Bookmarks>)>>,
    }

    #[async_trait]
    impl CypherTransport for CapturingTransport {
        async fn execute(&self, request: CypherRequest<'_>) -> Result<QueryOutcome, AppError> {
            *self.seen.lock().unwrap() = Some((
                request.statement.to_string(),
                request.params.clone(),
                request.database.map(str::to_string),
                request.bookmarks.cloned(),
            ));
            Ok(QueryOutcome {
                result: TabularResult::new(
                    vec!["graphName".into(), "nodeCount".into(), "relationshipCount".into()],
                    vec![vec![json!("g"), json!(2), json!(1)]],
                )?,
                bookmarks: Some("FB:built".into()),
            })
        }
    }

    fn frame(columns: &[&str], rows: Vec<Vec<JsonValue>>) -> TabularResult {
        TabularResult::new(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    #[tokio::test]
    async fn test_run_uses_creation_snapshot() {
        let transport = Arc::new(CapturingTransport::default());
        let session = Arc::new(SessionState::new(Some("movies".into())));
        session.set_bookmarks(Some("FB:before".into()));

        let constructor = CypherGraphConstructor::new(
            transport.clone(),
            Arc::clone(&session),
            "g",
            8,
            vec!["KNOWS".into()],
        );
        session.set_database(Some("other".into()));
        session.set_bookmarks(Some("FB:after".into()));

        let nodes = frame(
            &["nodeId", "labels", "age"],
            vec![
                vec![json!(0), json!("Person"), json!(30)],
                vec![json!(1), json!(["Person", "Admin"]), json!(40)],
            ],
        );
        let rels = frame(
            &["sourceNodeId", "targetNodeId", "relationshipType", "weight"],
            vec![vec![json!(0), json!(1), json!("KNOWS"), json!(0.5)]],
        );

        let summary = Box::new(constructor)
            .run(vec![nodes], vec![rels])
            .await
            .unwrap();
        assert_eq!(summary.row(0).unwrap().get::<i64>("nodeCount").unwrap(), 2);

        let (statement, params, database, bookmarks) =
            transport.seen.lock().unwrap().clone().unwrap();
        assert_eq!(statement, PROJECT_STATEMENT);
        assert_eq!(database.as_deref(), Some("movies"));
        assert_eq!(bookmarks, Some("FB:before".into()));
        assert_eq!(params.get("concurrency"), Some(&json!(8)));
        assert_eq!(
            params.get("undirected_relationship_types"),
            Some(&json!(["KNOWS"]))
        );

        let rows = params.get("rows").unwrap().as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            json!({
                "source": 0,
                "target": null,
                "data": {"sourceNodeLabels": ["Person"], "sourceNodeProperties": {"age": 30}}
            })
        );
        assert_eq!(
            rows[2],
            json!({
                "source": 0,
                "target": 1,
                "data": {"relationshipType": "KNOWS", "relationshipProperties": {"weight": 0.5}}
            })
        );

        assert_eq!(session.last_bookmarks(), Some("FB:built".into()));
    }

    #[tokio::test]
    async fn test_missing_required_column() {
        let transport = Arc::new(CapturingTransport::default());
        let constructor = CypherGraphConstructor::new(
            transport.clone(),
            Arc::new(SessionState::default()),
            "g",
            4,
            Vec::new(),
        );

        let rels = frame(&["sourceNodeId"], vec![vec![json!(0)]]);
        let err = Box::new(constructor)
            .run(Vec::new(), vec![rels])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidCall(ref m) if m.contains("targetNodeId")));
        assert!(transport.seen.lock().unwrap().is_none());
    }
}
