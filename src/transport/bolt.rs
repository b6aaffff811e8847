//! Bolt transport over the neo4rs driver.
//!
//! # Example
//!
//! ```ignore
//! use gds_client::transport::BoltTransport;
//!
//! let transport = BoltTransport::connect("neo4j://localhost:7687", "neo4j", "password").await?;
//! let runner = DispatchingRunner::new(transport);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use indexmap::IndexMap;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType, Graph, Query};
use serde_json::Value as JsonValue;

use crate::call_parameters::CallParameters;
use crate::error::AppError;
use crate::tabular::TabularResult;
use crate::transport::{CypherRequest, CypherTransport, QueryOutcome};

/// Direct driver connection to a Neo4j server.
///
/// The neo4rs stable API neither accepts nor reports causal bookmarks, so
/// every outcome carries `None` and bookmarks on a request are not
/// forwarded. Use the [`http`](crate::transport::http) transport where
/// causal chaining across calls matters.
///
/// Results with no rows carry no columns, and column order follows the
/// first row's keys: the driver only exposes field names through the rows
/// themselves.
pub struct BoltTransport {
    graph: Graph,
    bookmarks_warned: AtomicBool,
}

impl BoltTransport {
    /// Connects to the server.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, AppError> {
        let graph = Graph::new(uri, user, password).await?;
        Ok(Self::from_graph(graph))
    }

    /// Wraps an already connected driver.
    pub fn from_graph(graph: Graph) -> Self {
        Self {
            graph,
            bookmarks_warned: AtomicBool::new(false),
        }
    }

    /// Returns a reference to the underlying driver.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

#[async_trait]
impl CypherTransport for BoltTransport {
    async fn execute(&self, request: CypherRequest<'_>) -> Result<QueryOutcome, AppError> {
        if request.bookmarks.is_some() && !self.bookmarks_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!("Bolt transport cannot forward bookmarks; causal chaining is not enforced");
        }

        let q = build_query(request.statement, request.params);
        let mut stream = match request.database {
            Some(db) => self.graph.execute_on(db, q).await?,
            None => self.graph.execute(q).await?,
        };

        let mut records = Vec::new();
        while let Some(row) = stream.next().await? {
            let record: IndexMap<String, JsonValue> = row
                .to()
                .map_err(|e| AppError::Internal(format!("failed to decode row: {}", e)))?;
            records.push(record);
        }

        Ok(QueryOutcome {
            result: TabularResult::from_records(records),
            bookmarks: None,
        })
    }
}

/// Binds every parameter onto a driver query.
fn build_query(statement: &str, params: &CallParameters) -> Query {
    params
        .iter()
        .fold(neo4rs::query(statement), |q, (name, value)| {
            q.param(name, to_bolt(value))
        })
}

/// Converts a JSON value to its Bolt representation.
///
/// Integers that fit in `i64` stay integers; all other numbers become floats.
fn to_bolt(value: &JsonValue) -> BoltType {
    match value {
        JsonValue::Null => BoltType::Null(BoltNull),
        JsonValue::Bool(b) => BoltType::from(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => BoltType::from(s.as_str()),
        JsonValue::Array(items) => {
            BoltType::List(BoltList::from(items.iter().map(to_bolt).collect::<Vec<_>>()))
        }
        JsonValue::Object(map) => {
            let mut bolt = BoltMap::default();
            for (k, v) in map {
                bolt.put(BoltString::from(k.as_str()), to_bolt(v));
            }
            BoltType::Map(bolt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_bolt_scalars() {
        assert_eq!(to_bolt(&JsonValue::Null), BoltType::Null(BoltNull));
        assert_eq!(to_bolt(&json!(true)), BoltType::from(true));
        assert_eq!(to_bolt(&json!(42)), BoltType::from(42_i64));
        assert_eq!(to_bolt(&json!(0.5)), BoltType::from(0.5_f64));
        assert_eq!(to_bolt(&json!("gds")), BoltType::from("gds"));
    }

    #[test]
    fn test_to_bolt_nested() {
        let value = to_bolt(&json!({"nodeLabels": ["A", "B"], "concurrency": 4}));
        assert!(matches!(value, BoltType::Map(_)));
        assert!(matches!(to_bolt(&json!([1, 2])), BoltType::List(_)));
    }
}
