//! Neo4j Query API transport over HTTP.
//!
//! Each statement is one `POST {base}/db/{database}/query/v2` request. The
//! request carries the causal bookmarks to wait for and the response
//! reports the bookmarks of the statement's transaction.
//!
//! # Example
//!
//! ```ignore
//! use gds_client::transport::HttpTransport;
//!
//! let transport = HttpTransport::new("http://localhost:7474", "neo4j", Some("password"));
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::OnceCell;

use crate::call_parameters::CallParameters;
use crate::error::AppError;
use crate::query_runner::Bookmarks;
use crate::tabular::TabularResult;
use crate::transport::{CypherRequest, CypherTransport, QueryOutcome};

/// Database the server's default database is looked up in.
const SYSTEM_DATABASE: &str = "system";

const SHOW_DEFAULT_DATABASE: &str = "SHOW DEFAULT DATABASE YIELD name";

/// HTTP client for the Neo4j Query API.
///
/// The Query API addresses every request to a named database. Requests that
/// name none go to the server's default database, looked up once with
/// `SHOW DEFAULT DATABASE` unless set with
/// [`with_default_database`](HttpTransport::with_default_database).
///
/// This type is cheap to clone - `reqwest::Client` is `Arc`-based.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    user: String,
    password: Option<String>,
    default_database: Arc<OnceCell<String>>,
}

#[derive(Serialize)]
struct QueryRequestBody<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "no_parameters")]
    parameters: &'a CallParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    bookmarks: Option<&'a Bookmarks>,
}

fn no_parameters(params: &&CallParameters) -> bool {
    params.is_empty()
}

#[derive(Deserialize)]
struct QueryResponseBody {
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    bookmarks: Option<Vec<String>>,
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Deserialize)]
struct QueryData {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

#[derive(Deserialize)]
struct ServerError {
    code: String,
    message: String,
}

impl HttpTransport {
    /// Creates a transport for the server at `base_url` (e.g. `http://localhost:7474`).
    pub fn new(base_url: &str, user: &str, password: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.map(str::to_string),
            default_database: Arc::new(OnceCell::new()),
        }
    }

    /// Sets the database used when a request names none, skipping the lookup.
    pub fn with_default_database(mut self, database: &str) -> Self {
        self.default_database = Arc::new(OnceCell::from(database.to_string()));
        self
    }

    fn query_url(&self, database: &str) -> String {
        format!("{}/db/{}/query/v2", self.base_url, database)
    }

    /// The request's database, or the server default.
    async fn target_database(&self, database: Option<&str>) -> Result<String, AppError> {
        if let Some(database) = database {
            return Ok(database.to_string());
        }

        self.default_database
            .get_or_try_init(|| async {
                let params = CallParameters::new();
                let outcome = self
                    .post(SYSTEM_DATABASE, SHOW_DEFAULT_DATABASE, &params, None)
                    .await?;
                let name = default_database_name(&outcome.result)?;
                tracing::debug!(database = %name, "Resolved server default database");
                Ok::<_, AppError>(name)
            })
            .await
            .cloned()
    }

    async fn post(
        &self,
        database: &str,
        statement: &str,
        params: &CallParameters,
        bookmarks: Option<&Bookmarks>,
    ) -> Result<QueryOutcome, AppError> {
        let url = self.query_url(database);
        let body = QueryRequestBody {
            statement,
            parameters: params,
            bookmarks,
        };

        tracing::debug!(url = %url, "Posting statement to Query API");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.user, self.password.as_deref())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        parse_response(status, &text)
    }
}

#[async_trait]
impl CypherTransport for HttpTransport {
    async fn execute(&self, request: CypherRequest<'_>) -> Result<QueryOutcome, AppError> {
        let database = self.target_database(request.database).await?;
        self.post(&database, request.statement, request.params, request.bookmarks)
            .await
    }
}

/// Reads the name out of a `SHOW DEFAULT DATABASE` result.
fn default_database_name(result: &TabularResult) -> Result<String, AppError> {
    result
        .row(0)
        .ok_or_else(|| AppError::Internal("server reported no default database".into()))?
        .get("name")
}

/// Turns a Query API response into an outcome or the server's error.
fn parse_response(status: StatusCode, text: &str) -> Result<QueryOutcome, AppError> {
    let body: QueryResponseBody = match serde_json::from_str(text) {
        Ok(body) => body,
        Err(_) if !status.is_success() => {
            return Err(AppError::Transport(format!(
                "Query API returned {}: {}",
                status,
                text.trim()
            )));
        }
        Err(e) => {
            return Err(AppError::Internal(format!(
                "failed to decode Query API response: {}",
                e
            )));
        }
    };

    if let Some(error) = body.errors.into_iter().next() {
        return Err(AppError::Remote {
            code: error.code,
            message: error.message,
        });
    }

    if !status.is_success() {
        return Err(AppError::Transport(format!("Query API returned {}", status)));
    }

    let result = match body.data {
        Some(data) => TabularResult::new(data.fields, data.values)?,
        None => TabularResult::default(),
    };

    Ok(QueryOutcome {
        result,
        bookmarks: body.bookmarks.filter(|b| !b.is_empty()).map(Bookmarks::new),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_url() {
        let transport = HttpTransport::new("http://localhost:7474/", "neo4j", None);
        assert_eq!(
            transport.query_url("movies"),
            "http://localhost:7474/db/movies/query/v2"
        );
    }

    #[tokio::test]
    async fn test_target_database() {
        // Nothing listens here; a lookup would fail.
        let transport = HttpTransport::new("http://127.0.0.1:9", "neo4j", None);
        assert_eq!(
            transport.target_database(Some("movies")).await.unwrap(),
            "movies"
        );
        assert!(transport.default_database.get().is_none());

        let transport = transport.with_default_database("analytics");
        assert_eq!(transport.target_database(None).await.unwrap(), "analytics");
    }

    #[test]
    fn test_default_database_name() {
        let result = TabularResult::scalar("name", json!("graphs"));
        assert_eq!(default_database_name(&result).unwrap(), "graphs");

        let empty = TabularResult::empty(vec!["name".into()]);
        assert!(matches!(
            default_database_name(&empty),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn test_request_body() {
        let params = CallParameters::new().with("x", 1);
        let bookmarks = Bookmarks::new(vec!["FB:abc".into()]);
        let body = QueryRequestBody {
            statement: "RETURN $x AS x",
            parameters: &params,
            bookmarks: Some(&bookmarks),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"statement": "RETURN $x AS x", "parameters": {"x": 1}, "bookmarks": ["FB:abc"]})
        );

        let empty = CallParameters::new();
        let body = QueryRequestBody {
            statement: "RETURN 1",
            parameters: &empty,
            bookmarks: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"statement": "RETURN 1"})
        );
    }

    #[test]
    fn test_parse_success() {
        let text = r#"{"data": {"fields": ["x"], "values": [[1]]}, "bookmarks": ["FB:kcwQ"]}"#;
        let outcome = parse_response(StatusCode::ACCEPTED, text).unwrap();
        assert_eq!(outcome.result.columns(), ["x".to_string()]);
        assert_eq!(outcome.result.squeeze(), Some(&json!(1)));
        assert_eq!(outcome.bookmarks, Some(Bookmarks::new(vec!["FB:kcwQ".into()])));
    }

    #[test]
    fn test_parse_empty_result_keeps_columns() {
        let text = r#"{"data": {"fields": ["graphName"], "values": []}, "bookmarks": []}"#;
        let outcome = parse_response(StatusCode::ACCEPTED, text).unwrap();
        assert_eq!(outcome.result.columns(), ["graphName".to_string()]);
        assert!(outcome.result.is_empty());
        assert_eq!(outcome.bookmarks, None);
    }

    #[test]
    fn test_parse_server_error() {
        let text = r#"{"errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input"}]}"#;
        let err = parse_response(StatusCode::BAD_REQUEST, text).unwrap_err();
        assert_eq!(
            err.remote_failure(),
            Some(("Neo.ClientError.Statement.SyntaxError", "Invalid input"))
        );
    }

    #[test]
    fn test_parse_unreadable_failure() {
        let err = parse_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
    }
}
