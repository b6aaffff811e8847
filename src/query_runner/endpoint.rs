//! Endpoint classification and call shaping.
//!
//! A call is shaped into Cypher purely from its [`EndpointType`], the
//! endpoint name, the parameter names and the requested yields:
//!
//! | type | yields | statement |
//! |------|--------|-----------|
//! | procedure | none | `CALL gds.graph.list($graph_name)` |
//! | procedure | `a, b` | `CALL gds.graph.list($graph_name) YIELD a, b` |
//! | function | none | `RETURN gds.version() AS value` |
//! | function | `a` | `RETURN gds.version() AS a` |
//! | function | `a, b` | `WITH gds.x() AS result RETURN result.a AS a, result.b AS b` |

use std::collections::HashSet;
use std::fmt;

use crate::call_parameters::CallParameters;
use crate::error::AppError;
use crate::query_runner::CallOptions;

/// Column a function result is returned under when no yields are given.
pub const FUNCTION_VALUE_COLUMN: &str = "value";

/// How an endpoint is invoked on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointType {
    /// `CALL endpoint(...)`, multi-row output, optional progress logging.
    Procedure,
    /// Inline expression, scalar or map output, no progress channel.
    Function,
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointType::Procedure => f.write_str("PROCEDURE"),
            EndpointType::Function => f.write_str("FUNCTION"),
        }
    }
}

/// A validated endpoint invocation, as handed to the dispatch primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointCall {
    endpoint_type: EndpointType,
    endpoint: String,
    params: CallParameters,
    yields: Option<Vec<String>>,
    database: Option<String>,
    logging: bool,
    custom_error: bool,
}

impl EndpointCall {
    /// Validates and builds a call.
    ///
    /// # Errors
    ///
    /// Configuration errors, reported before anything reaches the server:
    /// - the endpoint is not a dotted identifier
    /// - a parameter or yield name is not an identifier
    /// - `yields` is given but empty
    /// - `logging` is requested for a function
    pub fn new(
        endpoint_type: EndpointType,
        endpoint: &str,
        options: CallOptions,
    ) -> Result<Self, AppError> {
        validate_endpoint_name(endpoint)?;

        let CallOptions {
            params,
            yields,
            database,
            logging,
            custom_error,
        } = options;
        let params = params.unwrap_or_default();

        if let Some(name) = params.names().find(|n| !is_identifier(n)) {
            return Err(AppError::InvalidCall(format!(
                "parameter name `{}` is not a valid identifier",
                name
            )));
        }

        if let Some(yields) = &yields {
            if yields.is_empty() {
                return Err(AppError::InvalidCall(
                    "yields must name at least one field".into(),
                ));
            }
            if let Some(field) = yields.iter().find(|y| !is_identifier(y)) {
                return Err(AppError::InvalidCall(format!(
                    "yield field `{}` is not a valid identifier",
                    field
                )));
            }
        }

        if logging && endpoint_type == EndpointType::Function {
            return Err(AppError::InvalidCall(format!(
                "function `{}` has no progress channel; logging is only supported for procedures",
                endpoint
            )));
        }

        Ok(Self {
            endpoint_type,
            endpoint: endpoint.to_string(),
            params,
            yields,
            database,
            logging,
            custom_error,
        })
    }

    pub fn endpoint_type(&self) -> EndpointType {
        self.endpoint_type
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn params(&self) -> &CallParameters {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut CallParameters {
        &mut self.params
    }

    pub fn yields(&self) -> Option<&[String]> {
        self.yields.as_deref()
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn logging(&self) -> bool {
        self.logging
    }

    pub fn custom_error(&self) -> bool {
        self.custom_error
    }

    /// Renders the Cypher statement for this call.
    pub fn statement(&self) -> String {
        shape_call(
            self.endpoint_type,
            &self.endpoint,
            &self.params,
            self.yields.as_deref(),
        )
    }
}

/// Renders the Cypher statement for an endpoint call.
pub fn shape_call(
    endpoint_type: EndpointType,
    endpoint: &str,
    params: &CallParameters,
    yields: Option<&[String]>,
) -> String {
    let invocation = format!("{}({})", endpoint, params.placeholder_str());

    match (endpoint_type, yields) {
        (EndpointType::Procedure, None) => format!("CALL {}", invocation),
        (EndpointType::Procedure, Some(fields)) => {
            format!("CALL {} YIELD {}", invocation, fields.join(", "))
        }
        (EndpointType::Function, None) => {
            format!("RETURN {} AS {}", invocation, FUNCTION_VALUE_COLUMN)
        }
        (EndpointType::Function, Some([field])) => format!("RETURN {} AS {}", invocation, field),
        (EndpointType::Function, Some(fields)) => {
            let projection = fields
                .iter()
                .map(|f| format!("result.{f} AS {f}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("WITH {} AS result RETURN {}", invocation, projection)
        }
    }
}

/// Checks that an endpoint is a non-empty dotted name, e.g. `gds.graph.list`.
pub fn validate_endpoint_name(endpoint: &str) -> Result<(), AppError> {
    if endpoint.is_empty() {
        return Err(AppError::InvalidEndpoint("endpoint name is empty".into()));
    }
    if !endpoint
        .split('.')
        .all(|segment| !segment.is_empty() && segment.chars().all(is_name_char))
    {
        return Err(AppError::InvalidEndpoint(format!(
            "`{}` is not a dotted identifier",
            endpoint
        )));
    }
    Ok(())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_') && chars.all(is_name_char)
}

/// Endpoints the server declares, by type.
///
/// Used to catch calls that use the wrong invocation style before they
/// are sent. Names the catalog doesn't know pass through; the server
/// decides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointCatalog {
    procedures: HashSet<String>,
    functions: HashSet<String>,
}

impl EndpointCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, endpoint: impl Into<String>, endpoint_type: EndpointType) {
        let endpoint = endpoint.into();
        match endpoint_type {
            EndpointType::Procedure => self.procedures.insert(endpoint),
            EndpointType::Function => self.functions.insert(endpoint),
        };
    }

    pub fn with(mut self, endpoint: impl Into<String>, endpoint_type: EndpointType) -> Self {
        self.register(endpoint, endpoint_type);
        self
    }

    pub fn len(&self) -> usize {
        self.procedures.len() + self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty() && self.functions.is_empty()
    }

    /// Checks a declared type against the catalog.
    ///
    /// # Errors
    ///
    /// - the endpoint is registered both as procedure and as function
    /// - the endpoint is only registered under the other type
    pub fn check(&self, endpoint: &str, declared: EndpointType) -> Result<(), AppError> {
        let is_procedure = self.procedures.contains(endpoint);
        let is_function = self.functions.contains(endpoint);

        match (is_procedure, is_function, declared) {
            (true, true, _) => Err(AppError::InvalidEndpoint(format!(
                "`{}` is registered as both a procedure and a function",
                endpoint
            ))),
            (true, false, EndpointType::Function) => Err(AppError::InvalidEndpoint(format!(
                "`{}` is a procedure, not a function",
                endpoint
            ))),
            (false, true, EndpointType::Procedure) => Err(AppError::InvalidEndpoint(format!(
                "`{}` is a function, not a procedure",
                endpoint
            ))),
            _ => Ok(()),
        }
    }
}
