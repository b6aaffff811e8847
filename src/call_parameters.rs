//! Ordered parameters bound into procedure and function calls.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Ordered mapping from parameter name to value.
///
/// Insertion order is the positional order of the arguments when the
/// parameters are rendered into an endpoint call, so
/// `{graph_name: .., config: ..}` becomes `gds.x($graph_name, $config)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallParameters(IndexMap<String, JsonValue>);

impl CallParameters {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Adds a parameter, serializing the value to JSON.
    ///
    /// Replacing an existing name keeps its original position.
    pub fn insert<T: Serialize>(&mut self, name: &str, value: T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.0.insert(name.to_string(), value);
        Ok(())
    }

    /// Adds a parameter that's already a JSON value.
    pub fn insert_raw(&mut self, name: impl Into<String>, value: JsonValue) {
        self.0.insert(name.into(), value);
    }

    /// Builder-style [`insert_raw`](Self::insert_raw).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut JsonValue> {
        self.0.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameter names in positional order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Renders the positional argument list, e.g. `$graph_name, $config`.
    pub fn placeholder_str(&self) -> String {
        self.0
            .keys()
            .map(|k| format!("${}", k))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Consumes the parameters and returns the underlying map.
    pub fn into_inner(self) -> IndexMap<String, JsonValue> {
        self.0
    }
}

impl From<IndexMap<String, JsonValue>> for CallParameters {
    fn from(map: IndexMap<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, JsonValue)> for CallParameters {
    fn from_iter<I: IntoIterator<Item = (K, JsonValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Builds [`CallParameters`] from `name = value` pairs, keeping their order.
///
/// Each value is a single token tree passed to `serde_json::json!`: a
/// literal, a variable, or a bracketed JSON-like list or map.
///
/// ```ignore
/// let params = call_params!(graph_name = "g", config = {"concurrency": 4});
/// assert_eq!(params.placeholder_str(), "$graph_name, $config");
/// ```
#[macro_export]
macro_rules! call_params {
    () => {
        $crate::call_parameters::CallParameters::new()
    };
    ($($name:ident = $value:tt),+ $(,)?) => {
        $crate::call_parameters::CallParameters::new()
            $(.with(stringify!($name), ::serde_json::json!($value)))+
    };
}
