//! Query and result types.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BalancerError;
use crate::load_balancer::mutation::FanOut;

/// Identifier matching a worker completion to the caller waiting on it.
pub type CorrelationId = u64;

/// Outcome delivered to a waiting `submit` call.
pub type QueryResult = Result<QueryOutput, BalancerError>;

/// Which dispatch path the balancer takes for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Read,
    Mutate,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Read => "read",
            Intent::Mutate => "mutate",
        }
    }
}

/// How the driver result must be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Lazily evaluated rows, materialized before serialization.
    Collection,
    /// A direct value.
    Scalar,
}

/// A request to run `operation` on `target`.
#[derive(Clone)]
pub struct Query {
    correlation_id: CorrelationId,
    /// Opaque model/resource identifier.
    pub target: String,
    /// Method or verb name understood by the driver.
    pub operation: String,
    pub kind: OperationKind,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub intent: Intent,
    is_probe: bool,
    fanout: Option<Arc<FanOut>>,
}

impl Query {
    /// Create a query with explicit intent and kind.
    pub fn new(
        target: impl Into<String>,
        operation: impl Into<String>,
        kind: OperationKind,
        intent: Intent,
    ) -> Self {
        Self {
            correlation_id: 0,
            target: target.into(),
            operation: operation.into(),
            kind,
            args: Vec::new(),
            kwargs: Map::new(),
            intent,
            is_probe: false,
            fanout: None,
        }
    }

    /// A read returning a collection of rows.
    pub fn select(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(target, operation, OperationKind::Collection, Intent::Read)
    }

    /// A read returning a single value.
    pub fn scalar(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(target, operation, OperationKind::Scalar, Intent::Read)
    }

    /// A create/update/delete returning a single value.
    pub fn mutate(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(target, operation, OperationKind::Scalar, Intent::Mutate)
    }

    /// Internally generated telemetry request.
    pub(crate) fn probe(operation: &str) -> Self {
        let mut query = Self::new("", operation, OperationKind::Scalar, Intent::Read);
        query.is_probe = true;
        query
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn is_probe(&self) -> bool {
        self.is_probe
    }

    pub(crate) fn assign_id(&mut self, id: CorrelationId) {
        self.correlation_id = id;
    }

    pub(crate) fn fanout(&self) -> Option<&Arc<FanOut>> {
        self.fanout.as_ref()
    }

    pub(crate) fn with_fanout(mut self, group: Arc<FanOut>) -> Self {
        self.fanout = Some(group);
        self
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("correlation_id", &self.correlation_id)
            .field("target", &self.target)
            .field("operation", &self.operation)
            .field("kind", &self.kind)
            .field("intent", &self.intent)
            .field("is_probe", &self.is_probe)
            .field("fanout", &self.fanout.is_some())
            .finish()
    }
}

/// Serialized result of one query on one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutput {
    pub correlation_id: CorrelationId,
    /// Name of the database that produced the canonical result.
    pub database: String,
    /// JSON encoded result.
    pub payload: Vec<u8>,
}

impl QueryOutput {
    pub(crate) fn encode(
        correlation_id: CorrelationId,
        database: &str,
        value: &Value,
    ) -> Result<Self, BalancerError> {
        Ok(Self {
            correlation_id,
            database: database.to_string(),
            payload: serde_json::to_vec(value)?,
        })
    }

    /// Decode the payload into a domain type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn value(&self) -> Result<Value, serde_json::Error> {
        self.decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builders_set_intent_and_kind() {
        let q = Query::select("users", "all");
        assert_eq!(q.intent, Intent::Read);
        assert_eq!(q.kind, OperationKind::Collection);
        assert!(!q.is_probe());

        let q = Query::mutate("users", "create").kwarg("name", "ada");
        assert_eq!(q.intent, Intent::Mutate);
        assert_eq!(q.kwargs.get("name"), Some(&json!("ada")));

        let p = Query::probe("load");
        assert!(p.is_probe());
        assert_eq!(p.operation, "load");
    }

    #[test]
    fn test_output_decode() {
        let out = QueryOutput::encode(7, "db0", &json!([1, 2, 3])).unwrap();
        assert_eq!(out.correlation_id, 7);
        let rows: Vec<u32> = out.decode().unwrap();
        assert_eq!(rows, vec![1, 2, 3]);
    }
}
