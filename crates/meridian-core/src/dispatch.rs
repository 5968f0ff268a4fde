//! Method dispatch tables for hosted services.
//!
//! Each service exposes its remotely-callable procedures through a
//! [`MethodTable`]: an explicit, immutable mapping from method name to an
//! async handler plus the argument fields the handler requires. Tables are
//! built once at service construction time with [`MethodTableBuilder`] and
//! are inspectable thereafter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::error;

use crate::error::RpcError;

/// A structured, named-field argument bag for RPC invocations.
///
/// Wraps a JSON object; field access deserialises into the requested type and
/// reports shape mismatches as [`HandlerError::InvalidArguments`] so handlers
/// can propagate them with `?`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Args(Map<String, Value>);

impl Args {
    /// Creates an empty argument bag.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builds an argument bag from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidArguments`] if the value is not an object.
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(RpcError::InvalidArguments(format!(
                "expected an object of named fields, got {other}"
            ))),
        }
    }

    /// Adds a field, replacing any existing value under the same name.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.0.insert(key.into(), value);
        self
    }

    /// Deserialises a required field.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::InvalidArguments`] if the field is missing or
    /// has the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, HandlerError> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| HandlerError::InvalidArguments(format!("missing field `{key}`")))?;

        serde_json::from_value(value.clone()).map_err(|e| {
            HandlerError::InvalidArguments(format!("field `{key}` has the wrong shape: {e}"))
        })
    }

    /// Deserialises an optional field.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::InvalidArguments`] only if the field is present
    /// with the wrong shape.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, HandlerError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get(key).map(Some),
        }
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Converts the bag back into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Errors produced inside method handlers.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The argument bag fails the handler's shape contract.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler failed. The detail is logged by the dispatch layer and
    /// surfaced to the caller as an opaque [`RpcError::Internal`].
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    /// Wraps an arbitrary failure as an internal handler error.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::Internal(detail.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialisation error: {err}"))
    }
}

/// Type alias for a boxed async method handler.
type Handler = Arc<dyn Fn(Args) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

struct MethodDescriptor {
    required: Vec<String>,
    handler: Handler,
}

/// An immutable table of named RPC methods for one service.
///
/// Built once via [`MethodTable::builder`]; dispatch never mutates the table,
/// so concurrent invocations of the same or different methods interleave
/// freely.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: Arc<HashMap<String, MethodDescriptor>>,
}

impl MethodTable {
    /// Starts building a method table.
    #[must_use]
    pub fn builder() -> MethodTableBuilder {
        MethodTableBuilder {
            methods: HashMap::new(),
        }
    }

    /// Returns true if a method with this name is registered.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Returns the registered method names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Returns the number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns true if no methods are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Invokes a method by name.
    ///
    /// # Errors
    ///
    /// - [`RpcError::MethodNotFound`] for an unknown method name
    /// - [`RpcError::InvalidArguments`] if a declared field is missing or the
    ///   handler rejects the bag's shape
    /// - [`RpcError::Internal`] for any other handler fault; the detail is
    ///   logged, never returned
    pub async fn dispatch(&self, method: &str, args: Args) -> Result<Value, RpcError> {
        let Some(descriptor) = self.methods.get(method) else {
            return Err(RpcError::MethodNotFound(method.to_owned()));
        };

        for field in &descriptor.required {
            if !args.contains(field) {
                return Err(RpcError::InvalidArguments(format!(
                    "missing field `{field}`"
                )));
            }
        }

        match (descriptor.handler)(args).await {
            Ok(value) => Ok(value),
            Err(HandlerError::InvalidArguments(detail)) => Err(RpcError::InvalidArguments(detail)),
            Err(HandlerError::Internal(detail)) => {
                error!(method = %method, detail = %detail, "rpc handler failed");
                Err(RpcError::Internal)
            }
        }
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`MethodTable`].
///
/// Method names are unique within a service; registering a name twice
/// replaces the earlier handler.
pub struct MethodTableBuilder {
    methods: HashMap<String, MethodDescriptor>,
}

impl MethodTableBuilder {
    /// Registers a method with no declared required fields.
    ///
    /// The handler is still free to enforce its own shape contract via
    /// [`Args::get`].
    #[must_use]
    pub fn method<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.method_expecting(name, &[], handler)
    }

    /// Registers a method that requires the named fields to be present.
    ///
    /// Presence is checked by the dispatch layer before the handler runs;
    /// missing fields surface as [`RpcError::InvalidArguments`].
    #[must_use]
    pub fn method_expecting<F, Fut>(
        mut self,
        name: impl Into<String>,
        required: &[&str],
        handler: F,
    ) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args| Box::pin(handler(args)));
        self.methods.insert(
            name.into(),
            MethodDescriptor {
                required: required.iter().map(|s| (*s).to_owned()).collect(),
                handler,
            },
        );
        self
    }

    /// Finalises the table.
    #[must_use]
    pub fn build(self) -> MethodTable {
        MethodTable {
            methods: Arc::new(self.methods),
        }
    }
}
