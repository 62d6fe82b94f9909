//! The Dollar runtime.

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::{ErrorSink, LogSink, Report};
use super::options::{Configuration, RuntimeOptions};
use crate::errors::{Error, Result};
use crate::prediction::TypeLearner;
use crate::scope::{Declaration, Scope};
use crate::source::SourceSegment;
use crate::store::{MemoryStore, Store};
use crate::values::Value;
use crate::values::uri::{QueueUriHandler, UriHandler, UriRegistry};

/// The Dollar runtime.
///
/// The runtime owns everything scopes share:
/// - Live configuration flags ([`Configuration`])
/// - The type learner used for prediction
/// - Host services: error sink, key/value store, URI handlers
/// - Globals declared into every root scope
///
/// Cloning a runtime is cheap and yields a handle to the same state.
///
/// # Example
///
/// ```
/// use dollar_core::api::{Runtime, RuntimeOptions};
/// use dollar_core::Value;
///
/// let runtime = Runtime::new(RuntimeOptions::default(), |services| {
///     services.register("answer", Value::from(42));
/// });
///
/// let scope = runtime.root_scope("answer");
/// assert_eq!(scope.get("answer", true).unwrap(), Value::from(42));
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    config: Configuration,
    learner: TypeLearner,
    sink: Arc<dyn ErrorSink>,
    store: Arc<dyn Store>,
    uris: UriRegistry,
    globals: Vec<(String, Value)>,
}

impl Runtime {
    /// Create a new runtime.
    ///
    /// The initialization closure receives a [`ServicesBuilder`] for
    /// replacing the default host services and registering globals.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let runtime = Runtime::new(options, |services| {
    ///     services.sink(Arc::new(CollectingSink::new()));
    ///     services.register("pi", Value::from(3.14159));
    /// });
    /// ```
    pub fn new(options: RuntimeOptions, init: impl FnOnce(&mut ServicesBuilder)) -> Self {
        let mut services = ServicesBuilder::new();
        init(&mut services);

        let config = Configuration::new(&options);
        let learner = TypeLearner::new(config.prediction_expiry());
        let ServicesBuilder {
            sink,
            store,
            uris,
            globals,
        } = services;

        Self {
            inner: Arc::new(RuntimeInner {
                config,
                learner,
                sink,
                store,
                uris,
                globals,
            }),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    pub fn learner(&self) -> &TypeLearner {
        &self.inner.learner
    }

    pub fn sink(&self) -> &dyn ErrorSink {
        self.inner.sink.as_ref()
    }

    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub fn uris(&self) -> &UriRegistry {
        &self.inner.uris
    }

    /// Create a root scope for the script `source`, with globals declared.
    pub fn root_scope(&self, source: &str) -> Scope {
        self.root_scope_at(SourceSegment::whole(source))
    }

    /// Like [`root_scope`](Self::root_scope), for a script loaded from `file`.
    pub fn root_scope_for_file(&self, source: &str, file: &str) -> Scope {
        self.root_scope_at(SourceSegment::whole(source).with_file(file))
    }

    fn root_scope_at(&self, source: SourceSegment) -> Scope {
        let scope = Scope::root(self.clone(), source);
        for (name, value) in &self.inner.globals {
            if let Err(err) = scope.declare(name, value.clone(), Declaration::new().readonly()) {
                warn!(name = name.as_str(), "failed to declare global: {}", err);
            }
        }
        scope
    }

    /// Resolve `text` through the registered URI handlers.
    pub fn uri(&self, text: &str) -> Result<Value> {
        Ok(Value::from(self.inner.uris.resolve(text)?))
    }

    /// Read `key` from the store. Missing keys read as void.
    pub fn load(&self, key: &str) -> Result<Value> {
        self.inner.store.get(key)
    }

    /// Fully resolve `value` and write it to the store.
    pub fn save(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<Value> {
        let fixed = value.fix_deep(false)?;
        self.inner.store.set(key, fixed.clone(), ttl)?;
        Ok(fixed)
    }

    /// Hand an unhandled error to the sink.
    pub(crate) fn report(&self, error: &Error) {
        debug!(kind = error.kind().name(), "reporting unhandled error");
        self.inner.sink.report(&Report::from(error));
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeOptions::default(), |_| {})
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("globals", &self.inner.globals.len())
            .finish_non_exhaustive()
    }
}

/// Builder for the host services of a [`Runtime`].
///
/// Defaults: a [`LogSink`], an in-memory store, and a `queue:` URI scheme.
pub struct ServicesBuilder {
    sink: Arc<dyn ErrorSink>,
    store: Arc<dyn Store>,
    uris: UriRegistry,
    globals: Vec<(String, Value)>,
}

impl ServicesBuilder {
    fn new() -> Self {
        let uris = UriRegistry::new();
        uris.register("queue", Arc::new(QueueUriHandler::new()));
        Self {
            sink: Arc::new(LogSink),
            store: Arc::new(MemoryStore::new()),
            uris,
            globals: Vec::new(),
        }
    }

    pub fn sink(&mut self, sink: Arc<dyn ErrorSink>) -> &mut Self {
        self.sink = sink;
        self
    }

    pub fn store(&mut self, store: Arc<dyn Store>) -> &mut Self {
        self.store = store;
        self
    }

    pub fn uri_handler(&mut self, scheme: &str, handler: Arc<dyn UriHandler>) -> &mut Self {
        self.uris.register(scheme, handler);
        self
    }

    /// Register a global, declared readonly in every root scope.
    ///
    /// Globals should be plain values; a lambda here would keep its scope
    /// alive for as long as the runtime.
    pub fn register(&mut self, name: &str, value: Value) -> &mut Self {
        self.globals.push((name.to_string(), value));
        self
    }
}
