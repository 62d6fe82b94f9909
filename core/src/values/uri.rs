//! URI values and scheme handlers.
//!
//! A URI value is text plus, once resolved, the stream resource its scheme
//! handler opened. Hosts plug in schemes through [`UriRegistry`]; the
//! runtime registers `queue:` by default, which maps each name to a shared
//! in-memory queue.

use core::fmt;
use std::sync::{Arc, Mutex, RwLock};

use hashbrown::HashMap;

use super::queue::QueueResource;
use super::stream::StreamResource;
use crate::errors::{Error, ErrorKind, Result};
use crate::sync::{lock, read, write};

#[derive(Clone)]
pub struct Uri {
    text: String,
    resource: Option<Arc<dyn StreamResource>>,
}

impl Uri {
    /// An unresolved URI. Stream operations on it fail until resolved
    /// through a registry.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            resource: None,
        }
    }

    pub fn resolved(text: impl Into<String>, resource: Arc<dyn StreamResource>) -> Self {
        Self {
            text: text.into(),
            resource: Some(resource),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn scheme(&self) -> &str {
        self.text.split_once(':').map_or("", |(scheme, _)| scheme)
    }

    /// Everything after `scheme:`, without leading slashes.
    pub fn path(&self) -> &str {
        self.text
            .split_once(':')
            .map_or(self.text.as_str(), |(_, rest)| rest.trim_start_matches('/'))
    }

    pub fn is_resolved(&self) -> bool {
        self.resource.is_some()
    }

    pub fn resource(&self) -> Result<&Arc<dyn StreamResource>> {
        self.resource.as_ref().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("URI '{}' is not bound to a handler", self.text),
            )
        })
    }
}

impl fmt::Debug for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uri")
            .field("text", &self.text)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Opens resources for one URI scheme.
pub trait UriHandler: Send + Sync {
    fn open(&self, uri: &Uri) -> Result<Arc<dyn StreamResource>>;
}

/// Scheme name to handler.
#[derive(Default)]
pub struct UriRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn UriHandler>>>,
}

impl UriRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, scheme: &str, handler: Arc<dyn UriHandler>) {
        write(&self.handlers).insert(scheme.to_ascii_lowercase(), handler);
    }

    pub fn has_scheme(&self, scheme: &str) -> bool {
        read(&self.handlers).contains_key(&scheme.to_ascii_lowercase())
    }

    /// Bind `text` to a resource through the handler for its scheme.
    pub fn resolve(&self, text: &str) -> Result<Uri> {
        let uri = Uri::new(text);
        let handler = read(&self.handlers)
            .get(&uri.scheme().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("No handler for URI scheme '{}'", uri.scheme()),
                )
            })?;
        let resource = handler.open(&uri)?;
        Ok(Uri::resolved(text, resource))
    }
}

/// `queue:<name>`: one shared queue per name.
#[derive(Default)]
pub struct QueueUriHandler {
    queues: Mutex<HashMap<String, Arc<QueueResource>>>,
}

impl QueueUriHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UriHandler for QueueUriHandler {
    fn open(&self, uri: &Uri) -> Result<Arc<dyn StreamResource>> {
        let queue = lock(&self.queues)
            .entry(uri.path().to_string())
            .or_insert_with(|| Arc::new(QueueResource::new()))
            .clone();
        Ok(queue)
    }
}
