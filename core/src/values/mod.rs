mod collection;
pub mod date;
mod display;
mod json;
mod operators;
pub mod queue;
pub mod stream;
pub mod uri;
mod value;

pub use queue::QueueResource;
pub use stream::{StreamResource, Subscriber};
pub use uri::{QueueUriHandler, Uri, UriHandler, UriRegistry};
pub use value::{CONSTRAINT_META, Data, Value};

#[cfg(test)]
mod value_test;
