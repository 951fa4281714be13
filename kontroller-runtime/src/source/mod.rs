//! The list and watch capability a reflector consumes
//!
//! A [`ResourceSource`] stands in for the remote API of one kind. The runtime never talks to
//! the network itself; the host application adapts whatever client it uses to this trait.

mod memory;
pub use memory::MemorySource;

use async_trait::async_trait;
use futures::stream::BoxStream;
use kontroller_core::{ObjectList, ResourceVersion, WatchEvent};
use thiserror::Error;

/// Boxed error type used for errors produced outside the runtime
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A live stream of watch events
///
/// The stream ends when the connection is closed by either side.
pub type WatchStream = BoxStream<'static, Result<WatchEvent, SourceError>>;

/// A transport-level failure reported by a source
///
/// The runtime does not distinguish causes; any failure leads to a relist after backoff.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SourceError(BoxError);

impl SourceError {
    /// Wrap an arbitrary error
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(err.into())
    }

    /// The wrapped error
    #[must_use]
    pub fn into_inner(self) -> BoxError {
        self.0
    }
}

/// List and watch access to one kind of object
#[async_trait]
pub trait ResourceSource: Send + Sync + 'static {
    /// A human readable name for logs
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// List every object of the kind, together with the list's resume token
    async fn list(&self) -> Result<ObjectList, SourceError>;

    /// Open a watch that delivers changes made after `from`
    async fn watch(&self, from: ResourceVersion) -> Result<WatchStream, SourceError>;
}
