//! The application-facing callbacks of a [`Controller`](crate::Controller)
use std::future::Future;

use kontroller_core::ResourceObject;

use crate::{cache::Snapshot, delete_worker::Deleter, source::BoxError};

/// Why [`Handler::process_objects`] is being called
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// A reflector has just finished loading the full list of `kind`
    Boot {
        /// The kind that was (re)listed
        kind: String,
    },
    /// No event arrived within the resync interval
    Resync,
}

impl Trigger {
    /// Whether this call follows a completed list
    #[must_use]
    pub fn is_booting(&self) -> bool {
        matches!(self, Self::Boot { .. })
    }

    /// The kind that was listed, for [`Trigger::Boot`]
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Boot { kind } => Some(kind),
            Self::Resync => None,
        }
    }
}

/// Application logic driven by the dispatcher
///
/// Every method defaults to doing nothing. All callbacks run on the dispatcher task, one at a
/// time and in event order, so they should return quickly. Slow side effects belong in
/// [`Context::delete_object`] or a task spawned by the handler.
///
/// [`Handler::process_objects`] runs while the cache lock is held. It must not read the cache
/// through a [`Cache`](crate::Cache) handle; everything it needs is in the snapshot.
pub trait Handler: Send + Sync + 'static {
    /// Inspect the full cache after a list completes or when the controller has been idle
    ///
    /// Return `true` when work remains. This only silences the periodic heartbeat log.
    fn process_objects(&self, _ctx: &Context, _snapshot: &Snapshot<'_>, _trigger: Trigger) -> bool {
        false
    }

    /// An object was created
    fn added_object(&self, _ctx: &Context, _obj: &ResourceObject) {}

    /// An object changed
    ///
    /// `old` is the cached value before the change, if the object was cached at all.
    fn modified_object(&self, _ctx: &Context, _old: Option<&ResourceObject>, _new: &ResourceObject) {}

    /// An object was removed
    fn deleted_object(&self, _ctx: &Context, _obj: &ResourceObject) {}
}

/// Side-effect handle passed to every [`Handler`] callback
#[derive(Clone, Debug)]
pub struct Context {
    deleter: Deleter,
}

impl Context {
    pub(crate) fn new(deleter: Deleter) -> Self {
        Self { deleter }
    }

    /// Queue `delete(object)` on the delete worker and return immediately
    ///
    /// See [`Deleter::delete_object`].
    pub fn delete_object<F, Fut, E>(&self, object: ResourceObject, delete: F)
    where
        F: FnOnce(ResourceObject) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.deleter.delete_object(object, delete);
    }
}
