//! Kontroller keeps an in-memory mirror of remote objects and reacts to their changes
//!
//! The crate is a facade over two smaller crates:
//!
//! - [`core`]: the [`ResourceObject`] record, [`ResourceVersion`] tokens and the watch wire types;
//! - [`runtime`]: reflectors, the cache, the dispatcher and the [`Controller`] tying them together.
//!
//! Applications implement [`Handler`] and adapt their API client to [`ResourceSource`], one
//! source per watched kind:
//!
//! ```rust,ignore
//! let mut controller = Controller::new(MyHandler::default());
//! controller.add_watch(jobs).add_watch(pods);
//! controller.run(DEFAULT_RESYNC_INTERVAL).await?;
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Re-exports from [`kontroller-runtime`](kontroller_runtime)
#[cfg(feature = "runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "runtime")))]
#[doc(inline)]
pub use kontroller_runtime as runtime;

#[cfg(feature = "runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "runtime")))]
pub use crate::runtime::{
    Cache, Config, Context, Controller, Handler, ResourceSource, Snapshot, SourceError, Trigger,
    DEFAULT_RESYNC_INTERVAL,
};

pub use crate::core::{ObjectList, ResourceObject, ResourceVersion, WatchEvent};
/// Re-exports from [`kontroller_core`](kontroller_core)
#[doc(inline)]
pub use kontroller_core as core;
