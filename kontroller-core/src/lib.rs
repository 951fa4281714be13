//! Types shared by every part of kontroller
//!
//! This crate holds the data model that flows through a controller: the decoded
//! [`ResourceObject`], the [`ObjectList`] returned by a list call, the comparable
//! [`ResourceVersion`] token and the wire-level [`WatchEvent`] delivered by a watch.
//!
//! It has no runtime of its own. The same types are re-exported from `kontroller` under `kontroller::core`.
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod object;
pub use object::{ObjectList, ResourceObject};

mod resource_version;
pub use resource_version::ResourceVersion;

pub mod watch;
pub use watch::{Bookmark, WatchEvent};

mod error;
pub use error::{Error, ErrorResponse};

/// Convient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
