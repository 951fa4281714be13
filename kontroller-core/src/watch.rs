//! Types for the watch api
//!
//! See <https://kubernetes.io/docs/reference/using-api/api-concepts/#efficient-detection-of-changes>

use crate::{ErrorResponse, ResourceObject, ResourceVersion};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A raw event returned from a watch query
///
/// Note that a watch query returns many of these as newline separated JSON.
#[derive(Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum WatchEvent {
    /// Resource was added
    Added(ResourceObject),
    /// Resource was modified
    Modified(ResourceObject),
    /// Resource was deleted
    Deleted(ResourceObject),
    /// Resource bookmark, a progress marker without an object
    Bookmark(Bookmark),
    /// There was some kind of error
    Error(ErrorResponse),
}

impl WatchEvent {
    /// The resume token carried by the event
    ///
    /// `None` for error events.
    #[must_use]
    pub fn resource_version(&self) -> Option<ResourceVersion> {
        match self {
            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => {
                Some(o.resource_version)
            }
            WatchEvent::Bookmark(bm) => Some(bm.metadata.resource_version),
            WatchEvent::Error(_) => None,
        }
    }
}

impl Debug for WatchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self {
            WatchEvent::Added(o) => write!(f, "Added event for {o}"),
            WatchEvent::Modified(o) => write!(f, "Modified event for {o}"),
            WatchEvent::Deleted(o) => write!(f, "Deleted event for {o}"),
            WatchEvent::Bookmark(bm) => write!(f, "Bookmark event at {}", bm.metadata.resource_version),
            WatchEvent::Error(e) => write!(f, "Error event: {e:?}"),
        }
    }
}

/// Slimmed down object sent as a [`WatchEvent::Bookmark`]
///
/// Can only be relied upon to have metadata with resource version.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Bookmark {
    /// Basically empty metadata
    pub metadata: BookmarkMeta,
}

/// Slimmed down metadata for [`WatchEvent::Bookmark`]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkMeta {
    /// The only field we need from a Bookmark event.
    pub resource_version: ResourceVersion,
}

#[cfg(test)]
mod tests {
    use super::WatchEvent;
    use crate::ResourceVersion;
    use serde_json::json;

    #[test]
    fn decodes_wire_events() {
        let ev: WatchEvent = serde_json::from_value(json!({
            "type": "MODIFIED",
            "object": {
                "kind": "Namespace",
                "apiVersion": "v1",
                "metadata": {"name": "kube-system", "uid": "ns-1", "resourceVersion": "12"}
            }
        }))
        .unwrap();
        assert!(matches!(&ev, WatchEvent::Modified(o) if o.name == "kube-system"));
        assert_eq!(ev.resource_version(), Some(ResourceVersion::new(12)));
    }

    #[test]
    fn decodes_bookmarks() {
        let ev: WatchEvent = serde_json::from_value(json!({
            "type": "BOOKMARK",
            "object": {
                "kind": "Pod",
                "apiVersion": "v1",
                "metadata": {"resourceVersion": "3001"}
            }
        }))
        .unwrap();
        assert_eq!(ev.resource_version(), Some(ResourceVersion::new(3001)));
    }

    #[test]
    fn decodes_gone_errors() {
        let ev: WatchEvent = serde_json::from_value(json!({
            "type": "ERROR",
            "object": {
                "kind": "Status",
                "apiVersion": "v1",
                "status": "Failure",
                "message": "too old resource version: 1 (2)",
                "reason": "Expired",
                "code": 410
            }
        }))
        .unwrap();
        match ev {
            WatchEvent::Error(e) => assert!(e.is_gone()),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
