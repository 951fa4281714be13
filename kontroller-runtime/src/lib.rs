//! Runtime components for kontroller
//!
//! This crate keeps an in-memory cache of remote objects in sync through list+watch
//! [`Reflector`]s, and feeds every change to application logic through a [`Handler`].
//!
//! Newcomers should generally get started with the [`Controller`], which owns the cache, the
//! event and delete queues, and the tasks driving them:
//!
//! - one [`Reflector`] per watched kind lists, then streams changes into a shared queue;
//! - a single dispatcher drains that queue, updates the [`Cache`] and calls the [`Handler`];
//! - a delete worker runs the deletions queued through [`Context::delete_object`].
//!
//! The runtime does not talk to any API server itself. Each watched kind is reached through a
//! [`ResourceSource`] supplied by the application; [`MemorySource`] is a scripted one for tests.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
// Panics only occur in tests
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod controller;
mod delete_worker;
mod dispatcher;
pub mod handler;
pub mod reflector;
pub mod source;

pub use cache::{Cache, Snapshot};
pub use controller::{Config, Controller, DEFAULT_RESYNC_INTERVAL};
pub use delete_worker::Deleter;
pub use handler::{Context, Handler, Trigger};
pub use reflector::{Event, Reflector};
pub use source::{BoxError, MemorySource, ResourceSource, SourceError, WatchStream};
