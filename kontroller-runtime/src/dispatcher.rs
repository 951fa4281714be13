//! The single consumer of the event queue
//!
//! The dispatcher is the only writer of the [`Cache`] and the only caller of [`Handler`]
//! callbacks. Events are applied one at a time in the order they were enqueued. When the queue
//! stays quiet for a full resync interval, the handler is asked to look at the whole cache.

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    cache::Cache,
    handler::{Context, Handler, Trigger},
    reflector::Event,
};

/// Tracks when the last liveness line was logged
#[derive(Debug)]
struct Heartbeat {
    interval: Duration,
    last: Instant,
}

impl Heartbeat {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Whether a mark is due after an idle resync, resetting the clock when it is
    fn tick(&mut self, busy: bool) -> bool {
        if busy || self.last.elapsed() < self.interval {
            return false;
        }
        self.last = Instant::now();
        true
    }
}

pub(crate) struct Dispatcher<H> {
    handler: Arc<H>,
    cache: Cache,
    ctx: Context,
    events: mpsc::UnboundedReceiver<Event>,
    heartbeat: Heartbeat,
}

impl<H: Handler> Dispatcher<H> {
    pub(crate) fn new(
        handler: Arc<H>,
        cache: Cache,
        ctx: Context,
        events: mpsc::UnboundedReceiver<Event>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            handler,
            cache,
            ctx,
            events,
            heartbeat: Heartbeat::new(heartbeat_interval),
        }
    }

    /// Drain the queue until `shutdown` is cancelled or every producer is gone
    #[tracing::instrument(name = "dispatcher", skip_all, fields(resync = ?resync_interval))]
    pub(crate) async fn run(mut self, resync_interval: Duration, shutdown: CancellationToken) {
        info!("dispatcher started");
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = tokio::time::timeout(resync_interval, self.events.recv()) => next,
            };
            match next {
                Ok(Some(event)) => self.apply(event),
                Ok(None) => {
                    debug!("event queue closed");
                    break;
                }
                Err(_elapsed) => {
                    let busy = self.resync();
                    if self.heartbeat.tick(busy) {
                        info!("-- MARK --");
                    }
                }
            }
        }
        info!("dispatcher stopped");
    }

    /// Apply one event to the cache and notify the handler
    fn apply(&self, event: Event) {
        match event {
            Event::Init(obj) => {
                trace!(object = %obj, "init");
                self.cache.add(obj);
            }
            Event::Boot { kind } => {
                debug!(%kind, "booting");
                let trigger = Trigger::Boot { kind };
                self.cache
                    .with_snapshot(|snap| self.handler.process_objects(&self.ctx, snap, trigger));
            }
            Event::Flush { kind } => {
                let evicted = self.cache.flush(&kind);
                debug!(%kind, evicted, "flushed");
            }
            Event::UpdateResourceVersion(rv) => {
                if self.cache.observe_resource_version(rv) {
                    trace!(resource_version = %rv, "resource version advanced");
                }
            }
            Event::Added(obj) => {
                debug!(object = %obj, "added");
                self.cache.add(obj.clone());
                self.handler.added_object(&self.ctx, &obj);
            }
            Event::Modified(obj) => {
                debug!(object = %obj, "modified");
                let old = self.cache.get(&obj.kind, &obj.uid);
                self.handler.modified_object(&self.ctx, old.as_ref(), &obj);
                self.cache.update(obj);
            }
            Event::Deleted(obj) => {
                debug!(object = %obj, "deleted");
                self.handler.deleted_object(&self.ctx, &obj);
                self.cache.delete(&obj);
            }
            Event::Unrecognized { event_type, detail } => {
                warn!(%event_type, %detail, "unhandled event");
            }
        }
    }

    /// Hand the whole cache to the handler, returning whether it reported pending work
    fn resync(&self) -> bool {
        debug!(objects = self.cache.len(), "resyncing");
        self.cache
            .with_snapshot(|snap| self.handler.process_objects(&self.ctx, snap, Trigger::Resync))
    }
}
