//! Wires reflectors, the dispatcher and the delete worker together
//!
//! A [`Controller`] owns every piece of mutable state: the cache, the event queue, the delete
//! queue and the tasks feeding them. Nothing is process-global, so several controllers can run
//! side by side in one program.
//!
//! ```rust,ignore
//! struct Pruner;
//!
//! impl Handler for Pruner {
//!     fn process_objects(&self, ctx: &Context, snapshot: &Snapshot<'_>, trigger: Trigger) -> bool {
//!         for job in snapshot.objects("Job") {
//!             // decide, then ctx.delete_object(job.clone(), |job| async move { /* ... */ })
//!         }
//!         false
//!     }
//! }
//!
//! let mut controller = Controller::new(Pruner);
//! controller.add_watch(jobs_source);
//! controller.run(Duration::from_secs(300)).await?;
//! ```

use std::{future::Future, sync::Arc, time::Duration};

use kontroller_core::ResourceObject;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    cache::Cache,
    delete_worker,
    dispatcher::Dispatcher,
    handler::{Context, Handler},
    reflector::{Event, Reflector, DEFAULT_BACKOFF},
    source::{BoxError, ResourceSource},
};

/// How long the dispatcher may sit idle before asking the handler to resync
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default time between two liveness lines while nothing is happening
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Controller error variants
#[derive(Debug, Error)]
pub enum Error {
    /// A configured duration was not usable
    #[error("invalid controller config: {0}")]
    InvalidConfig(String),
}

/// Controller result type
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Tunables of a [`Controller`]
#[derive(Clone, Debug)]
pub struct Config {
    /// Pause between a reflector failure (or closed stream) and its next list
    ///
    /// The pause is fixed; there is no exponential growth and no retry limit.
    pub backoff: Duration,
    /// Minimum time between two `-- MARK --` lines logged by an idle dispatcher
    pub heartbeat_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl Config {
    /// Sets the reflector backoff
    #[must_use]
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the heartbeat interval
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Check the config for unusable values
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] when `backoff` or `heartbeat_interval` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.backoff.is_zero() {
            return Err(Error::InvalidConfig("backoff must be greater than zero".into()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "heartbeat_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Keeps a [`Cache`] in sync with any number of watched kinds and drives a [`Handler`]
///
/// Must be created from within a tokio runtime: the delete worker is spawned on construction,
/// and every [`Controller::add_watch`] spawns a reflector right away. Events that reflectors
/// produce before [`Controller::run`] is called are queued and applied once it starts.
pub struct Controller<H> {
    handler: Arc<H>,
    config: Config,
    cache: Cache,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    context: Context,
    shutdown: CancellationToken,
    tasks: JoinSet<()>,
}

impl<H: Handler> Controller<H> {
    /// Create a controller with the default [`Config`]
    pub fn new(handler: H) -> Self {
        Self::build(handler, Config::default())
    }

    /// Create a controller with a custom [`Config`]
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the config does not [`validate`](Config::validate).
    pub fn with_config(handler: H, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(handler, config))
    }

    fn build(handler: H, config: Config) -> Self {
        let shutdown = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (deleter, worker) = delete_worker::channel();
        let mut tasks = JoinSet::new();
        tasks.spawn(worker.run(shutdown.child_token()));
        Self {
            handler: Arc::new(handler),
            config,
            cache: Cache::default(),
            events_tx,
            events_rx,
            context: Context::new(deleter),
            shutdown,
            tasks,
        }
    }

    /// Start a reflector for the kind served by `source`
    ///
    /// Every watched kind gets its own reflector; all of them feed the same queue.
    pub fn add_watch<S: ResourceSource>(&mut self, source: S) -> &mut Self {
        info!(source = %source.name(), "adding watch");
        let reflector = Reflector::new(source, self.events_tx.clone(), self.config.backoff);
        self.tasks.spawn(reflector.run(self.shutdown.child_token()));
        self
    }

    /// Queue `delete(object)` on the delete worker and return immediately
    ///
    /// Equivalent to [`Context::delete_object`].
    pub fn delete_object<F, Fut, E>(&self, object: ResourceObject, delete: F)
    where
        F: FnOnce(ResourceObject) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.context.delete_object(object, delete);
    }

    /// A handle to the cache kept by this controller
    #[must_use]
    pub fn cache(&self) -> Cache {
        self.cache.clone()
    }

    /// The context handed to every handler callback
    #[must_use]
    pub fn context(&self) -> Context {
        self.context.clone()
    }

    /// A token that stops the controller when cancelled
    ///
    /// Cancelling it stops every reflector, the dispatcher and the delete worker, after which
    /// [`Controller::run`] returns.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Process events until the shutdown token is cancelled
    ///
    /// Whenever no event arrives for `resync_interval`, [`Handler::process_objects`] is
    /// called over the whole cache.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `resync_interval` is zero.
    pub async fn run(self, resync_interval: Duration) -> Result<()> {
        if resync_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "resync interval must be greater than zero".into(),
            ));
        }
        let Controller {
            handler,
            config,
            cache,
            events_tx,
            events_rx,
            context,
            shutdown,
            mut tasks,
        } = self;
        // Holding a sender keeps the queue open while no reflector is registered.
        let _events_tx = events_tx;

        info!(reflectors = tasks.len().saturating_sub(1), "controller started");
        Dispatcher::new(handler, cache, context, events_rx, config.heartbeat_interval)
            .run(resync_interval, shutdown.clone())
            .await;

        shutdown.cancel();
        while let Some(res) = tasks.join_next().await {
            if let Err(err) = res {
                if err.is_panic() {
                    error!(error = %err, "controller task panicked");
                }
            }
        }
        info!("controller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, Controller, Error};
    use crate::{
        cache::Snapshot,
        handler::{Context, Handler, Trigger},
        source::MemorySource,
    };
    use kontroller_core::{ObjectList, ResourceObject, ResourceVersion, WatchEvent};
    use parking_lot::Mutex;
    use std::{sync::Arc, time::Duration};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Handler for Recorder {
        fn process_objects(&self, _ctx: &Context, snapshot: &Snapshot<'_>, trigger: Trigger) -> bool {
            self.calls
                .lock()
                .push(format!("process {} booting={}", snapshot.len(), trigger.is_booting()));
            false
        }

        fn added_object(&self, _ctx: &Context, obj: &ResourceObject) {
            self.calls.lock().push(format!("added {}", obj.uid));
        }

        fn deleted_object(&self, _ctx: &Context, obj: &ResourceObject) {
            self.calls.lock().push(format!("deleted {}", obj.uid));
        }
    }

    fn pod(uid: &str, rv: u64) -> ResourceObject {
        ResourceObject::new("Pod", uid, uid)
            .within("default")
            .with_resource_version(rv)
    }

    fn pod_list(rv: u64, items: Vec<ResourceObject>) -> ObjectList {
        ObjectList {
            kind: "PodList".into(),
            api_version: "v1".into(),
            resource_version: ResourceVersion::new(rv),
            items,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn applies_a_list_then_live_events() {
        let source = MemorySource::new("pods");
        source.push_list(pod_list(10, vec![]));
        source.push_watch(vec![
            WatchEvent::Added(pod("1", 11)),
            WatchEvent::Added(pod("2", 12)),
            WatchEvent::Deleted(pod("1", 13)),
        ]);
        let handler = Recorder::default();
        let calls = handler.calls.clone();

        let mut controller = Controller::new(handler);
        controller.add_watch(source);
        let cache = controller.cache();
        let token = controller.shutdown_token();
        let run = tokio::spawn(controller.run(Duration::from_secs(30)));

        for _ in 0..100 {
            if cache.resource_version() == ResourceVersion::new(13) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(cache.resource_version(), ResourceVersion::new(13));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("Pod", "2").is_some());
        assert_eq!(*calls.lock(), vec![
            "process 0 booting=true",
            "added 1",
            "added 2",
            "deleted 1",
        ]);

        token.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn resync_can_queue_deletions() {
        struct Reaper {
            deleted: mpsc::UnboundedSender<String>,
        }

        impl Handler for Reaper {
            fn process_objects(&self, ctx: &Context, snapshot: &Snapshot<'_>, trigger: Trigger) -> bool {
                if trigger == Trigger::Resync {
                    for obj in snapshot.objects("Pod") {
                        let deleted = self.deleted.clone();
                        ctx.delete_object(obj.clone(), move |obj| async move {
                            deleted.send(obj.name).map_err(|_| "receiver gone")
                        });
                    }
                }
                false
            }
        }

        let source = MemorySource::new("pods");
        source.push_list(pod_list(5, vec![pod("old", 3)]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = Controller::new(Reaper { deleted: tx });
        controller.add_watch(source);
        let token = controller.shutdown_token();
        let run = tokio::spawn(controller.run(Duration::from_secs(30)));

        let start = tokio::time::Instant::now();
        assert_eq!(rx.recv().await.as_deref(), Some("old"));
        assert!(start.elapsed() >= Duration::from_secs(30));

        token.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn run_returns_after_shutdown() {
        let controller = Controller::new(Recorder::default());
        let token = controller.shutdown_token();
        let run = tokio::spawn(controller.run(Duration::from_secs(30)));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("controller did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn zero_durations_are_rejected() {
        let err = Controller::with_config(Recorder::default(), Config::default().backoff(Duration::ZERO))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let controller = Controller::new(Recorder::default());
        assert!(matches!(
            controller.run(Duration::ZERO).await,
            Err(Error::InvalidConfig(_))
        ));
        assert!(Config::default().heartbeat_interval(Duration::ZERO).validate().is_err());
        assert!(Config::default().validate().is_ok());
    }
}
