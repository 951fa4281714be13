//! Lists and watches one kind, republishing what it sees as queue [`Event`]s
//!
//! A [`Reflector`] never touches the cache. It only feeds the shared event queue that the
//! dispatcher drains, and restarts itself from a fresh list whenever the watch fails or closes.

use std::time::Duration;

use futures::StreamExt;
use kontroller_core::{ErrorResponse, ResourceObject, ResourceVersion, WatchEvent};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::source::{ResourceSource, SourceError, WatchStream};

/// Default pause between a failure and the next list
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Failures a reflector recovers from by relisting
#[derive(Error, Debug)]
pub enum Error {
    /// The list call failed
    #[error("failed to perform initial object list: {0}")]
    InitialListFailed(#[source] SourceError),
    /// The watch could not be opened
    #[error("failed to start watching object: {0}")]
    WatchStartFailed(#[source] SourceError),
    /// The server sent an error event on the stream
    #[error("error returned by apiserver during watch: {0}")]
    WatchError(#[source] ErrorResponse),
    /// The stream itself failed
    #[error("watch stream failed: {0}")]
    WatchFailed(#[source] SourceError),
}

/// Events flowing from reflectors to the dispatcher
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// An object returned by a list, loaded without invoking callbacks
    Init(ResourceObject),
    /// The list of `kind` has been fully delivered through [`Event::Init`]
    Boot {
        /// The kind that finished loading
        kind: String,
    },
    /// Every cached object of `kind` is about to be replaced by a fresh list
    Flush {
        /// The kind to evict
        kind: String,
    },
    /// A resume token was observed
    UpdateResourceVersion(ResourceVersion),
    /// An object was added
    Added(ResourceObject),
    /// An object was modified
    Modified(ResourceObject),
    /// An object was deleted
    Deleted(ResourceObject),
    /// Something arrived on a stream that the dispatcher has no handling for
    Unrecognized {
        /// The wire type of the event
        event_type: String,
        /// A description of the event for logs
        detail: String,
    },
}

/// The internal finite state machine driving a [`Reflector`]
enum State {
    /// The next step performs a list of every object of the kind
    Listing,
    /// The list was delivered, so the next step opens the watch from its token
    Listed {
        kind: String,
        resource_version: ResourceVersion,
    },
    /// The watch is in progress, from this point we just forward events from the source
    Streaming { kind: String, stream: WatchStream },
    /// Something failed or the stream closed; wait, then list again
    Backoff,
}

/// The dispatcher is gone, so there is no one left to feed
struct QueueClosed;

/// Keeps the event queue fed with the state of one kind
pub struct Reflector<S> {
    source: S,
    events: mpsc::UnboundedSender<Event>,
    backoff: Duration,
}

impl<S: ResourceSource> Reflector<S> {
    /// Create a reflector feeding `events` from `source`
    ///
    /// `backoff` is the fixed pause after every failure or stream closure.
    pub fn new(source: S, events: mpsc::UnboundedSender<Event>, backoff: Duration) -> Self {
        Self {
            source,
            events,
            backoff,
        }
    }

    /// Run until `shutdown` is cancelled or the event queue is closed
    ///
    /// Failures never end the loop; they are logged and followed by a relist after the backoff.
    #[tracing::instrument(name = "reflector", skip_all, fields(source = %self.source.name()))]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("reflector started");
        let mut state = State::Listing;
        loop {
            let step = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                step = self.step(state) => step,
            };
            match step {
                Ok(next) => state = next,
                Err(QueueClosed) => {
                    debug!("event queue closed");
                    break;
                }
            }
        }
        info!("reflector stopped");
    }

    /// Progresses the reflector a single step
    async fn step(&self, state: State) -> Result<State, QueueClosed> {
        match state {
            State::Listing => match self.source.list().await {
                Ok(list) => {
                    let list = list.stamp_items();
                    let kind = list.item_kind().to_string();
                    let resource_version = list.resource_version;
                    debug!(%kind, items = list.items.len(), %resource_version, "listed objects");

                    self.send(Event::Flush { kind: kind.clone() })?;
                    self.send(Event::UpdateResourceVersion(resource_version))?;
                    for obj in list.items {
                        self.send(Event::Init(obj))?;
                    }
                    self.send(Event::Boot { kind: kind.clone() })?;
                    Ok(State::Listed {
                        kind,
                        resource_version,
                    })
                }
                Err(err) => {
                    warn!(error = %Error::InitialListFailed(err), "list failed, backing off");
                    Ok(State::Backoff)
                }
            },
            State::Listed {
                kind,
                resource_version,
            } => match self.source.watch(resource_version).await {
                Ok(stream) => {
                    info!(%kind, %resource_version, "watch started");
                    Ok(State::Streaming { kind, stream })
                }
                Err(err) => {
                    warn!(%kind, error = %Error::WatchStartFailed(err), "watch failed to start, backing off");
                    Ok(State::Backoff)
                }
            },
            State::Streaming { kind, mut stream } => match stream.next().await {
                Some(Ok(event)) => {
                    if self.forward(event)? {
                        Ok(State::Streaming { kind, stream })
                    } else {
                        Ok(State::Backoff)
                    }
                }
                Some(Err(err)) => {
                    warn!(%kind, error = %Error::WatchFailed(err), "watch stream failed, backing off");
                    Ok(State::Backoff)
                }
                None => {
                    info!(%kind, "watch stream closed, restarting");
                    Ok(State::Backoff)
                }
            },
            State::Backoff => {
                tokio::time::sleep(self.backoff).await;
                Ok(State::Listing)
            }
        }
    }

    /// Forward one watch event, returning whether the stream is still usable
    fn forward(&self, event: WatchEvent) -> Result<bool, QueueClosed> {
        let resource_version = event.resource_version();
        match event {
            WatchEvent::Added(obj) => self.send(Event::Added(obj))?,
            WatchEvent::Modified(obj) => self.send(Event::Modified(obj))?,
            WatchEvent::Deleted(obj) => self.send(Event::Deleted(obj))?,
            WatchEvent::Bookmark(_) => {}
            WatchEvent::Error(err) => {
                let gone = err.is_gone();
                self.send(Event::Unrecognized {
                    event_type: "ERROR".into(),
                    detail: format!("{err:?}"),
                })?;
                if gone {
                    warn!(error = %Error::WatchError(err), "resource version expired, relisting");
                    return Ok(false);
                }
            }
        }
        if let Some(rv) = resource_version {
            self.send(Event::UpdateResourceVersion(rv))?;
        }
        Ok(true)
    }

    fn send(&self, event: Event) -> Result<(), QueueClosed> {
        self.events.send(event).map_err(|_| QueueClosed)
    }
}
