use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use kontroller_core::{ObjectList, ResourceVersion, WatchEvent};
use parking_lot::Mutex;

use super::{ResourceSource, SourceError, WatchStream};

/// A scripted, in-memory [`ResourceSource`]
///
/// Every call to `list` or `watch` consumes the next scripted response, in order. When the
/// list script runs dry, `list` fails; when the watch script runs dry, `watch` returns a
/// stream that stays open without ever yielding. Clones share the same script and call log,
/// so a test can keep one handle while the controller owns the other.
#[derive(Clone, Default)]
pub struct MemorySource {
    name: String,
    script: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    lists: VecDeque<Result<ObjectList, String>>,
    watches: VecDeque<Watch>,
    list_calls: usize,
    watch_calls: Vec<ResourceVersion>,
}

enum Watch {
    /// Deliver the events, then keep the stream open
    Open(Vec<WatchEvent>),
    /// Deliver the events, then close the stream
    Close(Vec<WatchEvent>),
    /// Deliver the events, then fail the stream
    Fail(Vec<WatchEvent>, String),
    /// Refuse to open the stream
    Refuse(String),
}

impl MemorySource {
    /// Create an empty script, named `name` in logs
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            script: Arc::default(),
        }
    }

    /// Answer the next `list` call with `list`
    pub fn push_list(&self, list: ObjectList) -> &Self {
        self.script.lock().lists.push_back(Ok(list));
        self
    }

    /// Fail the next `list` call
    pub fn push_list_error(&self, msg: &str) -> &Self {
        self.script.lock().lists.push_back(Err(msg.into()));
        self
    }

    /// Answer the next `watch` call with `events`, leaving the stream open afterwards
    pub fn push_watch(&self, events: Vec<WatchEvent>) -> &Self {
        self.script.lock().watches.push_back(Watch::Open(events));
        self
    }

    /// Answer the next `watch` call with `events`, closing the stream afterwards
    pub fn push_closing_watch(&self, events: Vec<WatchEvent>) -> &Self {
        self.script.lock().watches.push_back(Watch::Close(events));
        self
    }

    /// Answer the next `watch` call with `events`, failing the stream afterwards
    pub fn push_failing_watch(&self, events: Vec<WatchEvent>, msg: &str) -> &Self {
        self.script.lock().watches.push_back(Watch::Fail(events, msg.into()));
        self
    }

    /// Refuse the next `watch` call
    pub fn push_watch_error(&self, msg: &str) -> &Self {
        self.script.lock().watches.push_back(Watch::Refuse(msg.into()));
        self
    }

    /// How many times `list` was called
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.script.lock().list_calls
    }

    /// The resume tokens every `watch` call was made with
    #[must_use]
    pub fn watch_calls(&self) -> Vec<ResourceVersion> {
        self.script.lock().watch_calls.clone()
    }
}

#[async_trait]
impl ResourceSource for MemorySource {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn list(&self) -> Result<ObjectList, SourceError> {
        let mut script = self.script.lock();
        script.list_calls += 1;
        match script.lists.pop_front() {
            Some(Ok(list)) => Ok(list),
            Some(Err(msg)) => Err(SourceError::new(msg)),
            None => Err(SourceError::new("no scripted list response")),
        }
    }

    async fn watch(&self, from: ResourceVersion) -> Result<WatchStream, SourceError> {
        let mut script = self.script.lock();
        script.watch_calls.push(from);
        let stream = match script.watches.pop_front() {
            None => stream::pending::<Result<WatchEvent, SourceError>>().boxed(),
            Some(Watch::Open(events)) => delivered(events).chain(stream::pending()).boxed(),
            Some(Watch::Close(events)) => delivered(events).boxed(),
            Some(Watch::Fail(events, msg)) => delivered(events)
                .chain(stream::once(async move { Err(SourceError::new(msg)) }))
                .boxed(),
            Some(Watch::Refuse(msg)) => return Err(SourceError::new(msg)),
        };
        Ok(stream)
    }
}

fn delivered(events: Vec<WatchEvent>) -> impl futures::Stream<Item = Result<WatchEvent, SourceError>> {
    stream::iter(events.into_iter().map(Ok))
}
