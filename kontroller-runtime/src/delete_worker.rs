//! Runs deletion callbacks one at a time, away from the dispatcher
use std::future::Future;

use futures::{future::BoxFuture, FutureExt};
use kontroller_core::ResourceObject;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::source::BoxError;

type DeleteFn = Box<dyn FnOnce(ResourceObject) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

struct DeleteTask {
    object: ResourceObject,
    delete: DeleteFn,
}

/// Creates a connected [`Deleter`] and [`DeleteWorker`]
pub(crate) fn channel() -> (Deleter, DeleteWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Deleter { tx }, DeleteWorker { rx })
}

/// Enqueues deletions for the delete worker
///
/// Cloning produces another handle to the same queue.
#[derive(Clone)]
pub struct Deleter {
    tx: mpsc::UnboundedSender<DeleteTask>,
}

impl Deleter {
    /// Queue `delete(object)` and return immediately
    ///
    /// The callback is run at most once. A failure is logged and the task dropped; telling
    /// acceptable failures (such as the object already being gone) apart is up to `delete`.
    pub fn delete_object<F, Fut, E>(&self, object: ResourceObject, delete: F)
    where
        F: FnOnce(ResourceObject) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let delete: DeleteFn = Box::new(move |obj| {
            async move { delete(obj).await.map_err(Into::<BoxError>::into) }.boxed()
        });
        if let Err(mpsc::error::SendError(task)) = self.tx.send(DeleteTask { object, delete }) {
            warn!(object = %task.object, "delete worker has stopped, dropping deletion");
        }
    }
}

impl std::fmt::Debug for Deleter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deleter").finish_non_exhaustive()
    }
}

/// Consumes the delete queue
pub(crate) struct DeleteWorker {
    rx: mpsc::UnboundedReceiver<DeleteTask>,
}

impl DeleteWorker {
    /// Run queued deletions until `shutdown` is cancelled or every [`Deleter`] is dropped
    #[tracing::instrument(name = "delete_worker", skip_all)]
    pub(crate) async fn run(mut self, shutdown: CancellationToken) {
        info!("delete worker started");
        loop {
            let task = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                task = self.rx.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            execute(task).await;
        }
        info!("delete worker stopped");
    }
}

/// Run a single deletion on its own task so that a panic stays contained
async fn execute(task: DeleteTask) {
    let DeleteTask { object, delete } = task;
    let id = object.to_string();
    debug!(object = %id, "deleting");
    match tokio::spawn(async move { delete(object).await }).await {
        Ok(Ok(())) => debug!(object = %id, "deleted"),
        Ok(Err(err)) => warn!(object = %id, error = %err, "delete failed, dropping task"),
        Err(err) if err.is_panic() => error!(object = %id, "delete callback panicked, dropping task"),
        Err(err) => warn!(object = %id, error = %err, "delete task was cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use super::channel;
    use kontroller_core::ResourceObject;
    use parking_lot::Mutex;
    use std::{sync::Arc, time::Duration};
    use tokio::sync::{mpsc, oneshot};
    use tokio_util::sync::CancellationToken;

    fn job(name: &str) -> ResourceObject {
        ResourceObject::new("Job", name, name).within("batch")
    }

    #[tokio::test]
    async fn delete_object_does_not_wait_for_the_callback() {
        let (deleter, _worker) = channel();
        let (tx, rx) = oneshot::channel::<()>();
        // The worker is not even running; enqueueing must still return at once.
        deleter.delete_object(job("a"), move |_| async move {
            let _ = rx.await;
            Ok::<_, std::io::Error>(())
        });
        drop(tx);
    }

    #[tokio::test]
    async fn runs_deletions_in_order() {
        let (deleter, worker) = channel();
        let token = CancellationToken::new();
        tokio::spawn(worker.run(token.clone()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        for name in ["a", "b", "c"] {
            let tx = tx.clone();
            deleter.delete_object(job(name), move |obj| async move {
                tx.send(obj.name).unwrap();
                Ok::<_, std::io::Error>(())
            });
        }
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv().await.unwrap());
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        token.cancel();
    }

    #[tokio::test]
    #[allow(unreachable_code)]
    async fn failures_and_panics_do_not_stop_the_worker() {
        let (deleter, worker) = channel();
        let token = CancellationToken::new();
        tokio::spawn(worker.run(token.clone()));

        let calls = Arc::new(Mutex::new(Vec::new()));
        let c = calls.clone();
        deleter.delete_object(job("fails"), move |obj| async move {
            c.lock().push(obj.name);
            Err::<(), _>("404 not found".to_string())
        });
        deleter.delete_object(job("panics"), |_| async move {
            panic!("callback blew up");
            Ok::<_, std::io::Error>(())
        });
        let (tx, rx) = oneshot::channel();
        let c = calls.clone();
        deleter.delete_object(job("works"), move |obj| async move {
            c.lock().push(obj.name);
            tx.send(()).unwrap();
            Ok::<_, std::io::Error>(())
        });

        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("worker died")
            .unwrap();
        assert_eq!(*calls.lock(), vec!["fails", "works"]);
        token.cancel();
    }

    #[tokio::test]
    async fn each_callback_runs_at_most_once() {
        let (deleter, worker) = channel();
        let token = CancellationToken::new();
        tokio::spawn(worker.run(token.clone()));

        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        deleter.delete_object(job("once"), move |_| async move {
            *c.lock() += 1;
            Err::<(), _>("boom".to_string())
        });
        let (tx, rx) = oneshot::channel();
        deleter.delete_object(job("marker"), move |_| async move {
            tx.send(()).unwrap();
            Ok::<_, std::io::Error>(())
        });
        rx.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*count.lock(), 1);
        token.cancel();
    }
}
