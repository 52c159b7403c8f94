use std::sync::Arc;

use storage::repository::PersistenceAdapter;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum PersistCommand {
    Save { key: String, value: String },
    Clear { key: String },
    Flush(oneshot::Sender<()>),
}

/// Background writer that applies persistence commands strictly in the order
/// they were enqueued.
///
/// Failures are logged and dropped; the in-memory model stays authoritative.
pub(crate) struct PersistenceWorker {
    adapter: Arc<dyn PersistenceAdapter>,
    cmd_rx: mpsc::UnboundedReceiver<PersistCommand>,
}

impl PersistenceWorker {
    /// Spawn the writer on the current Tokio runtime.
    pub(crate) fn spawn(adapter: Arc<dyn PersistenceAdapter>) -> (PersistenceHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let worker = Self { adapter, cmd_rx };
        let join = tokio::spawn(worker.run());
        (PersistenceHandle { cmd_tx }, join)
    }

    async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                PersistCommand::Save { key, value } => {
                    if let Err(err) = self.adapter.save(&key, &value).await {
                        tracing::warn!(key = %key, error = %err, "persistence save failed");
                    }
                }
                PersistCommand::Clear { key } => {
                    if let Err(err) = self.adapter.clear(&key).await {
                        tracing::warn!(key = %key, error = %err, "persistence clear failed");
                    }
                }
                PersistCommand::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        tracing::debug!("persistence worker stopped");
    }
}

/// Fire-and-forget sender side of the persistence worker.
#[derive(Clone)]
pub(crate) struct PersistenceHandle {
    cmd_tx: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistenceHandle {
    pub(crate) fn save(&self, key: String, value: String) {
        self.send(PersistCommand::Save { key, value });
    }

    pub(crate) fn clear(&self, key: String) {
        self.send(PersistCommand::Clear { key });
    }

    /// Resolves once every command enqueued before this call has been applied.
    pub(crate) async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.cmd_tx.send(PersistCommand::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    fn send(&self, cmd: PersistCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::warn!("persistence worker is gone; write dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryStore;

    #[tokio::test]
    async fn writes_apply_in_order_before_flush_returns() {
        let store = InMemoryStore::new();
        let (handle, _join) = PersistenceWorker::spawn(Arc::new(store.clone()));

        handle.save("k".into(), "1".into());
        handle.save("k".into(), "2".into());
        handle.clear("other".into());
        handle.save("other".into(), "x".into());
        handle.flush().await;

        assert_eq!(store.load("k").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.load("other").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn worker_drains_queue_after_handle_is_dropped() {
        let store = InMemoryStore::new();
        let (handle, join) = PersistenceWorker::spawn(Arc::new(store.clone()));
        handle.save("k".into(), "v".into());
        drop(handle);
        join.await.unwrap();
        assert_eq!(store.load("k").await.unwrap().as_deref(), Some("v"));
    }
}
