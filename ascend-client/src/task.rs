//! Background tasks whose lifetime is bound to a value: started on construction, stopped exactly
//! once by [`ScopedTask::stop`] or, failing that, aborted on drop.
use std::future::Future;

use tokio::{select, sync::oneshot, task::JoinHandle};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct ScopedTask {
    name: &'static str,
    close_tx: Option<oneshot::Sender<()>>,
    jh: Option<JoinHandle<()>>,
}

impl ScopedTask {
    /// Spawns `body` on the current runtime. `body` is dropped at its next suspension point once
    /// the task is stopped.
    pub fn spawn<F>(name: &'static str, body: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (close_tx, close_rx) = oneshot::channel::<()>();
        let jh = tokio::spawn(async move {
            select! {
                _ = body => {
                    debug!(task = name, "Task body finished");
                },
                _ = close_rx => {
                    debug!(task = name, "Task received close signal. Stopping");
                }
            }
        });
        Self { name, close_tx: Some(close_tx), jh: Some(jh) }
    }

    pub fn is_finished(&self) -> bool {
        self.jh
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Signals the task to stop and waits for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        if let Some(jh) = self.jh.take() {
            if let Err(e) = jh.await {
                warn!(task = self.name, error = %e, "Task did not exit cleanly");
            }
        }
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        if let Some(jh) = self.jh.take() {
            debug!(task = self.name, "Aborting task on drop");
            jh.abort();
        }
    }
}
