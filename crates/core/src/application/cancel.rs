// Job Cancellation Token

use tokio::sync::watch;

/// Cancellation signal observed by in-flight jobs
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// Pends forever if the sender is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Cancellation sender
pub struct CancelSender {
    tx: watch::Sender<bool>,
}

impl CancelSender {
    /// Signal cancellation to every token
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Cancel once the returned guard goes out of scope
    pub fn drop_guard(self) -> CancelOnDrop {
        CancelOnDrop { sender: self }
    }
}

/// Fires its token when dropped, e.g. together with an abandoned future
pub struct CancelOnDrop {
    sender: CancelSender,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.sender.cancel();
    }
}

/// Create a cancellation channel
pub fn cancel_channel() -> (CancelSender, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSender { tx }, CancelToken { rx })
}
