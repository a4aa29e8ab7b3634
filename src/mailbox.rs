use tokio::sync::{mpsc, Mutex};

use crate::error::Error;

/// Create a connected [`Postbox`] (for the ordering worker) and [`Mailbox`]
/// (for the application).
pub(crate) fn mailbox() -> (Postbox, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();

    (Postbox(tx), Mailbox(Mutex::new(rx)))
}

/// The producing end of a [`Mailbox`], held by the ordering worker.
#[derive(Clone, Debug)]
pub(crate) struct Postbox(mpsc::UnboundedSender<String>);

impl Postbox {
    /// Returns `false` if the [`Mailbox`] has been dropped.
    pub fn post(&self, payload: String) -> bool {
        self.0.send(payload).is_ok()
    }
}

/// Delivered message payloads, in delivery order, awaiting the application.
///
/// Once the node has shut down, the remaining payloads can still be received;
/// after that, every receive returns [`Error::Closed`].
#[derive(Debug)]
pub struct Mailbox(Mutex<mpsc::UnboundedReceiver<String>>);

impl Mailbox {
    /// Wait for the next delivered payload.
    pub async fn receive(&self) -> Result<String, Error> {
        self.0.lock().await.recv().await.ok_or(Error::Closed)
    }

    /// Take the next delivered payload if one is already waiting.
    ///
    /// Returns `Ok(None)` if the mailbox is empty (or another caller is
    /// currently receiving).
    pub fn try_receive(&self) -> Result<Option<String>, Error> {
        let Ok(mut rx) = self.0.try_lock() else {
            return Ok(None);
        };

        match rx.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(Error::Closed),
        }
    }

    /// Block the current thread until the next payload is delivered.
    ///
    /// # Panics
    ///
    /// If called from within an asynchronous execution context.
    pub fn blocking_receive(&self) -> Result<String, Error> {
        self.0.blocking_lock().blocking_recv().ok_or(Error::Closed)
    }
}
