//! Explicit wallet lifecycle. The connection owner decides when an account is active, consumers
//! only ever observe it through a [`WalletHandle`].
use alloy_primitives::Address;
use tokio::sync::watch;
use tracing::info;

/// Owns the connected account. Dropping the connection leaves all handles observing the last
/// state, which is treated like a disconnect by [`WalletHandle::account`] once the sender is gone.
#[derive(Debug)]
pub struct WalletConnection {
    tx: watch::Sender<Option<Address>>,
}

impl WalletConnection {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn connected(account: Address) -> Self {
        let (tx, _) = watch::channel(Some(account));
        Self { tx }
    }

    pub fn connect(&self, account: Address) {
        info!(%account, "Wallet connected");
        self.tx.send_replace(Some(account));
    }

    pub fn disconnect(&self) {
        if self.tx.send_replace(None).is_some() {
            info!("Wallet disconnected");
        }
    }

    pub fn handle(&self) -> WalletHandle {
        WalletHandle { rx: self.tx.subscribe() }
    }
}

impl Default for WalletConnection {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap, cloneable read access to the connected account.
#[derive(Debug, Clone)]
pub struct WalletHandle {
    rx: watch::Receiver<Option<Address>>,
}

impl WalletHandle {
    /// Handle that never has an account connected.
    pub fn disconnected() -> Self {
        let (_, rx) = watch::channel(None);
        Self { rx }
    }

    /// The currently connected account, `None` while disconnected or after the connection owner
    /// went away.
    pub fn account(&self) -> Option<Address> {
        if self.rx.has_changed().is_err() {
            return None;
        }
        *self.rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.account().is_some()
    }

    /// Resolves on the next connect or disconnect. Fails once the connection owner is dropped.
    pub async fn changed(&mut self) -> Result<Option<Address>, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(*self.rx.borrow_and_update())
    }
}
