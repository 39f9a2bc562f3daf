//! Wallet connection state shared with every consumer through an explicit context.
//!
//! `Disconnected -> Connecting -> Connected`, back to `Disconnected` on
//! disconnect or when the account list empties. Consumers call
//! [`WalletContext::subscribe`] and re-derive their state on each change.

use ethers::signers::{LocalWallet, Signer};
use ethers_core::types::Address;
use ethers_providers::Middleware;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::error::{DexError, DexResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { address: Address, chain_id: u64 },
}

/// Change notifications from whatever holds the keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

#[derive(Debug)]
pub struct WalletContext {
    state: watch::Sender<ConnectionState>,
}

impl Default for WalletContext {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletContext {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { state }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn address(&self) -> DexResult<Address> {
        match self.state() {
            ConnectionState::Connected { address, .. } => Ok(address),
            _ => Err(DexError::NotConnected),
        }
    }

    pub fn chain_id(&self) -> DexResult<u64> {
        match self.state() {
            ConnectionState::Connected { chain_id, .. } => Ok(chain_id),
            _ => Err(DexError::NotConnected),
        }
    }

    /// Returns false when a connection is already under way or established.
    pub fn begin_connect(&self) -> bool {
        self.state.send_if_modified(|state| match state {
            ConnectionState::Disconnected => {
                *state = ConnectionState::Connecting;
                true
            }
            _ => false,
        })
    }

    pub fn complete_connect(&self, address: Address, chain_id: u64) -> DexResult<()> {
        let mut completed = false;
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected { address, chain_id };
                completed = true;
            }
            completed
        });
        if !completed {
            return Err(DexError::NotConnected);
        }
        info!("connected {:?} on chain {}", address, chain_id);
        Ok(())
    }

    pub fn fail_connect(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
    }

    pub fn disconnect(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                false
            } else {
                *state = ConnectionState::Disconnected;
                true
            }
        });
    }

    /// Applies an account or network change. Losing every account resets a pending or
    /// established connection; other changes only touch an established one.
    pub fn apply(&self, event: WalletEvent) {
        self.state.send_if_modified(|state| {
            let next = match (*state, &event) {
                (ConnectionState::Disconnected, _) => return false,
                (_, WalletEvent::AccountsChanged(accounts)) if accounts.is_empty() => {
                    ConnectionState::Disconnected
                }
                (ConnectionState::Connecting, _) => return false,
                (ConnectionState::Connected { chain_id, .. }, WalletEvent::AccountsChanged(accounts)) => {
                    match accounts.first() {
                        Some(account) => ConnectionState::Connected {
                            address: *account,
                            chain_id,
                        },
                        None => ConnectionState::Disconnected,
                    }
                }
                (ConnectionState::Connected { address, .. }, WalletEvent::ChainChanged(id)) => {
                    ConnectionState::Connected {
                        address,
                        chain_id: *id,
                    }
                }
            };
            if next == *state {
                return false;
            }
            info!("wallet change: {:?}", next);
            *state = next;
            true
        });
    }

    /// Runs the full lifecycle for a local key, taking the chain id from `client`.
    /// Returns the wallet bound to that chain id, ready for signing.
    pub async fn connect_local<M: Middleware>(
        &self,
        client: &M,
        wallet: LocalWallet,
    ) -> DexResult<LocalWallet> {
        if !self.begin_connect() {
            return Err(DexError::Config("wallet already connected".to_string()));
        }
        let chain_id = match client.get_chainid().await {
            Ok(id) => id.low_u64(),
            Err(e) => {
                self.fail_connect();
                return Err(DexError::provider(e));
            }
        };
        let wallet = wallet.with_chain_id(chain_id);
        self.complete_connect(wallet.address(), chain_id)?;
        Ok(wallet)
    }
}

pub fn load_wallet(private_key: &str) -> DexResult<LocalWallet> {
    private_key
        .trim()
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .map_err(|e| DexError::Config(format!("invalid private key: {e}")))
}
