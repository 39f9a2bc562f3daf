use ethers_core::types::{Address, H256};
use thiserror::Error;

pub type DexResult<T> = std::result::Result<T, DexError>;

#[derive(Debug, Error)]
pub enum DexError {
    /// One side of the pair holds no reserve, so no price exists.
    #[error("pool has no liquidity")]
    NoLiquidity,

    #[error("token {0:?} is not part of the configured pair")]
    UnknownToken(Address),

    #[error("unknown token symbol {0}")]
    UnknownSymbol(String),

    /// A single transaction/block lookup failed while reconstructing history.
    #[error("lookup failed for transaction {tx_hash:?}: {reason}")]
    LookupFailed { tx_hash: H256, reason: String },

    #[error("{call} failed on-chain: {reason}")]
    ContractCallReverted { call: &'static str, reason: String },

    #[error("input amount too small to produce any output")]
    InsufficientOutput,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("wallet not connected")]
    NotConnected,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("abi error: {0}")]
    Abi(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DexError {
    pub fn provider(err: impl std::fmt::Display) -> Self {
        DexError::Provider(err.to_string())
    }

    pub fn reverted(call: &'static str, err: impl std::fmt::Display) -> Self {
        DexError::ContractCallReverted {
            call,
            reason: err.to_string(),
        }
    }
}
