use ethers_core::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::{DexError, DexResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Reserves of a pair as seen at one block. `token_a` is the pair's `token0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReserveSnapshot {
    pub reserve_a: U256,
    pub reserve_b: U256,
    pub token_a: Address,
    pub token_b: Address,
    pub block: Option<u64>,
}

impl PoolReserveSnapshot {
    /// Orders the reserves as `(reserve_in, reserve_out)` for a trade selling `from`.
    pub fn reserves_for(&self, from: Address) -> DexResult<(U256, U256)> {
        if from == self.token_a {
            Ok((self.reserve_a, self.reserve_b))
        } else if from == self.token_b {
            Ok((self.reserve_b, self.reserve_a))
        } else {
            Err(DexError::UnknownToken(from))
        }
    }

    pub fn counterpart(&self, token: Address) -> DexResult<Address> {
        if token == self.token_a {
            Ok(self.token_b)
        } else if token == self.token_b {
            Ok(self.token_a)
        } else {
            Err(DexError::UnknownToken(token))
        }
    }

    pub fn has_liquidity(&self) -> bool {
        !self.reserve_a.is_zero() && !self.reserve_b.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    /// Display-only: scaled `amount_out / amount_in`.
    pub rate: f64,
    /// Display-only: how far the execution price sits below spot, in basis points.
    pub price_impact_bps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionKind {
    Swap,
    AddLiquidity,
    RemoveLiquidity,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Swap => write!(f, "Swap"),
            TransactionKind::AddLiquidity => write!(f, "Add Liquidity"),
            TransactionKind::RemoveLiquidity => write!(f, "Remove Liquidity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAmounts {
    pub token_a_symbol: String,
    pub token_b_symbol: String,
    pub amount_a: String,
    pub amount_b: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lp_amount: Option<String>,
    /// Symbol of the token the wallet sold, for swaps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sold_symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub kind: TransactionKind,
    pub timestamp: u64,
    pub tx_hash: H256,
    pub block_number: u64,
    pub log_index: u64,
    pub amounts: RecordAmounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    pub pair: Address,
    pub snapshot: PoolReserveSnapshot,
    pub total_supply: U256,
    pub lp_balance: U256,
    /// Owner's fraction of the pool, 0.0..=1.0.
    pub share_of_pool: f64,
    pub redeemable_a: U256,
    pub redeemable_b: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balances {
    pub owner: Address,
    pub eth: U256,
    pub token_a: U256,
    pub token_b: U256,
}
