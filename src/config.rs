use std::{fs, path::Path};

use ethers_core::types::{Address, H160};
use serde::{Deserialize, Serialize};

use crate::{
    error::{DexError, DexResult},
    tokens::TokenPair,
    types::TokenDescriptor,
};

pub const MOCK_TOKEN: Address = H160([
    0x85, 0x85, 0xc8, 0xbe, 0x8e, 0xec, 0x8d, 0x03, 0x1e, 0x7b, 0x7f, 0x65, 0xce, 0xe2, 0x89, 0x87,
    0xa6, 0x0a, 0x90, 0x0e,
]);
pub const USDC_TOKEN: Address = H160([
    0xbb, 0x38, 0x53, 0x4b, 0x7b, 0x48, 0xeb, 0x43, 0xb1, 0x2c, 0xb2, 0xf3, 0x0e, 0x3e, 0x61, 0x45,
    0x77, 0xe0, 0xd1, 0xb6,
]);
pub const PAIR_ADDRESS: Address = H160([
    0x15, 0x06, 0x41, 0x23, 0x45, 0x50, 0xb6, 0x54, 0x2c, 0x60, 0x6e, 0xd9, 0xd6, 0x4f, 0xf3, 0xfd,
    0xef, 0x2d, 0x19, 0x18,
]);
pub const FACTORY_ADDRESS: Address = H160([
    0xab, 0xcd, 0xef, 0xab, 0xcd, 0xef, 0xab, 0xcd, 0xef, 0xab, 0xcd, 0xef, 0xab, 0xcd, 0xef, 0xab,
    0xcd, 0xef, 0xab, 0xcd,
]);
pub const ROUTER_ADDRESS: Address = H160([
    0xfe, 0xdc, 0xba, 0xfe, 0xdc, 0xba, 0xfe, 0xdc, 0xba, 0xfe, 0xdc, 0xba, 0xfe, 0xdc, 0xba, 0xfe,
    0xdc, 0xba, 0xfe, 0xdc,
]);

pub const DEFAULT_FEE_BPS: u32 = 30;
pub const DEFAULT_SLIPPAGE_BPS: u32 = 200;
pub const DEFAULT_DEADLINE_SECS: u64 = 20 * 60;
pub const DEFAULT_HISTORY_WINDOW: u64 = 10_000;
pub const DEFAULT_LOG_CHUNK_SIZE: u64 = 5_000;
pub const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 16;
const MAX_DECIMALS: u8 = 36;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DexConfig {
    /// Pair to trade against. Zero means "resolve through the factory".
    pub pair: Address,
    pub router: Address,
    pub factory: Address,
    pub token_a: TokenDescriptor,
    pub token_b: TokenDescriptor,
    pub fee_bps: u32,
    pub slippage_bps: u32,
    pub deadline_secs: u64,
    pub history_window_blocks: u64,
    pub log_chunk_size: u64,
    /// Transaction lookups in flight at once while rebuilding history.
    pub max_concurrent_lookups: usize,
}

impl Default for DexConfig {
    fn default() -> Self {
        Self {
            pair: PAIR_ADDRESS,
            router: ROUTER_ADDRESS,
            factory: FACTORY_ADDRESS,
            token_a: TokenDescriptor::new(MOCK_TOKEN, "MOCK", 18),
            token_b: TokenDescriptor::new(USDC_TOKEN, "USDC", 6),
            fee_bps: DEFAULT_FEE_BPS,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            deadline_secs: DEFAULT_DEADLINE_SECS,
            history_window_blocks: DEFAULT_HISTORY_WINDOW,
            log_chunk_size: DEFAULT_LOG_CHUNK_SIZE,
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
        }
    }
}

impl DexConfig {
    /// Reads a JSON config; missing fields fall back to the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> DexResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| DexError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> DexResult<Self> {
        let config: DexConfig =
            serde_json::from_str(raw).map_err(|e| DexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DexResult<()> {
        if self.fee_bps >= 10_000 {
            return Err(DexError::Config(format!("fee_bps {} >= 10000", self.fee_bps)));
        }
        if self.slippage_bps >= 10_000 {
            return Err(DexError::Config(format!(
                "slippage_bps {} >= 10000",
                self.slippage_bps
            )));
        }
        if self.history_window_blocks == 0
            || self.log_chunk_size == 0
            || self.max_concurrent_lookups == 0
        {
            return Err(DexError::Config(
                "history window, log chunk size and lookup concurrency must be positive"
                    .to_string(),
            ));
        }
        for token in [&self.token_a, &self.token_b] {
            if token.decimals > MAX_DECIMALS {
                return Err(DexError::Config(format!(
                    "{} has {} decimals",
                    token.symbol, token.decimals
                )));
            }
        }
        if self.token_a.symbol.eq_ignore_ascii_case(&self.token_b.symbol) {
            return Err(DexError::Config("token symbols must differ".to_string()));
        }
        self.tokens().map(|_| ())
    }

    pub fn tokens(&self) -> DexResult<TokenPair> {
        TokenPair::new(self.token_a.clone(), self.token_b.clone())
    }
}
