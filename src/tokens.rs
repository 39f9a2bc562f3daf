use ethers_core::{
    types::{Address, U256},
    utils::{format_units, parse_units},
};

use crate::{
    error::{DexError, DexResult},
    types::TokenDescriptor,
    utils::u256_to_f64,
};

/// LP tokens of a Uniswap-V2 pair always carry 18 decimals.
pub const LP_DECIMALS: u8 = 18;

impl TokenDescriptor {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }

    pub fn format(&self, raw: U256) -> String {
        format_amount(raw, self.decimals)
    }

    /// Parses a user-entered decimal amount into raw units. Zero is rejected.
    pub fn parse(&self, amount: &str) -> DexResult<U256> {
        parse_amount(amount, self.decimals)
    }

    pub fn to_f64(&self, raw: U256) -> f64 {
        u256_to_f64(raw) / 10f64.powi(i32::from(self.decimals))
    }
}

pub fn format_amount(raw: U256, decimals: u8) -> String {
    format_units(raw, u32::from(decimals)).unwrap_or_else(|_| raw.to_string())
}

pub fn format_lp(raw: U256) -> String {
    format_amount(raw, LP_DECIMALS)
}

pub fn parse_amount(amount: &str, decimals: u8) -> DexResult<U256> {
    let trimmed = amount.trim();
    if trimmed.starts_with('-') {
        return Err(DexError::InvalidAmount(format!("{amount} is negative")));
    }
    let raw: U256 = parse_units(trimmed, u32::from(decimals))
        .map_err(|e| DexError::InvalidAmount(format!("{amount}: {e}")))?
        .into();
    if raw.is_zero() {
        return Err(DexError::InvalidAmount(format!("{amount} must be positive")));
    }
    Ok(raw)
}

/// The two tokens a pair trades, with decimals fixed by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub a: TokenDescriptor,
    pub b: TokenDescriptor,
}

impl TokenPair {
    pub fn new(a: TokenDescriptor, b: TokenDescriptor) -> DexResult<Self> {
        if a.address == b.address {
            return Err(DexError::Config(format!(
                "token addresses must differ, both are {:?}",
                a.address
            )));
        }
        Ok(Self { a, b })
    }

    pub fn descriptor(&self, address: Address) -> DexResult<&TokenDescriptor> {
        if address == self.a.address {
            Ok(&self.a)
        } else if address == self.b.address {
            Ok(&self.b)
        } else {
            Err(DexError::UnknownToken(address))
        }
    }

    pub fn by_symbol(&self, symbol: &str) -> DexResult<&TokenDescriptor> {
        [&self.a, &self.b]
            .into_iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| DexError::UnknownSymbol(symbol.to_string()))
    }

    pub fn counterpart(&self, address: Address) -> DexResult<&TokenDescriptor> {
        if address == self.a.address {
            Ok(&self.b)
        } else if address == self.b.address {
            Ok(&self.a)
        } else {
            Err(DexError::UnknownToken(address))
        }
    }
}
