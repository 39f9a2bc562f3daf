//! Off-chain replica of the pair's constant-product pricing.
//!
//! All amounts are raw token units and every step uses the same truncating
//! integer arithmetic as `UniswapV2Library.getAmountOut`, so the preview matches
//! what the router will execute for an unchanged pool.

use ethers_core::types::{Address, U256, U512};

use crate::{
    error::{DexError, DexResult},
    tokens::TokenPair,
    types::{PoolReserveSnapshot, SwapQuote},
    utils::u256_to_f64,
};

pub const BPS_DENOMINATOR: u32 = 10_000;

/// `amountOut = reserveOut * amountIn * (10000 - fee) / (reserveIn * 10000 + amountIn * (10000 - fee))`
pub fn get_amount_out(
    reserve_in: U256,
    reserve_out: U256,
    amount_in: U256,
    fee_bps: u32,
) -> DexResult<U256> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(DexError::NoLiquidity);
    }
    if amount_in.is_zero() {
        return Err(DexError::InvalidAmount("amount in must be positive".to_string()));
    }
    if fee_bps >= BPS_DENOMINATOR {
        return Err(DexError::InvalidAmount(format!("fee of {fee_bps} bps")));
    }

    let overflow = || DexError::InvalidAmount("amount overflows 256-bit arithmetic".to_string());

    let amount_in_with_fee = amount_in
        .checked_mul(U256::from(BPS_DENOMINATOR - fee_bps))
        .ok_or_else(overflow)?;
    let numerator = reserve_out
        .checked_mul(amount_in_with_fee)
        .ok_or_else(overflow)?;
    let denominator = reserve_in
        .checked_mul(U256::from(BPS_DENOMINATOR))
        .and_then(|r| r.checked_add(amount_in_with_fee))
        .ok_or_else(overflow)?;

    Ok(numerator / denominator)
}

/// Minimum acceptable output after `slippage_bps` of tolerance, rounded down.
pub fn amount_out_min(amount_out: U256, slippage_bps: u32) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(slippage_bps);
    let scaled = amount_out.full_mul(U256::from(keep)) / U512::from(BPS_DENOMINATOR);
    U256::try_from(scaled).unwrap_or(amount_out)
}

/// Quotes selling `amount_in` of `from` into the pool described by `snapshot`.
pub fn quote(
    snapshot: &PoolReserveSnapshot,
    tokens: &TokenPair,
    from: Address,
    amount_in: U256,
    fee_bps: u32,
) -> DexResult<SwapQuote> {
    let token_in = tokens.descriptor(from)?;
    let token_out = tokens.counterpart(from)?;
    let (reserve_in, reserve_out) = snapshot.reserves_for(from)?;
    let pool_out = snapshot.counterpart(from)?;
    if pool_out != token_out.address {
        return Err(DexError::UnknownToken(pool_out));
    }

    let amount_out = get_amount_out(reserve_in, reserve_out, amount_in, fee_bps)?;
    if amount_out.is_zero() {
        return Err(DexError::InsufficientOutput);
    }

    let scaled_in = token_in.to_f64(amount_in);
    let scaled_out = token_out.to_f64(amount_out);
    let rate = if scaled_in > 0.0 { scaled_out / scaled_in } else { 0.0 };

    Ok(SwapQuote {
        token_in: token_in.address,
        token_out: token_out.address,
        amount_in,
        amount_out,
        rate,
        price_impact_bps: price_impact_bps(reserve_in, reserve_out, amount_in, amount_out),
    })
}

/// Shortfall of the execution price `out / in` against spot `reserve_out / reserve_in`.
pub fn price_impact_bps(
    reserve_in: U256,
    reserve_out: U256,
    amount_in: U256,
    amount_out: U256,
) -> f64 {
    let spot = u256_to_f64(reserve_out) / u256_to_f64(reserve_in);
    let execution = u256_to_f64(amount_out) / u256_to_f64(amount_in);
    if !spot.is_finite() || spot == 0.0 || !execution.is_finite() {
        return 0.0;
    }
    ((1.0 - execution / spot) * f64::from(BPS_DENOMINATOR)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenDescriptor;

    fn u(v: u128) -> U256 {
        U256::from(v)
    }

    fn tokens() -> TokenPair {
        TokenPair::new(
            TokenDescriptor::new(Address::repeat_byte(0x11), "MOCK", 18),
            TokenDescriptor::new(Address::repeat_byte(0x22), "USDC", 6),
        )
        .unwrap()
    }

    #[test]
    fn worked_example_truncates() {
        // 19_940_000_000_000 / 10_009_970_000 = 1992.01..., truncated
        let out = get_amount_out(u(1_000_000), u(2_000_000), u(1_000), 30).unwrap();
        assert_eq!(out, u(1_992));
    }

    #[test]
    fn zero_reserve_is_no_liquidity() {
        assert!(matches!(
            get_amount_out(U256::zero(), u(1_000), u(10), 30),
            Err(DexError::NoLiquidity)
        ));
        assert!(matches!(
            get_amount_out(u(1_000), U256::zero(), u(10), 30),
            Err(DexError::NoLiquidity)
        ));
    }

    #[test]
    fn zero_input_is_rejected() {
        assert!(matches!(
            get_amount_out(u(1_000), u(1_000), U256::zero(), 30),
            Err(DexError::InvalidAmount(_))
        ));
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        assert!(matches!(
            get_amount_out(U256::MAX, U256::MAX, U256::MAX, 30),
            Err(DexError::InvalidAmount(_))
        ));
    }

    #[test]
    fn output_stays_below_reserve_out() {
        let reserve_out = u(5_000_000);
        for amount_in in [1_000u128, 1_000_000, 1_000_000_000, 1_000_000_000_000_000] {
            let out = get_amount_out(u(1_000_000), reserve_out, u(amount_in), 30).unwrap();
            assert!(out > U256::zero());
            assert!(out < reserve_out);
        }
    }

    #[test]
    fn monotonic_in_amount_in() {
        let mut previous = U256::zero();
        for amount_in in (1..200u128).map(|i| i * 7_919) {
            let out = get_amount_out(u(3_000_000), u(7_000_000), u(amount_in), 30).unwrap();
            assert!(out >= previous);
            previous = out;
        }
    }

    #[test]
    fn round_trip_never_grows() {
        let (r_a, r_b) = (u(40_000_000_000), u(90_000_000_000));
        for amount_in in [1_000u128, 123_456, 50_000_000, 9_000_000_000] {
            let out = get_amount_out(r_a, r_b, u(amount_in), 30).unwrap();
            let back = get_amount_out(r_b, r_a, out, 30).unwrap();
            assert!(back <= u(amount_in));

            // against the pool as it stands after the first leg
            let back_after = get_amount_out(r_b - out, r_a + u(amount_in), out, 30).unwrap();
            assert!(back_after <= u(amount_in));
        }
    }

    #[test]
    fn zero_fee_matches_plain_constant_product() {
        let out = get_amount_out(u(1_000), u(1_000), u(1_000), 0).unwrap();
        assert_eq!(out, u(500));
    }

    #[test]
    fn slippage_bound_is_floored() {
        assert_eq!(amount_out_min(u(1_992), 200), u(1_952));
        assert_eq!(amount_out_min(u(100), 0), u(100));
        assert_eq!(amount_out_min(u(99), 200), u(97));
    }

    #[test]
    fn slippage_bound_handles_huge_amounts() {
        let min = amount_out_min(U256::MAX, 200);
        assert!(min < U256::MAX);
    }

    fn snapshot(token0: Address, token1: Address) -> PoolReserveSnapshot {
        PoolReserveSnapshot {
            reserve_a: u(1_000_000),
            reserve_b: u(2_000_000),
            token_a: token0,
            token_b: token1,
            block: None,
        }
    }

    #[test]
    fn direction_follows_token0() {
        let tokens = tokens();
        let snap = snapshot(tokens.a.address, tokens.b.address);

        let a_to_b = quote(&snap, &tokens, tokens.a.address, u(1_000), 30).unwrap();
        assert_eq!(a_to_b.amount_out, u(1_992));
        assert_eq!(a_to_b.token_out, tokens.b.address);

        let b_to_a = quote(&snap, &tokens, tokens.b.address, u(1_000), 30).unwrap();
        assert_eq!(b_to_a.amount_out, get_amount_out(u(2_000_000), u(1_000_000), u(1_000), 30).unwrap());
        assert_eq!(b_to_a.token_out, tokens.a.address);
    }

    #[test]
    fn direction_when_pair_orders_tokens_the_other_way() {
        let tokens = tokens();
        // token0 is USDC here, so MOCK is the reserve_b side
        let snap = snapshot(tokens.b.address, tokens.a.address);
        let q = quote(&snap, &tokens, tokens.a.address, u(1_000), 30).unwrap();
        assert_eq!(q.amount_out, get_amount_out(u(2_000_000), u(1_000_000), u(1_000), 30).unwrap());
    }

    #[test]
    fn unknown_from_token() {
        let tokens = tokens();
        let snap = snapshot(tokens.a.address, tokens.b.address);
        let stranger = Address::repeat_byte(0x99);
        assert!(matches!(
            quote(&snap, &tokens, stranger, u(1_000), 30),
            Err(DexError::UnknownToken(a)) if a == stranger
        ));
    }

    #[test]
    fn dust_input_is_not_a_zero_quote() {
        let tokens = tokens();
        let snap = PoolReserveSnapshot {
            reserve_a: u(1_000_000_000_000),
            reserve_b: u(1_000),
            ..snapshot(tokens.a.address, tokens.b.address)
        };
        assert!(matches!(
            quote(&snap, &tokens, tokens.a.address, u(1), 30),
            Err(DexError::InsufficientOutput)
        ));
    }

    #[test]
    fn rate_uses_display_decimals() {
        let tokens = tokens();
        let snap = PoolReserveSnapshot {
            // 1_000 MOCK : 2_000 USDC
            reserve_a: U256::exp10(21),
            reserve_b: u(2_000_000_000),
            token_a: tokens.a.address,
            token_b: tokens.b.address,
            block: Some(1),
        };
        let q = quote(&snap, &tokens, tokens.a.address, U256::exp10(18), 30).unwrap();
        assert!(q.rate > 1.98 && q.rate < 2.0, "rate {}", q.rate);
        assert!(q.price_impact_bps > 30.0 && q.price_impact_bps < 50.0);
    }
}
