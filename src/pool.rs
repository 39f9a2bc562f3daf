use std::sync::Arc;

use ethers_core::types::{Address, U256, U512};
use ethers_providers::Middleware;
use tracing::{debug, info};

use crate::{
    abi::{IErc20, IUniswapV2Factory, IUniswapV2Pair},
    error::{DexError, DexResult},
    tokens::TokenPair,
    types::{Balances, PoolInfo, PoolReserveSnapshot},
    utils::u256_to_f64,
};

/// Read-only view over one pair and its two configured tokens.
#[derive(Debug, Clone)]
pub struct PoolClient<M> {
    client: Arc<M>,
    pair: Address,
    tokens: TokenPair,
}

impl<M: Middleware + 'static> PoolClient<M> {
    pub fn new(client: Arc<M>, pair: Address, tokens: TokenPair) -> Self {
        Self {
            client,
            pair,
            tokens,
        }
    }

    /// Builds a client for the pair the factory registered for the two tokens.
    pub async fn from_factory(client: Arc<M>, factory: Address, tokens: TokenPair) -> DexResult<Self> {
        let factory_contract = IUniswapV2Factory::new(factory, client.clone());
        let pair = factory_contract
            .get_pair(tokens.a.address, tokens.b.address)
            .call()
            .await
            .map_err(DexError::provider)?;
        if pair.is_zero() {
            return Err(DexError::NoLiquidity);
        }
        info!("factory {:?} resolved pair {:?}", factory, pair);
        Ok(Self::new(client, pair, tokens))
    }

    pub fn pair(&self) -> Address {
        self.pair
    }

    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    pub async fn snapshot(&self) -> DexResult<PoolReserveSnapshot> {
        let v2_pair_contract = IUniswapV2Pair::new(self.pair, self.client.clone());
        let reserves_call = v2_pair_contract.get_reserves();
        let token0_call = v2_pair_contract.token_0();
        let token1_call = v2_pair_contract.token_1();

        let ((reserve_a, reserve_b, _), token_a, token_b, block) = tokio::try_join!(
            async { reserves_call.call().await.map_err(DexError::provider) },
            async { token0_call.call().await.map_err(DexError::provider) },
            async { token1_call.call().await.map_err(DexError::provider) },
            async { self.client.get_block_number().await.map_err(DexError::provider) },
        )?;

        // The pair must trade exactly the configured tokens, in either order.
        self.tokens.descriptor(token_a)?;
        self.tokens.descriptor(token_b)?;

        debug!(
            "pair {:?} reserves {} / {} at block {}",
            self.pair, reserve_a, reserve_b, block
        );

        Ok(PoolReserveSnapshot {
            reserve_a: U256::from(reserve_a),
            reserve_b: U256::from(reserve_b),
            token_a,
            token_b,
            block: Some(block.as_u64()),
        })
    }

    pub async fn pool_info(&self, owner: Address) -> DexResult<PoolInfo> {
        let snapshot = self.snapshot().await?;
        let lp_token = IErc20::new(self.pair, self.client.clone());
        let total_supply_call = lp_token.total_supply();
        let balance_call = lp_token.balance_of(owner);

        let (total_supply, lp_balance) = tokio::try_join!(
            async { total_supply_call.call().await.map_err(DexError::provider) },
            async { balance_call.call().await.map_err(DexError::provider) },
        )?;

        let (redeemable_a, redeemable_b) = if total_supply.is_zero() || !snapshot.has_liquidity() {
            (U256::zero(), U256::zero())
        } else {
            redeemable_amounts(&snapshot, lp_balance, total_supply)?
        };

        Ok(PoolInfo {
            pair: self.pair,
            share_of_pool: share_of_pool(lp_balance, total_supply),
            snapshot,
            total_supply,
            lp_balance,
            redeemable_a,
            redeemable_b,
        })
    }

    /// Native balance plus both configured token balances.
    pub async fn balances(&self, owner: Address) -> DexResult<Balances> {
        let token_a = IErc20::new(self.tokens.a.address, self.client.clone());
        let token_b = IErc20::new(self.tokens.b.address, self.client.clone());
        let token_a_call = token_a.balance_of(owner);
        let token_b_call = token_b.balance_of(owner);

        let (eth, token_a, token_b) = tokio::try_join!(
            async { self.client.get_balance(owner, None).await.map_err(DexError::provider) },
            async { token_a_call.call().await.map_err(DexError::provider) },
            async { token_b_call.call().await.map_err(DexError::provider) },
        )?;

        Ok(Balances {
            owner,
            eth,
            token_a,
            token_b,
        })
    }

    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> DexResult<U256> {
        IErc20::new(token, self.client.clone())
            .allowance(owner, spender)
            .call()
            .await
            .map_err(DexError::provider)
    }

    pub async fn needs_approval(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> DexResult<bool> {
        Ok(self.allowance(token, owner, spender).await? < amount)
    }
}

/// Token amounts `liquidity` LP tokens redeem for, `reserve * liquidity / total_supply`.
pub fn redeemable_amounts(
    snapshot: &PoolReserveSnapshot,
    liquidity: U256,
    total_supply: U256,
) -> DexResult<(U256, U256)> {
    if total_supply.is_zero() || !snapshot.has_liquidity() {
        return Err(DexError::NoLiquidity);
    }
    if liquidity > total_supply {
        return Err(DexError::InvalidAmount(format!(
            "liquidity {liquidity} exceeds total supply {total_supply}"
        )));
    }
    let share = |reserve: U256| {
        U256::try_from(reserve.full_mul(liquidity) / U512::from(total_supply))
            .map_err(|_| DexError::InvalidAmount("redeemable amount overflows".to_string()))
    };
    Ok((share(snapshot.reserve_a)?, share(snapshot.reserve_b)?))
}

pub fn share_of_pool(lp_balance: U256, total_supply: U256) -> f64 {
    if total_supply.is_zero() {
        return 0.0;
    }
    (u256_to_f64(lp_balance) / u256_to_f64(total_supply)).clamp(0.0, 1.0)
}
