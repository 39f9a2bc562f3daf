use std::sync::Arc;

use ethers_contract::{builders::ContractCall, ContractError};
use ethers_core::{
    abi::Detokenize,
    types::{Address, TransactionReceipt, H256, U256, U64},
};
use ethers_providers::Middleware;
use tracing::{info, warn};

use crate::{
    abi::{IErc20, IUniswapV2Router02},
    config::DexConfig,
    error::{DexError, DexResult},
    pool::redeemable_amounts,
    quote::amount_out_min,
    types::{PoolReserveSnapshot, SwapQuote},
    utils::{deadline_from, unix_now},
};

/// Minimum amounts submitted with a liquidity deposit or withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityBounds {
    pub amount_a_min: U256,
    pub amount_b_min: U256,
}

/// Deposit bounds: each desired amount less the slippage tolerance.
pub fn add_liquidity_bounds(amount_a: U256, amount_b: U256, slippage_bps: u32) -> LiquidityBounds {
    LiquidityBounds {
        amount_a_min: amount_out_min(amount_a, slippage_bps),
        amount_b_min: amount_out_min(amount_b, slippage_bps),
    }
}

/// Withdrawal bounds: the proportional share of each reserve less the slippage tolerance.
/// Returned in the snapshot's token0/token1 order.
pub fn remove_liquidity_bounds(
    snapshot: &PoolReserveSnapshot,
    liquidity: U256,
    total_supply: U256,
    slippage_bps: u32,
) -> DexResult<LiquidityBounds> {
    let (share_a, share_b) = redeemable_amounts(snapshot, liquidity, total_supply)?;
    Ok(LiquidityBounds {
        amount_a_min: amount_out_min(share_a, slippage_bps),
        amount_b_min: amount_out_min(share_b, slippage_bps),
    })
}

/// Settled outcome of a mutating call.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

/// Submits router and token calls for one signing account.
///
/// Every call waits for inclusion before returning, so an approval has settled
/// by the time the dependent swap or deposit is sent.
#[derive(Debug, Clone)]
pub struct RouterClient<M> {
    client: Arc<M>,
    owner: Address,
    router: Address,
    slippage_bps: u32,
    deadline_secs: u64,
}

impl<M: Middleware + 'static> RouterClient<M> {
    pub fn new(client: Arc<M>, owner: Address, config: &DexConfig) -> Self {
        Self {
            client,
            owner,
            router: config.router,
            slippage_bps: config.slippage_bps,
            deadline_secs: config.deadline_secs,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    fn deadline(&self) -> U256 {
        deadline_from(unix_now(), self.deadline_secs)
    }

    pub async fn approve(&self, token: Address, amount: U256) -> DexResult<Settlement> {
        let token_contract = IErc20::new(token, self.client.clone());
        let call = token_contract.approve(self.router, amount);
        info!("approving {} of {:?} for router {:?}", amount, token, self.router);
        send_and_settle("approve", call).await
    }

    /// Approves `amount` only when the current allowance falls short of it.
    pub async fn ensure_allowance(&self, token: Address, amount: U256) -> DexResult<Option<Settlement>> {
        let allowance = IErc20::new(token, self.client.clone())
            .allowance(self.owner, self.router)
            .call()
            .await
            .map_err(DexError::provider)?;
        if allowance >= amount {
            return Ok(None);
        }
        self.approve(token, amount).await.map(Some)
    }

    /// Sells exactly `quote.amount_in`, accepting no less than the slippage-bounded output.
    pub async fn swap(&self, quote: &SwapQuote) -> DexResult<Settlement> {
        if quote.amount_out.is_zero() {
            return Err(DexError::InsufficientOutput);
        }
        let min_out = amount_out_min(quote.amount_out, self.slippage_bps);
        self.ensure_allowance(quote.token_in, quote.amount_in).await?;

        let router = IUniswapV2Router02::new(self.router, self.client.clone());
        let call = router.swap_exact_tokens_for_tokens(
            quote.amount_in,
            min_out,
            vec![quote.token_in, quote.token_out],
            self.owner,
            self.deadline(),
        );
        info!(
            "swapping {} of {:?} for at least {} of {:?}",
            quote.amount_in, quote.token_in, min_out, quote.token_out
        );
        send_and_settle("swapExactTokensForTokens", call).await
    }

    pub async fn add_liquidity(
        &self,
        token_a: Address,
        token_b: Address,
        amount_a: U256,
        amount_b: U256,
    ) -> DexResult<Settlement> {
        if amount_a.is_zero() || amount_b.is_zero() {
            return Err(DexError::InvalidAmount("both deposit amounts must be positive".into()));
        }
        let bounds = add_liquidity_bounds(amount_a, amount_b, self.slippage_bps);
        self.ensure_allowance(token_a, amount_a).await?;
        self.ensure_allowance(token_b, amount_b).await?;

        let router = IUniswapV2Router02::new(self.router, self.client.clone());
        let call = router.add_liquidity(
            token_a,
            token_b,
            amount_a,
            amount_b,
            bounds.amount_a_min,
            bounds.amount_b_min,
            self.owner,
            self.deadline(),
        );
        send_and_settle("addLiquidity", call).await
    }

    /// Burns `liquidity` LP tokens of `pair`; `snapshot` and `total_supply` set the bounds.
    pub async fn remove_liquidity(
        &self,
        pair: Address,
        snapshot: &PoolReserveSnapshot,
        liquidity: U256,
        total_supply: U256,
    ) -> DexResult<Settlement> {
        if liquidity.is_zero() {
            return Err(DexError::InvalidAmount("liquidity must be positive".into()));
        }
        let bounds = remove_liquidity_bounds(snapshot, liquidity, total_supply, self.slippage_bps)?;
        self.ensure_allowance(pair, liquidity).await?;

        let router = IUniswapV2Router02::new(self.router, self.client.clone());
        let call = router.remove_liquidity(
            snapshot.token_a,
            snapshot.token_b,
            liquidity,
            bounds.amount_a_min,
            bounds.amount_b_min,
            self.owner,
            self.deadline(),
        );
        send_and_settle("removeLiquidity", call).await
    }
}

async fn send_and_settle<M: Middleware + 'static, D: Detokenize>(
    name: &'static str,
    call: ContractCall<M, D>,
) -> DexResult<Settlement> {
    let pending = call.send().await.map_err(|e| send_error(name, e))?;
    let tx_hash = *pending;
    info!("{} submitted: {:?}", name, tx_hash);

    let receipt = pending
        .await
        .map_err(DexError::provider)?
        .ok_or_else(|| DexError::reverted(name, format!("{tx_hash:?} dropped from mempool")))?;

    settle(name, receipt)
}

/// Only revert data from the node counts as a revert; transport trouble stays a provider error.
fn send_error<M: Middleware>(name: &'static str, err: ContractError<M>) -> DexError {
    match &err {
        ContractError::Revert(_) => DexError::reverted(name, err),
        ContractError::MiddlewareError { .. } | ContractError::ProviderError { .. } => {
            warn!("{} not submitted: {}", name, err);
            DexError::provider(err)
        }
        _ => DexError::Abi(format!("{name}: {err}")),
    }
}

fn settle(name: &'static str, receipt: TransactionReceipt) -> DexResult<Settlement> {
    if receipt.status != Some(U64::one()) {
        warn!("{} reverted in {:?}", name, receipt.transaction_hash);
        return Err(DexError::reverted(
            name,
            format!("{:?} reverted", receipt.transaction_hash),
        ));
    }
    info!(
        "{} settled in block {:?}",
        name, receipt.block_number
    );
    Ok(Settlement {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number.map(|b| b.as_u64()),
        gas_used: receipt.gas_used,
    })
}
