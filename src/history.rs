//! Reconstructs a wallet's activity feed from a pair's Swap/Mint/Burn logs.
//!
//! Fetching is split from assembly: [`reconstruct_history`] talks to the node and
//! hands raw logs plus per-transaction lookups to [`assemble_history`], which is
//! pure and decides for every log whether it becomes a [`TransactionRecord`].

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use ethers_core::{
    abi::{Event, RawLog, Token},
    types::{Address, Filter, Log, H256, U256},
};
use ethers_providers::Middleware;
use futures::{stream, StreamExt};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    abi::{IUniswapV2Pair, PairEvents},
    config::DexConfig,
    error::{DexError, DexResult},
    tokens::{format_lp, TokenPair},
    types::{RecordAmounts, TransactionKind, TransactionRecord},
    utils::{block_number_chunks, scan_window},
};

/// What a transaction/block lookup tells us about the transaction behind a log.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    pub from: Address,
    pub timestamp: u64,
    /// Receipt logs, fetched only for transactions that minted or burned LP.
    pub receipt_logs: Option<Vec<Log>>,
}

pub type LogLookups = HashMap<H256, Result<LogContext, String>>;

#[derive(Debug)]
pub enum LogOutcome {
    Accepted(TransactionRecord),
    /// The transaction was sent by someone else.
    NotOwner,
    LookupFailed(DexError),
    Undecodable(DexError),
    /// topic0 is not one of the activity events.
    Ignored,
}

/// Decodes pair logs into records, scaling amounts with the configured tokens.
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    pub events: PairEvents,
    pub tokens: TokenPair,
    pub pair: Address,
    pub token0: Address,
    pub token1: Address,
}

impl RecordDecoder {
    pub fn new(
        events: PairEvents,
        tokens: TokenPair,
        pair: Address,
        token0: Address,
        token1: Address,
    ) -> Self {
        Self {
            events,
            tokens,
            pair,
            token0,
            token1,
        }
    }

    pub fn kind_of(&self, log: &Log) -> Option<TransactionKind> {
        let topic0 = *log.topics.first()?;
        if topic0 == self.events.swap.signature() {
            Some(TransactionKind::Swap)
        } else if topic0 == self.events.mint.signature() {
            Some(TransactionKind::AddLiquidity)
        } else if topic0 == self.events.burn.signature() {
            Some(TransactionKind::RemoveLiquidity)
        } else {
            None
        }
    }

    pub fn classify(&self, log: &Log, wallet: Address, lookups: &LogLookups) -> LogOutcome {
        let Some(kind) = self.kind_of(log) else {
            return LogOutcome::Ignored;
        };
        let Some(tx_hash) = log.transaction_hash else {
            return LogOutcome::Undecodable(DexError::Abi("log without transaction hash".into()));
        };

        let context = match lookups.get(&tx_hash) {
            Some(Ok(context)) => context,
            Some(Err(reason)) => {
                return LogOutcome::LookupFailed(DexError::LookupFailed {
                    tx_hash,
                    reason: reason.clone(),
                })
            }
            None => {
                return LogOutcome::LookupFailed(DexError::LookupFailed {
                    tx_hash,
                    reason: "no lookup issued".to_string(),
                })
            }
        };

        if context.from != wallet {
            return LogOutcome::NotOwner;
        }

        match self.decode(log, kind, context) {
            Ok(record) => LogOutcome::Accepted(record),
            Err(err) => LogOutcome::Undecodable(err),
        }
    }

    pub fn decode(
        &self,
        log: &Log,
        kind: TransactionKind,
        context: &LogContext,
    ) -> DexResult<TransactionRecord> {
        let token_a = self.tokens.descriptor(self.token0)?;
        let token_b = self.tokens.descriptor(self.token1)?;
        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| DexError::Abi("log without transaction hash".into()))?;
        let log_index = log.log_index.map(|i| i.low_u64()).unwrap_or_default();
        let block_number = log.block_number.map(|b| b.as_u64()).unwrap_or_default();

        let (amount_a, amount_b, lp_amount, sold_symbol) = match kind {
            TransactionKind::Swap => {
                let values = uints(&self.events.swap, log)?;
                let [amount0_in, amount1_in, amount0_out, amount1_out] = values[..] else {
                    return Err(DexError::Abi("swap log carries unexpected fields".into()));
                };
                // Only one leg per side is non-zero.
                let amount_a = if amount0_in.is_zero() { amount0_out } else { amount0_in };
                let amount_b = if amount1_in.is_zero() { amount1_out } else { amount1_in };
                let sold = if !amount0_in.is_zero() {
                    Some(token_a.symbol.clone())
                } else if !amount1_in.is_zero() {
                    Some(token_b.symbol.clone())
                } else {
                    None
                };
                (amount_a, amount_b, None, sold)
            }
            TransactionKind::AddLiquidity => {
                let values = uints(&self.events.mint, log)?;
                let [amount0, amount1] = values[..] else {
                    return Err(DexError::Abi("mint log carries unexpected fields".into()));
                };
                let minted =
                    self.lp_transferred(context, log, |from, to| from.is_zero() && !to.is_zero());
                (amount0, amount1, minted, None)
            }
            TransactionKind::RemoveLiquidity => {
                let values = uints(&self.events.burn, log)?;
                let [amount0, amount1] = values[..] else {
                    return Err(DexError::Abi("burn log carries unexpected fields".into()));
                };
                let pair = self.pair;
                let burned =
                    self.lp_transferred(context, log, |from, to| from == pair && to.is_zero());
                (amount0, amount1, burned, None)
            }
        };

        Ok(TransactionRecord {
            id: format!("{:?}-{}", tx_hash, log_index),
            kind,
            timestamp: context.timestamp,
            tx_hash,
            block_number,
            log_index,
            amounts: RecordAmounts {
                token_a_symbol: token_a.symbol.clone(),
                token_b_symbol: token_b.symbol.clone(),
                amount_a: token_a.format(amount_a),
                amount_b: token_b.format(amount_b),
                lp_amount: lp_amount.map(format_lp),
                sold_symbol,
            },
        })
    }

    /// LP moved by the pair `Transfer` matching `side` that sits closest before `event`
    /// in the same receipt. Earlier transfers belong to the protocol fee or to other
    /// mints and burns in the transaction.
    fn lp_transferred(
        &self,
        context: &LogContext,
        event: &Log,
        side: impl Fn(Address, Address) -> bool,
    ) -> Option<U256> {
        let logs = context.receipt_logs.as_ref()?;
        let event_index = event.log_index?;
        let transfer_topic = self.events.transfer.signature();

        let mut closest: Option<(U256, U256)> = None;
        for log in logs
            .iter()
            .filter(|l| l.address == self.pair && l.topics.first() == Some(&transfer_topic))
        {
            let Some(index) = log.log_index.filter(|i| *i < event_index) else {
                continue;
            };
            let Some((from, to, value)) = self.transfer_parts(log) else {
                continue;
            };
            if side(from, to) && closest.map_or(true, |(best, _)| index > best) {
                closest = Some((index, value));
            }
        }
        closest.map(|(_, value)| value)
    }

    fn transfer_parts(&self, log: &Log) -> Option<(Address, Address, U256)> {
        let parsed = self.events.transfer.parse_log(raw(log)).ok()?;
        let mut from = None;
        let mut to = None;
        let mut value = None;
        for param in parsed.params {
            match (param.name.as_str(), param.value) {
                ("from", Token::Address(a)) => from = Some(a),
                ("to", Token::Address(a)) => to = Some(a),
                ("value", Token::Uint(v)) => value = Some(v),
                _ => {}
            }
        }
        Some((from?, to?, value?))
    }
}

fn raw(log: &Log) -> RawLog {
    RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    }
}

/// Decodes `log` against `event` and returns its non-indexed uint fields in order.
fn uints(event: &Event, log: &Log) -> DexResult<Vec<U256>> {
    let parsed = event
        .parse_log(raw(log))
        .map_err(|e| DexError::Abi(format!("{}: {e}", event.name)))?;
    Ok(parsed
        .params
        .into_iter()
        .filter_map(|p| p.value.into_uint())
        .collect())
}

/// Filters `logs` to `wallet`'s own activity and orders it most recent first.
///
/// Logs whose lookup failed, that belong to another sender, or that fail to
/// decode are dropped individually; none of them fails the whole feed.
pub fn assemble_history(
    wallet: Address,
    decoder: &RecordDecoder,
    logs: &[Log],
    lookups: &LogLookups,
) -> Vec<TransactionRecord> {
    let outcomes: Vec<LogOutcome> = logs
        .par_iter()
        .map(|log| decoder.classify(log, wallet, lookups))
        .collect();

    let mut records = Vec::new();
    let mut not_owner = 0usize;
    for outcome in outcomes {
        match outcome {
            LogOutcome::Accepted(record) => records.push(record),
            LogOutcome::NotOwner => not_owner += 1,
            LogOutcome::LookupFailed(err) => warn!("excluding log: {}", err),
            LogOutcome::Undecodable(err) => warn!("excluding undecodable log: {}", err),
            LogOutcome::Ignored => {}
        }
    }
    debug!("{} logs belonged to other senders", not_owner);

    sort_most_recent_first(&mut records);
    records
}

/// Timestamp descending; ties fall back to chain position, latest first.
pub fn sort_most_recent_first(records: &mut [TransactionRecord]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then(b.block_number.cmp(&a.block_number))
            .then(b.log_index.cmp(&a.log_index))
    });
}

pub async fn get_logs<M: Middleware + 'static>(
    client: Arc<M>,
    pair: Address,
    from_block: u64,
    to_block: u64,
    signature: H256,
) -> DexResult<Vec<Log>> {
    let event_filter = Filter::new()
        .address(pair)
        .from_block(from_block)
        .to_block(to_block)
        .topic0(signature);
    let response = client
        .get_logs(&event_filter)
        .await
        .map_err(DexError::provider)?;

    Ok(response)
}

/// Looks up sender and block timestamp (and the receipt when asked) for one transaction.
pub async fn get_log_context<M: Middleware + 'static>(
    client: Arc<M>,
    tx_hash: H256,
    block_number: u64,
    with_receipt: bool,
) -> (H256, Result<LogContext, String>) {
    let lookup = async {
        let (tx, block) = tokio::try_join!(
            client.get_transaction(tx_hash),
            client.get_block(block_number)
        )
        .map_err(|e| e.to_string())?;
        let tx = tx.ok_or_else(|| "transaction not found".to_string())?;
        let block = block.ok_or_else(|| format!("block {block_number} not found"))?;

        let receipt_logs = if with_receipt {
            match client.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => Some(receipt.logs),
                Ok(None) => None,
                Err(e) => {
                    warn!("receipt lookup failed for {:?}: {}", tx_hash, e);
                    None
                }
            }
        } else {
            None
        };

        Ok::<_, String>(LogContext {
            from: tx.from,
            timestamp: block.timestamp.low_u64(),
            receipt_logs,
        })
    };

    (tx_hash, lookup.await)
}

/// Scans the configured window of pair logs and returns `wallet`'s activity.
pub async fn reconstruct_history<M: Middleware + 'static>(
    client: Arc<M>,
    wallet: Address,
    pair: Address,
    config: &DexConfig,
) -> DexResult<Vec<TransactionRecord>> {
    let tokens = config.tokens()?;
    let events = PairEvents::new()?;

    let pair_contract = IUniswapV2Pair::new(pair, client.clone());
    let token0_call = pair_contract.token_0();
    let token1_call = pair_contract.token_1();
    let (token0, token1) = tokio::try_join!(token0_call.call(), token1_call.call())
        .map_err(DexError::provider)?;

    let latest = client
        .get_block_number()
        .await
        .map_err(DexError::provider)?
        .as_u64();
    let (from_block, to_block) = scan_window(latest, config.history_window_blocks);
    let block_range = block_number_chunks(from_block, to_block, config.log_chunk_size);

    let mut get_log_futs = Vec::new();
    for signature in events.activity_signatures() {
        for range in block_range.iter() {
            let task = tokio::task::spawn(get_logs(
                client.clone(),
                pair,
                range.0,
                range.1,
                signature,
            ));
            get_log_futs.push(task);
        }
    }

    let log_results = futures::future::join_all(get_log_futs).await;

    let mut logs = Vec::new();
    for result in log_results {
        match result {
            Ok(Ok(chunk)) => logs.extend(chunk),
            Ok(Err(err)) => warn!("log chunk unavailable: {}", err),
            Err(err) => warn!("log task failed: {}", err),
        }
    }
    info!(
        "fetched {} pair logs in blocks {}..={}",
        logs.len(),
        from_block,
        to_block
    );

    let decoder = RecordDecoder::new(events, tokens, pair, token0, token1);

    let mut liquidity_txs = HashSet::new();
    let mut targets: HashMap<H256, u64> = HashMap::new();
    for log in logs.iter() {
        let (Some(tx_hash), Some(block_number)) = (log.transaction_hash, log.block_number) else {
            continue;
        };
        if matches!(
            decoder.kind_of(log),
            Some(TransactionKind::AddLiquidity | TransactionKind::RemoveLiquidity)
        ) {
            liquidity_txs.insert(tx_hash);
        }
        targets.entry(tx_hash).or_insert(block_number.as_u64());
    }

    debug!(
        "looking up {} transactions, {} at a time",
        targets.len(),
        config.max_concurrent_lookups
    );
    let lookups: LogLookups = stream::iter(targets)
        .map(|(tx_hash, block_number)| {
            get_log_context(
                client.clone(),
                tx_hash,
                block_number,
                liquidity_txs.contains(&tx_hash),
            )
        })
        .buffer_unordered(config.max_concurrent_lookups.max(1))
        .collect()
        .await;

    let records = assemble_history(wallet, &decoder, &logs, &lookups);
    info!("{} records for {:?}", records.len(), wallet);

    Ok(records)
}
