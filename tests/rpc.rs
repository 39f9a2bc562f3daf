use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use ethers_core::{
    abi::{encode, Token},
    types::{
        Address, Block, Bytes, Log, Transaction, TransactionReceipt, H256, U256, U64,
    },
    utils::id,
};
use ethers_providers::{JsonRpcClient, JsonRpcError, MockError, Provider};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use uniswap_pair_client::{
    abi::PairEvents,
    config::DexConfig,
    history::reconstruct_history,
    pool::PoolClient,
    quote::{get_amount_out, quote},
    types::{TokenDescriptor, TransactionKind},
};

const PAIR: Address = Address::repeat_byte(0xaa);
const MOCK: Address = Address::repeat_byte(0x11);
const USDC: Address = Address::repeat_byte(0x22);
const WALLET: Address = Address::repeat_byte(0x01);
const OTHER: Address = Address::repeat_byte(0x02);

const LOOKUP_METHODS: [&str; 3] = [
    "eth_getTransactionByHash",
    "eth_getBlockByNumber",
    "eth_getTransactionReceipt",
];

/// In-memory node answering by method and parameters, so concurrent requests
/// get the same answers in any order.
#[derive(Debug, Default)]
struct FakeNode {
    latest: u64,
    calls: HashMap<(Address, [u8; 4]), Bytes>,
    logs: Vec<Log>,
    failing_topics: HashSet<H256>,
    txs: HashMap<H256, Transaction>,
    failing_txs: HashSet<H256>,
    receipts: HashMap<H256, TransactionReceipt>,
    requests: Mutex<Vec<(String, Value)>>,
    in_flight: AtomicUsize,
    peak_lookups: AtomicUsize,
}

fn rpc_error(message: &str) -> MockError {
    MockError::JsonRpcError(JsonRpcError {
        code: -32000,
        message: message.to_string(),
        data: None,
    })
}

fn parse<T: DeserializeOwned>(value: &Value) -> Result<T, MockError> {
    Ok(serde_json::from_value(value.clone())?)
}

impl FakeNode {
    fn requests_for(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn reply(&self, method: &str, params: &Value) -> Result<Value, MockError> {
        match method {
            "eth_blockNumber" => Ok(json!(U64::from(self.latest))),
            "eth_chainId" => Ok(json!(U256::from(31_337u64))),
            "eth_call" => {
                let to: Address = parse(&params[0]["to"])?;
                let data: Bytes = parse(&params[0]["data"])?;
                let mut selector = [0u8; 4];
                selector.copy_from_slice(&data[..4]);
                match self.calls.get(&(to, selector)) {
                    Some(output) => Ok(json!(output)),
                    None => Err(rpc_error("execution reverted")),
                }
            }
            "eth_getLogs" => {
                let filter = &params[0];
                let topic0: H256 = parse(&filter["topics"][0])?;
                if self.failing_topics.contains(&topic0) {
                    return Err(rpc_error("query timeout exceeded"));
                }
                let from: U64 = parse(&filter["fromBlock"])?;
                let to: U64 = parse(&filter["toBlock"])?;
                let matching: Vec<&Log> = self
                    .logs
                    .iter()
                    .filter(|l| l.topics.first() == Some(&topic0))
                    .filter(|l| l.block_number.is_some_and(|b| b >= from && b <= to))
                    .collect();
                Ok(json!(matching))
            }
            "eth_getTransactionByHash" => {
                let hash: H256 = parse(&params[0])?;
                if self.failing_txs.contains(&hash) {
                    return Err(rpc_error("header not found"));
                }
                Ok(json!(self.txs.get(&hash)))
            }
            "eth_getBlockByNumber" => {
                let number: U64 = parse(&params[0])?;
                let block = Block::<H256> {
                    number: Some(number),
                    timestamp: U256::from(number.as_u64() * 10),
                    ..Default::default()
                };
                Ok(json!(block))
            }
            "eth_getTransactionReceipt" => {
                let hash: H256 = parse(&params[0])?;
                Ok(json!(self.receipts.get(&hash)))
            }
            other => Err(rpc_error(&format!("unsupported method {other}"))),
        }
    }
}

#[async_trait]
impl JsonRpcClient for FakeNode {
    type Error = MockError;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, MockError>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let params = serde_json::to_value(params)?;
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        let lookup = LOOKUP_METHODS.contains(&method);
        if lookup {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_lookups.fetch_max(now, Ordering::SeqCst);
        }
        tokio::task::yield_now().await;
        let reply = self.reply(method, &params);
        if lookup {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        Ok(serde_json::from_value(reply?)?)
    }
}

fn config() -> DexConfig {
    DexConfig {
        pair: PAIR,
        token_a: TokenDescriptor::new(MOCK, "MOCK", 18),
        token_b: TokenDescriptor::new(USDC, "USDC", 6),
        history_window_blocks: 100,
        log_chunk_size: 50,
        max_concurrent_lookups: 2,
        ..Default::default()
    }
}

fn selector(signature: &str) -> [u8; 4] {
    id(signature)
}

fn address_output(address: Address) -> Bytes {
    Bytes::from(encode(&[Token::Address(address)]))
}

/// A pair whose token0 is USDC, the second configured token.
fn usdc_first_pair(node: &mut FakeNode) {
    node.calls
        .insert((PAIR, selector("token0()")), address_output(USDC));
    node.calls
        .insert((PAIR, selector("token1()")), address_output(MOCK));
}

fn pair_log(topics: Vec<H256>, data: Vec<Token>, tx: u8, block: u64, index: u64) -> Log {
    Log {
        address: PAIR,
        topics,
        data: Bytes::from(encode(&data)),
        block_number: Some(U64::from(block)),
        transaction_hash: Some(H256::repeat_byte(tx)),
        log_index: Some(U256::from(index)),
        ..Default::default()
    }
}

fn swap_log(events: &PairEvents, tx: u8, block: u64, index: u64) -> Log {
    pair_log(
        vec![events.swap.signature(), H256::from(WALLET), H256::from(WALLET)],
        vec![
            Token::Uint(U256::from(5_000_000u64)),
            Token::Uint(U256::zero()),
            Token::Uint(U256::zero()),
            Token::Uint(U256::exp10(18)),
        ],
        tx,
        block,
        index,
    )
}

fn sent_by(node: &mut FakeNode, tx: u8, from: Address) {
    let hash = H256::repeat_byte(tx);
    node.txs.insert(
        hash,
        Transaction {
            hash,
            from,
            ..Default::default()
        },
    );
}

#[tokio::test]
async fn history_degrades_per_record_over_rpc() {
    let events = PairEvents::new().unwrap();
    let mut node = FakeNode {
        latest: 1_000,
        ..Default::default()
    };
    usdc_first_pair(&mut node);

    // tx 1: two swap logs in one transaction
    node.logs.push(swap_log(&events, 1, 910, 0));
    node.logs.push(swap_log(&events, 1, 910, 1));
    sent_by(&mut node, 1, WALLET);

    // tx 2: a mint preceded by its LP transfer
    let lp_transfer = Log {
        address: PAIR,
        topics: vec![
            events.transfer.signature(),
            H256::from(Address::zero()),
            H256::from(WALLET),
        ],
        data: Bytes::from(encode(&[Token::Uint(U256::exp10(17) * U256::from(7))])),
        log_index: Some(U256::zero()),
        ..Default::default()
    };
    let mint = pair_log(
        vec![events.mint.signature(), H256::from(WALLET)],
        vec![
            Token::Uint(U256::from(20_000_000u64)),
            Token::Uint(U256::exp10(19)),
        ],
        2,
        960,
        1,
    );
    node.logs.push(mint.clone());
    sent_by(&mut node, 2, WALLET);
    node.receipts.insert(
        H256::repeat_byte(2),
        TransactionReceipt {
            transaction_hash: H256::repeat_byte(2),
            logs: vec![lp_transfer, mint],
            status: Some(U64::one()),
            ..Default::default()
        },
    );

    // tx 3: the wallet's swap, but its lookup fails
    node.logs.push(swap_log(&events, 3, 970, 0));
    node.failing_txs.insert(H256::repeat_byte(3));

    // tx 4: someone else's swap
    node.logs.push(swap_log(&events, 4, 980, 0));
    sent_by(&mut node, 4, OTHER);

    // tx 5: the wallet's burn, in a log query that times out
    node.logs.push(pair_log(
        vec![events.burn.signature(), H256::from(WALLET), H256::from(WALLET)],
        vec![Token::Uint(U256::one()), Token::Uint(U256::one())],
        5,
        990,
        0,
    ));
    sent_by(&mut node, 5, WALLET);
    node.failing_topics.insert(events.burn.signature());

    let node = Arc::new(node);
    let client = Arc::new(Provider::new(node.clone()));
    let records = reconstruct_history(client, WALLET, PAIR, &config())
        .await
        .unwrap();

    let summary: Vec<(TransactionKind, H256, u64)> = records
        .iter()
        .map(|r| (r.kind, r.tx_hash, r.log_index))
        .collect();
    assert_eq!(
        summary,
        vec![
            (TransactionKind::AddLiquidity, H256::repeat_byte(2), 1),
            (TransactionKind::Swap, H256::repeat_byte(1), 1),
            (TransactionKind::Swap, H256::repeat_byte(1), 0),
        ]
    );
    assert_eq!(records[0].timestamp, 9_600);

    let mint = &records[0].amounts;
    assert_eq!(mint.token_a_symbol, "USDC");
    assert_eq!(mint.amount_a, "20.000000");
    assert_eq!(mint.amount_b, "10.000000000000000000");
    assert_eq!(mint.lp_amount.as_deref(), Some("0.700000000000000000"));
    assert_eq!(records[1].amounts.sold_symbol.as_deref(), Some("USDC"));

    // one lookup per transaction hash, receipts only for liquidity changes
    let tx_lookups = node.requests_for("eth_getTransactionByHash");
    assert_eq!(tx_lookups.len(), 4);
    let receipt_lookups = node.requests_for("eth_getTransactionReceipt");
    assert_eq!(receipt_lookups, vec![json!([H256::repeat_byte(2)])]);

    // three chunks for each of the three events
    assert_eq!(node.requests_for("eth_getLogs").len(), 9);

    // two lookups at a time, each with a transaction and a block request
    let peak = node.peak_lookups.load(Ordering::SeqCst);
    assert!(peak > 0 && peak <= 4, "peak {peak}");
}

#[tokio::test]
async fn history_aborts_when_pair_tokens_are_unreadable() {
    let node = FakeNode {
        latest: 1_000,
        ..Default::default()
    };
    let client = Arc::new(Provider::new(node));
    assert!(reconstruct_history(client, WALLET, PAIR, &config())
        .await
        .is_err());
}

#[tokio::test]
async fn snapshot_orders_reserves_by_token0() {
    let mut node = FakeNode {
        latest: 77,
        ..Default::default()
    };
    usdc_first_pair(&mut node);
    let usdc_reserve = U256::from(2_000_000_000u64);
    let mock_reserve = U256::exp10(21);
    node.calls.insert(
        (PAIR, selector("getReserves()")),
        Bytes::from(encode(&[
            Token::Uint(usdc_reserve),
            Token::Uint(mock_reserve),
            Token::Uint(U256::from(1_700_000_000u64)),
        ])),
    );
    node.calls.insert(
        (PAIR, selector("totalSupply()")),
        Bytes::from(encode(&[Token::Uint(U256::from(1_000u64))])),
    );
    node.calls.insert(
        (PAIR, selector("balanceOf(address)")),
        Bytes::from(encode(&[Token::Uint(U256::from(250u64))])),
    );

    let config = config();
    let tokens = config.tokens().unwrap();
    let pool = PoolClient::new(Arc::new(Provider::new(node)), PAIR, tokens.clone());

    let snapshot = pool.snapshot().await.unwrap();
    assert_eq!(snapshot.token_a, USDC);
    assert_eq!(snapshot.reserve_a, usdc_reserve);
    assert_eq!(snapshot.reserve_b, mock_reserve);
    assert_eq!(snapshot.block, Some(77));

    // selling MOCK draws against the token1 reserve
    let amount_in = U256::exp10(18);
    let swap_quote = quote(&snapshot, &tokens, MOCK, amount_in, config.fee_bps).unwrap();
    assert_eq!(
        swap_quote.amount_out,
        get_amount_out(mock_reserve, usdc_reserve, amount_in, config.fee_bps).unwrap()
    );

    let info = pool.pool_info(WALLET).await.unwrap();
    assert_eq!(info.share_of_pool, 0.25);
    assert_eq!(info.redeemable_a, usdc_reserve / 4);
    assert_eq!(info.redeemable_b, mock_reserve / 4);
}

#[tokio::test]
async fn snapshot_rejects_a_pair_of_other_tokens() {
    let mut node = FakeNode {
        latest: 1,
        ..Default::default()
    };
    let stranger = Address::repeat_byte(0x33);
    node.calls
        .insert((PAIR, selector("token0()")), address_output(stranger));
    node.calls
        .insert((PAIR, selector("token1()")), address_output(MOCK));
    node.calls.insert(
        (PAIR, selector("getReserves()")),
        Bytes::from(encode(&[
            Token::Uint(U256::one()),
            Token::Uint(U256::one()),
            Token::Uint(U256::zero()),
        ])),
    );

    let pool = PoolClient::new(
        Arc::new(Provider::new(node)),
        PAIR,
        config().tokens().unwrap(),
    );
    let err = pool.snapshot().await.unwrap_err();
    assert!(
        matches!(err, uniswap_pair_client::error::DexError::UnknownToken(a) if a == stranger),
        "{err:?}"
    );
}
