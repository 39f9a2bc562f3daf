use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ethers::middleware::SignerMiddleware;
use ethers_core::types::{Address, U256};
use ethers_providers::{Http, Middleware, Provider};
use serde::Serialize;
use tracing::{info, Level};
use uniswap_pair_client::{
    config::DexConfig,
    history::reconstruct_history,
    pool::PoolClient,
    quote::{amount_out_min, quote},
    router::{RouterClient, Settlement},
    tokens::{format_lp, parse_amount, TokenPair, LP_DECIMALS},
    types::{SwapQuote, TransactionKind, TransactionRecord},
    wallet::{load_wallet, WalletContext},
};

#[derive(Parser, Debug)]
#[clap(version)]
struct Args {
    #[clap(long, env)]
    rpc_url: String,

    /// Signing key for swaps and liquidity changes.
    #[clap(long, env, hide_env_values = true)]
    private_key: Option<String>,

    /// JSON file overriding the built-in addresses and limits.
    #[clap(long, env = "DEX_CONFIG")]
    config: Option<PathBuf>,

    #[clap(long)]
    slippage_bps: Option<u32>,

    #[clap(long)]
    window_blocks: Option<u64>,

    #[clap(long)]
    json: bool,

    #[clap(long, short)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// ETH and token balances
    Balances {
        #[clap(long)]
        wallet: Option<String>,
    },
    /// Reserves, LP supply and the wallet's pool share
    Pool {
        #[clap(long)]
        wallet: Option<String>,
    },
    /// Preview a swap without sending it
    Quote {
        #[clap(long)]
        from: String,
        #[clap(long)]
        amount: String,
    },
    Swap {
        #[clap(long)]
        from: String,
        #[clap(long)]
        amount: String,
    },
    AddLiquidity {
        #[clap(long)]
        amount_a: String,
        #[clap(long)]
        amount_b: String,
    },
    RemoveLiquidity {
        /// LP tokens to burn, in LP units (18 decimals)
        #[clap(long)]
        liquidity: String,
    },
    /// The wallet's swaps and liquidity changes in the recent block window
    History {
        #[clap(long)]
        wallet: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = load_config(&args)?;
    let tokens = config.tokens()?;

    let provider = Provider::<Http>::try_from(args.rpc_url.as_str())?;
    let provider = Arc::new(provider);

    let pool = if config.pair.is_zero() {
        PoolClient::from_factory(provider.clone(), config.factory, tokens.clone()).await?
    } else {
        PoolClient::new(provider.clone(), config.pair, tokens.clone())
    };

    match args.command {
        Command::Balances { wallet } => {
            let owner = resolve_owner(wallet, args.private_key.as_deref())?;
            let balances = pool.balances(owner).await?;
            if args.json {
                print_json(&balances)?;
            } else {
                println!("{} {:?}", "Wallet".bold(), balances.owner);
                println!("  ETH   {}", ethers_core::utils::format_ether(balances.eth));
                println!("  {:<5} {}", tokens.a.symbol, tokens.a.format(balances.token_a));
                println!("  {:<5} {}", tokens.b.symbol, tokens.b.format(balances.token_b));
            }
        }
        Command::Pool { wallet } => {
            let owner = resolve_owner(wallet, args.private_key.as_deref())?;
            let info = pool.pool_info(owner).await?;
            if args.json {
                print_json(&info)?;
            } else {
                let token0 = tokens.descriptor(info.snapshot.token_a)?;
                let token1 = tokens.descriptor(info.snapshot.token_b)?;
                println!("{} {:?}", "Pair".bold(), info.pair);
                println!("  {} reserve  {}", token0.symbol, token0.format(info.snapshot.reserve_a));
                println!("  {} reserve  {}", token1.symbol, token1.format(info.snapshot.reserve_b));
                println!("  LP supply     {}", format_lp(info.total_supply));
                println!("  Your LP       {}", format_lp(info.lp_balance));
                println!("  Pool share    {:.4}%", info.share_of_pool * 100.0);
                println!(
                    "  Redeemable    {} {} + {} {}",
                    token0.format(info.redeemable_a),
                    token0.symbol,
                    token1.format(info.redeemable_b),
                    token1.symbol
                );
            }
        }
        Command::Quote { from, amount } => {
            let swap_quote = preview(&pool, &tokens, &config, &from, &amount).await?;
            report_quote(&tokens, &config, &swap_quote, args.json)?;
        }
        Command::Swap { from, amount } => {
            let router = connect_router(provider.clone(), args.private_key.as_deref(), &config).await?;
            // A failed quote aborts here; nothing is submitted with a zero bound.
            let swap_quote = preview(&pool, &tokens, &config, &from, &amount).await?;
            report_quote(&tokens, &config, &swap_quote, args.json)?;
            let settlement = router.swap(&swap_quote).await?;
            report_settlement("Swap", &settlement, args.json)?;
        }
        Command::AddLiquidity { amount_a, amount_b } => {
            let router = connect_router(provider.clone(), args.private_key.as_deref(), &config).await?;
            let raw_a = tokens.a.parse(&amount_a)?;
            let raw_b = tokens.b.parse(&amount_b)?;
            let settlement = router
                .add_liquidity(tokens.a.address, tokens.b.address, raw_a, raw_b)
                .await?;
            report_settlement("Add liquidity", &settlement, args.json)?;
        }
        Command::RemoveLiquidity { liquidity } => {
            let router = connect_router(provider.clone(), args.private_key.as_deref(), &config).await?;
            let info = pool.pool_info(router.owner()).await?;
            let raw_liquidity = parse_amount(&liquidity, LP_DECIMALS)?;
            if raw_liquidity > info.lp_balance {
                bail!(
                    "cannot remove {} LP, wallet holds {}",
                    liquidity,
                    format_lp(info.lp_balance)
                );
            }
            let settlement = router
                .remove_liquidity(pool.pair(), &info.snapshot, raw_liquidity, info.total_supply)
                .await?;
            report_settlement("Remove liquidity", &settlement, args.json)?;
        }
        Command::History { wallet } => {
            let owner = resolve_owner(wallet, args.private_key.as_deref())?;
            let records = reconstruct_history(provider.clone(), owner, pool.pair(), &config).await?;
            if args.json {
                print_json(&records)?;
            } else {
                print_history(&records);
            }
        }
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<DexConfig> {
    let mut config = match &args.config {
        Some(path) => DexConfig::from_file(path)?,
        None => DexConfig::default(),
    };
    if let Some(slippage_bps) = args.slippage_bps {
        config.slippage_bps = slippage_bps;
    }
    if let Some(window) = args.window_blocks {
        config.history_window_blocks = window;
    }
    config.validate()?;
    Ok(config)
}

fn resolve_owner(wallet: Option<String>, private_key: Option<&str>) -> Result<Address> {
    use ethers::signers::Signer;

    match (wallet, private_key) {
        (Some(wallet), _) => wallet
            .parse::<Address>()
            .with_context(|| format!("invalid wallet address {wallet}")),
        (None, Some(key)) => Ok(load_wallet(key)?.address()),
        (None, None) => bail!("pass --wallet or set PRIVATE_KEY"),
    }
}

async fn connect_router(
    provider: Arc<Provider<Http>>,
    private_key: Option<&str>,
    config: &DexConfig,
) -> Result<RouterClient<SignerMiddleware<Provider<Http>, ethers::signers::LocalWallet>>> {
    let key = private_key.context("PRIVATE_KEY is required to send transactions")?;
    let context = WalletContext::new();
    let wallet = context.connect_local(provider.as_ref(), load_wallet(key)?).await?;
    let owner = context.address()?;
    info!("signing as {:?} on chain {}", owner, context.chain_id()?);

    let client = SignerMiddleware::new((*provider).clone(), wallet);
    Ok(RouterClient::new(Arc::new(client), owner, config))
}

async fn preview<M: Middleware + 'static>(
    pool: &PoolClient<M>,
    tokens: &TokenPair,
    config: &DexConfig,
    from: &str,
    amount: &str,
) -> Result<SwapQuote> {
    let from_token = tokens.by_symbol(from)?;
    let amount_in = from_token.parse(amount)?;
    let snapshot = pool.snapshot().await?;
    Ok(quote(&snapshot, tokens, from_token.address, amount_in, config.fee_bps)?)
}

#[derive(Serialize)]
struct QuoteReport<'a> {
    quote: &'a SwapQuote,
    amount_out_min: U256,
}

fn report_quote(tokens: &TokenPair, config: &DexConfig, swap_quote: &SwapQuote, json: bool) -> Result<()> {
    let min_out = amount_out_min(swap_quote.amount_out, config.slippage_bps);
    if json {
        return print_json(&QuoteReport {
            quote: swap_quote,
            amount_out_min: min_out,
        });
    }
    let token_in = tokens.descriptor(swap_quote.token_in)?;
    let token_out = tokens.descriptor(swap_quote.token_out)?;
    println!(
        "{} {} {} -> {} {}",
        "Quote".bold(),
        token_in.format(swap_quote.amount_in),
        token_in.symbol,
        token_out.format(swap_quote.amount_out).green(),
        token_out.symbol
    );
    println!(
        "  1 {} = {:.6} {}",
        token_in.symbol, swap_quote.rate, token_out.symbol
    );
    println!("  Price impact  {:.2}%", swap_quote.price_impact_bps / 100.0);
    println!(
        "  Minimum out   {} {} ({:.2}% slippage)",
        token_out.format(min_out),
        token_out.symbol,
        f64::from(config.slippage_bps) / 100.0
    );
    Ok(())
}

#[derive(Serialize)]
struct SettlementReport<'a> {
    action: &'a str,
    tx_hash: String,
    block_number: Option<u64>,
}

fn report_settlement(action: &str, settlement: &Settlement, json: bool) -> Result<()> {
    if json {
        return print_json(&SettlementReport {
            action,
            tx_hash: format!("{:?}", settlement.tx_hash),
            block_number: settlement.block_number,
        });
    }
    println!(
        "{} {} in block {} ({:?})",
        action.bold(),
        "settled".green(),
        settlement
            .block_number
            .map(|b| b.to_string())
            .unwrap_or_else(|| "?".to_string()),
        settlement.tx_hash
    );
    Ok(())
}

fn print_history(records: &[TransactionRecord]) {
    if records.is_empty() {
        println!("No transactions found for this wallet address.");
        return;
    }
    for record in records {
        let a = &record.amounts;
        let title = match record.kind {
            TransactionKind::Swap => record.kind.to_string().cyan(),
            TransactionKind::AddLiquidity => record.kind.to_string().green(),
            TransactionKind::RemoveLiquidity => record.kind.to_string().yellow(),
        };
        println!("{} at {} ({:?})", title.bold(), record.timestamp, record.tx_hash);
        match record.kind {
            TransactionKind::Swap => {
                // The sold side is listed first.
                let (sold, bought) = if a.sold_symbol.as_deref() == Some(a.token_b_symbol.as_str()) {
                    ((&a.amount_b, &a.token_b_symbol), (&a.amount_a, &a.token_a_symbol))
                } else {
                    ((&a.amount_a, &a.token_a_symbol), (&a.amount_b, &a.token_b_symbol))
                };
                println!("  Swapped  {} {}", sold.0, sold.1);
                println!("  For      {} {}", bought.0, bought.1);
            }
            TransactionKind::AddLiquidity => {
                println!("  Added    {} {}", a.amount_a, a.token_a_symbol);
                println!("  And      {} {}", a.amount_b, a.token_b_symbol);
                if let Some(lp) = &a.lp_amount {
                    println!("  LP       {}", lp);
                }
            }
            TransactionKind::RemoveLiquidity => {
                if let Some(lp) = &a.lp_amount {
                    println!("  Removed  {} LP", lp);
                }
                println!("  Received {} {}", a.amount_a, a.token_a_symbol);
                println!("  And      {} {}", a.amount_b, a.token_b_symbol);
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json_string = serde_json::to_string_pretty(value)?;
    println!("{}", json_string);
    Ok(())
}
