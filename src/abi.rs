use ethers::contract::abigen;
use ethers_core::{
    abi::{parse_abi, Event},
    types::H256,
};

use crate::error::{DexError, DexResult};

abigen!(
    IUniswapV2Pair,
    r#"[
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)
        function token0() external view returns (address)
        function token1() external view returns (address)
    ]"#
);

abigen!(
    IUniswapV2Factory,
    r#"[
        function getPair(address tokenA, address tokenB) external view returns (address pair)
    ]"#
);

abigen!(
    IUniswapV2Router02,
    r#"[
        function addLiquidity(address tokenA, address tokenB, uint256 amountADesired, uint256 amountBDesired, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline) external returns (uint256 amountA, uint256 amountB, uint256 liquidity)
        function removeLiquidity(address tokenA, address tokenB, uint256 liquidity, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline) external returns (uint256 amountA, uint256 amountB)
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) external returns (uint256[] amounts)
    ]"#
);

// The pair itself is an ERC20 (LP token), so this binding covers LP balances too.
abigen!(
    IErc20,
    r#"[
        function totalSupply() external view returns (uint256)
        function balanceOf(address account) external view returns (uint256)
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
    ]"#
);

pub const SWAP_EVENT: &str =
    "Swap(address indexed sender, uint256 amount0In, uint256 amount1In, uint256 amount0Out, uint256 amount1Out, address indexed to)";
pub const MINT_EVENT: &str = "Mint(address indexed sender, uint256 amount0, uint256 amount1)";
pub const BURN_EVENT: &str =
    "Burn(address indexed sender, uint256 amount0, uint256 amount1, address indexed to)";
pub const TRANSFER_EVENT: &str =
    "Transfer(address indexed from, address indexed to, uint256 value)";

/// Parsed pair events used to classify and decode raw logs.
#[derive(Debug, Clone)]
pub struct PairEvents {
    pub swap: Event,
    pub mint: Event,
    pub burn: Event,
    pub transfer: Event,
}

impl PairEvents {
    pub fn new() -> DexResult<Self> {
        let abi = parse_abi(&[
            &format!("event {}", SWAP_EVENT),
            &format!("event {}", MINT_EVENT),
            &format!("event {}", BURN_EVENT),
            &format!("event {}", TRANSFER_EVENT),
        ])
        .map_err(|e| DexError::Abi(e.to_string()))?;

        let event = |name: &str| {
            abi.event(name)
                .cloned()
                .map_err(|e| DexError::Abi(e.to_string()))
        };

        Ok(Self {
            swap: event("Swap")?,
            mint: event("Mint")?,
            burn: event("Burn")?,
            transfer: event("Transfer")?,
        })
    }

    /// topic0 of the three activity events, in swap/mint/burn order.
    pub fn activity_signatures(&self) -> [H256; 3] {
        [
            self.swap.signature(),
            self.mint.signature(),
            self.burn.signature(),
        ]
    }
}
