pub mod abi;
pub mod config;
pub mod error;
pub mod history;
pub mod pool;
pub mod quote;
pub mod router;
pub mod tokens;
pub mod types;
pub mod utils;
pub mod wallet;
