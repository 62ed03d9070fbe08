pub mod cli;
pub mod config;
pub mod error;
pub mod rl;

pub use config::AppConfig;
pub use error::{Result, TraderError};
pub use rl::{RLConfig, TradingSystem};
