//! Core types shared by the flow dashboard crates.
//!
//! Holds the trading-day key, the investor net-buy and ranking tables, the
//! error taxonomy and the [`MarketDataSource`] seam every other crate talks
//! through.

pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod traits;
pub mod types;

pub use error::*;
#[cfg(any(test, feature = "test-support"))]
pub use memory::InMemorySource;
pub use traits::*;
pub use types::*;
