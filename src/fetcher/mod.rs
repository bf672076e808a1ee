pub mod coingecko;
pub mod resilient;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use coingecko::CoinGeckoFetcher;
pub use resilient::{CircuitBreaker, ResilientFetcher, RetryPolicy};
pub use traits::PriceFetcher;
