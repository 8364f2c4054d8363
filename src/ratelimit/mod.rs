//! Rate limiting logic and counter store backends.

mod connect;
mod decision;
pub mod identifier;
mod key;
mod limiter;
mod memory;
mod redis_store;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use connect::{open_store, MEMORY_SCHEME};
pub use decision::RateLimitDecision;
pub use key::RateLimitKey;
pub use limiter::RateLimiter;
pub use memory::InMemoryCounterStore;
pub use redis_store::RedisCounterStore;
pub use store::{CounterStore, StoreError};
