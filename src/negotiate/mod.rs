//! Connection negotiation.
//!
//! Reader firmware exposes its protocol on different GATT services and
//! characteristics. [`ConnectionNegotiator`] tries a fixed list of strategies
//! in order until one yields a usable characteristic, then remembers the pair
//! for next time.

mod negotiator;
mod store;
mod strategy;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use negotiator::ConnectionNegotiator;
pub use store::{LinkStore, MemoryLinkStore, TomlLinkStore};
pub use strategy::StrategyKind;
pub use types::{
    ConnectionCandidate, LinkHandle, LinkMode, NegotiationOutcome, NegotiationState, StrategyFailure,
};
