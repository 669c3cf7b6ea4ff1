//! Conduit validate: ownership-chain rules, the two reference-lookup backends they read
//! through, and a store facade that applies the rules to programmatic writes.

#![forbid(unsafe_code)]

mod guarded;
mod lookup;
mod validator;

pub use guarded::GuardedStore;
pub use lookup::{KubeLookup, ResourceLookup, StoreLookup};
pub use validator::OwnershipValidator;
