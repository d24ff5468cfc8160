//! Multi-tier routing cache: L1 in-process LRU, L2 durable exact-hash, L3
//! durable semantic (cosine similarity) lookup. Each tier is tried in order,
//! stopping at the first hit; a hit anywhere populates the faster tiers
//! above it.

pub mod l1;
pub mod l2;
pub mod l3;

pub use l1::L1Cache;
