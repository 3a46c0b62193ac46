//! Skiff Storage
//!
//! Typed facade over the external key/value + stream service that holds
//! event status records, agent records, their indexes, the audit stream,
//! and counters.
//!
//! # Overview
//!
//! The control plane only talks to [`StateStore`]; any store providing
//! get/set-with-TTL, sorted sets, sets, streams, and atomic counters can
//! back it. Two backends are provided:
//! - In-memory ([`MemoryStore`]) for tests
//! - Redis ([`RedisStore`]) for production

pub mod memory;
pub mod redis;
pub mod store;

pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use store::{keys, StateStore};
