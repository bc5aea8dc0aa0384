//! # Ferry Test
//!
//! Test support for ferry replication code.
//!
//! This crate provides:
//!
//! - [`MemoryRegistry`]: an in-memory [`Transport`](ferry_registry::Transport)
//!   with call counters, fault injection and artificial latency
//! - [`ImageFixture`] and [`IndexFixture`]: builders for real, correctly
//!   digested images and indexes

pub mod fixtures;
pub mod memory_registry;

pub use fixtures::{platforms, ImageFixture, IndexFixture};
pub use memory_registry::{Call, MemoryRegistry, Operation};
