#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`api`]: [`QueueStore`] trait와 판정 타입 ([`BreakerState`], [`DedupVerdict`])
//! - [`memory`]: 인메모리 구현 [`MemoryStore`]

pub mod api;
pub mod memory;

// --- 주요 타입 re-export ---

pub use api::{BreakerState, DedupVerdict, QueueStore, SharedStore};
pub use memory::MemoryStore;
