//! # Corpus Swarm
//!
//! Answers corpus queries (frequency distributions, text-type breakdowns,
//! collocation data) over corpora that are too large for a single query by
//! partitioning them into shards, dispatching one job per shard through the
//! [`synapse`] job queue, and merging the partial answers.
//!
//! - [`core::query`]: the job wire contract shared with the workers
//! - [`core::results`]: result types, the merge rules and post-processing
//! - [`core::executor`]: single-job calls and the scatter-gather executor
//! - [`core::sharding`]: creating and opening shard sets
//! - [`gateway`]: thin HTTP adapter over the above

pub mod config;
pub mod core;
pub mod error;
pub mod gateway;

pub use crate::config::SwarmConfig;
pub use crate::core::executor::{Executor, FailureStage, Gathered, ShardFailure, ShardTask};
pub use crate::core::query::QueryFunction;
pub use crate::core::results::{FreqDistrib, FreqDistribItem, Mergeable};
pub use crate::core::sharding::ShardService;
pub use crate::error::{Result, SwarmError};
