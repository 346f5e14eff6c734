//! Parallel execution for kernrt kernels.
//!
//! Kernels split their work into contiguous index blocks and hand them to
//! [`parallel_launch`] or [`parallel_launch_mut`]. Blocks run on a bounded,
//! process-wide Rayon pool (see [`thread_pool`]) and a launch returns only
//! once every block has finished.
//!
//! The block size is chosen by a [`Split`] policy. [`Split::Auto`] measures
//! a series of candidate block sizes over successive launches and then keeps
//! the fastest, caching the decision in a [`SearchCache`] keyed by operator
//! and shape.

mod config;
mod launch;
mod partition;
mod pool;
mod search;

pub use config::{ParallelConfig, parallel_config};
pub use launch::{Split, parallel_launch, parallel_launch_mut};
pub use partition::{Partition, Rows};
pub use pool::{ThreadPool, thread_pool};
pub use search::{
    DEFAULT_SEARCH_CACHE_CAPACITY, ParallelSearchState, SearchCache, SearchKey, SearchSlot,
    search_cache,
};
