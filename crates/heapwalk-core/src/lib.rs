//! # heapwalk-core
//!
//! Heap snapshot crawling and object graph materialization for Heapwalk.
//!
//! Given a captured snapshot of a managed runtime (raw heap segments, GC
//! handles, native objects and type metadata), this crate reconstructs the
//! live managed object graph and links it to the engine's native objects:
//!
//! - [`heap`]: address resolution over heap segments and typed byte views
//! - [`metadata`]: type and field descriptions with handle lookups
//! - [`snapshot`]: the input model and its builder
//! - [`crawler`]: discovery of managed objects and reference edges
//! - [`graph`]: typed nodes with resolved adjacency
//! - [`inspect`]: read-only field, string and array decoding
//!
//! ## Example
//!
//! ```rust
//! use heapwalk_core::prelude::*;
//!
//! let mut snapshot = Snapshot::builder(VirtualMachineInformation::x64()).build()?;
//! let crawled = Crawler::new(CrawlConfig::default()).crawl(&mut snapshot)?;
//! let graph = HeapGraph::materialize(&snapshot, &crawled)?;
//! assert!(graph.is_empty());
//! # Ok::<(), HeapwalkError>(())
//! ```
//!
//! Everything is single-threaded and synchronous. A crawl borrows its snapshot
//! mutably for its whole duration.

pub mod crawler;
pub mod error;
pub mod graph;
pub mod heap;
pub mod inspect;
pub mod metadata;
pub mod prelude;
pub mod snapshot;
pub mod types;

pub use crawler::{crawl, CrawlConfig, CrawledSnapshot, Crawler};
pub use error::{HeapwalkError, HeapwalkResult};
pub use graph::HeapGraph;
pub use snapshot::Snapshot;
