//! The line-by-line re-bucketing pipeline.
//!
//! Each source file streams through the aggregator into an in-memory
//! accumulator, which the writer flushes to per-bucket CSV files every
//! `batch` lines and once more at end of stream.

pub mod accumulator;
pub mod aggregate;
pub mod driver;
pub mod naming;
pub mod writer;
