//! Execution module.
//!
//! This module turns layouts into runnable pipeline instances and runs them.

pub mod pipeline;
pub mod streams;

pub use pipeline::{ExecutionStats, OutputValidity, Pipeline, PipelineState};
pub use streams::{ResolvedStream, StreamId, StreamManager, StreamSource};
