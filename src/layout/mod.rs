//! Layouts: reusable templates of filters and pipelines.
//!
//! This module contains:
//! - Filter layouts built from shader sources
//! - Pipeline layouts, hierarchical graphs of filters
//! - Topological analysis of those graphs
//! - JSON serialization of layouts

pub mod connection;
pub mod filter;
pub mod pipeline;
pub mod serialization;
pub mod topology;

pub use connection::{Connection, ElementRef, Endpoint, THIS};
pub use filter::{standard_vertex_shader, FilterLayout, FilterLayoutBuilder};
pub use pipeline::{ElementLayout, PipelineLayout};
pub use serialization::SerializedLayout;
pub use topology::{stable_topological_order, TopologyAnalyzer};
