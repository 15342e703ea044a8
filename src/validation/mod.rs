//! Validation module for pre-instantiation checking.
//!
//! The validation pipeline runs before any GPU resource is allocated, to
//! catch incomplete or inconsistent layouts early.

pub mod pipeline;
pub mod stages;

pub use pipeline::{FilterBudget, ValidationPipeline};
pub use stages::{
    CycleValidation, FormatValidation, LimitsValidation, StructuralValidation, ValidationStage,
};
