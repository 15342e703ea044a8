//! Validation pipeline implementation.

use crate::core::error::{LayoutError, ValidationReport, ValidationWarning};
use crate::gpu::device::DeviceLimits;
use crate::layout::pipeline::PipelineLayout;
use crate::validation::stages::{
    CycleValidation, FormatValidation, LimitsValidation, StructuralValidation, ValidationStage,
};
use log::debug;
use std::time::Instant;

/// Multi-stage validation pipeline.
///
/// Runs a series of validation stages on a layout to check for errors
/// before any GPU resource is allocated.
pub struct ValidationPipeline {
    stages: Vec<Box<dyn ValidationStage>>,
}

impl ValidationPipeline {
    /// Create a new pipeline with the given stages.
    pub fn new(stages: Vec<Box<dyn ValidationStage>>) -> Self {
        Self { stages }
    }

    /// Create the default validation pipeline with all standard stages,
    /// checked against default device limits.
    pub fn default_pipeline() -> Self {
        Self::for_device(DeviceLimits::default())
    }

    /// All standard stages, checked against the limits of a device.
    pub fn for_device(limits: DeviceLimits) -> Self {
        Self {
            stages: vec![
                Box::new(CycleValidation),
                Box::new(StructuralValidation),
                Box::new(FormatValidation),
                Box::new(LimitsValidation::new(limits)),
            ],
        }
    }

    /// Create a minimal pipeline (just cycle and structural checks).
    pub fn minimal_pipeline() -> Self {
        Self {
            stages: vec![Box::new(CycleValidation), Box::new(StructuralValidation)],
        }
    }

    /// Add a custom validation stage.
    pub fn add_stage(&mut self, stage: Box<dyn ValidationStage>) {
        self.stages.push(stage);
    }

    /// Validate a layout through all stages.
    pub fn validate(&self, layout: &PipelineLayout) -> ValidationReport {
        let start = Instant::now();
        let mut report = ValidationReport::new();

        for stage in &self.stages {
            match stage.validate(layout) {
                Ok(warnings) => {
                    for warning in warnings {
                        report.add_warning(warning);
                    }
                }
                Err(errors) => {
                    debug!("{}: {} error(s) in '{}'", stage.name(), errors.len(), layout.name());
                    for error in errors {
                        let is_fatal = error.is_fatal();
                        report.add_error(error);

                        // Stop on fatal errors
                        if is_fatal {
                            report.duration_us = start.elapsed().as_micros() as u64;
                            return report;
                        }
                    }
                }
            }
        }

        report.duration_us = start.elapsed().as_micros() as u64;
        report
    }

    /// Quick validation - just check if the layout can be instantiated.
    pub fn can_execute(&self, layout: &PipelineLayout) -> bool {
        self.validate(layout).can_execute()
    }

    /// Names of the stages, in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::default_pipeline()
    }
}

/// Stage that forbids layouts with more than a given number of filters.
pub struct FilterBudget(pub usize);

impl ValidationStage for FilterBudget {
    fn name(&self) -> &str {
        "Filter Budget"
    }

    fn validate(
        &self,
        layout: &PipelineLayout,
    ) -> Result<Vec<ValidationWarning>, Vec<LayoutError>> {
        let count = layout.filter_count();
        if count > self.0 {
            Err(vec![LayoutError::ExceedsLimits {
                element: layout.name().to_string(),
                detail: format!("{} filters, at most {}", count, self.0),
            }])
        } else {
            Ok(Vec::new())
        }
    }
}
