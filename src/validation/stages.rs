//! Individual validation stages.
//!
//! Each stage checks for a specific category of errors. Stages descend into
//! nested pipeline layouts and report elements by path (`Sub::Filter`).

use crate::core::error::{LayoutError, ValidationWarning};
use crate::core::port::PATH_SEPARATOR;
use crate::gpu::device::DeviceLimits;
use crate::layout::connection::{ElementRef, Endpoint};
use crate::layout::pipeline::{ElementLayout, PipelineLayout};
use crate::layout::topology::TopologyAnalyzer;

/// Trait for validation stages.
pub trait ValidationStage: Send + Sync {
    /// Name of this validation stage.
    fn name(&self) -> &str;

    /// Validate the layout.
    ///
    /// Returns Ok with warnings, or Err with errors.
    fn validate(
        &self,
        layout: &PipelineLayout,
    ) -> Result<Vec<ValidationWarning>, Vec<LayoutError>>;
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", prefix, PATH_SEPARATOR, name)
    }
}

/// Visit `layout` and every nested layout, with the path prefix of each.
fn walk<'a>(layout: &'a PipelineLayout, prefix: &str, visit: &mut dyn FnMut(&'a PipelineLayout, &str)) {
    visit(layout, prefix);
    for (name, element) in layout.elements() {
        if let ElementLayout::Pipeline(nested) = element {
            walk(nested, &qualify(prefix, name), visit);
        }
    }
}

fn finish(
    warnings: Vec<ValidationWarning>,
    errors: Vec<LayoutError>,
) -> Result<Vec<ValidationWarning>, Vec<LayoutError>> {
    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(errors)
    }
}

/// Structural validation - checks that the graph is complete.
///
/// Verifies:
/// - Every element input has exactly one source
/// - Every boundary output has a source
///
/// Unused outputs, unused boundary inputs and elements that never reach a
/// boundary output are reported as warnings.
pub struct StructuralValidation;

impl ValidationStage for StructuralValidation {
    fn name(&self) -> &str {
        "Structural Validation"
    }

    fn validate(
        &self,
        layout: &PipelineLayout,
    ) -> Result<Vec<ValidationWarning>, Vec<LayoutError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        walk(layout, "", &mut |level, prefix| {
            let owner = if prefix.is_empty() { level.name() } else { prefix };

            // Empty layout warning (not error - a pipeline may be a placeholder)
            if level.element_count() == 0 {
                warnings.push(ValidationWarning {
                    message: format!("Layout '{}' has no elements", owner),
                    element: None,
                    suggestion: Some("Add filters to create a processing pipeline".to_string()),
                });
            }

            for (name, element) in level.elements() {
                let target = ElementRef::element(name);
                for input in element.inputs() {
                    let endpoint = Endpoint::new(target.clone(), input.name.as_str());
                    if level.connection_source(&endpoint).is_none() {
                        errors.push(LayoutError::UnconnectedInput {
                            element: qualify(prefix, name),
                            port: input.name.clone(),
                        });
                    }
                }
                for output in element.outputs() {
                    let endpoint = Endpoint::new(target.clone(), output.name.as_str());
                    if level.connection_destinations(&endpoint).is_empty() {
                        warnings.push(ValidationWarning {
                            message: format!("Output '{}' of '{}' is never used", output.name, name),
                            element: Some(qualify(prefix, name)),
                            suggestion: None,
                        });
                    }
                }
            }

            for output in level.outputs() {
                if level.connection_source(&Endpoint::boundary(output.name.as_str())).is_none() {
                    errors.push(LayoutError::UnconnectedOutput {
                        layout: owner.to_string(),
                        port: output.name.clone(),
                    });
                }
            }

            for input in level.inputs() {
                if level.connection_destinations(&Endpoint::boundary(input.name.as_str())).is_empty() {
                    warnings.push(ValidationWarning {
                        message: format!("Input '{}' of '{}' is never used", input.name, owner),
                        element: None,
                        suggestion: None,
                    });
                }
            }

            if !level.outputs().is_empty() {
                for name in TopologyAnalyzer::new(level).dead_elements() {
                    let is_sink = level
                        .element(&name)
                        .and_then(ElementLayout::as_filter)
                        .map_or(false, |f| f.is_sink());
                    if !is_sink {
                        warnings.push(ValidationWarning {
                            message: format!("'{}' does not contribute to any output", name),
                            element: Some(qualify(prefix, &name)),
                            suggestion: Some("Remove the element or connect it to an output".to_string()),
                        });
                    }
                }
            }
        });

        finish(warnings, errors)
    }
}

/// Cycle validation - checks that every level is a DAG.
pub struct CycleValidation;

impl ValidationStage for CycleValidation {
    fn name(&self) -> &str {
        "Cycle Validation"
    }

    fn validate(
        &self,
        layout: &PipelineLayout,
    ) -> Result<Vec<ValidationWarning>, Vec<LayoutError>> {
        let mut errors = Vec::new();

        walk(layout, "", &mut |level, prefix| {
            if let Err(LayoutError::Cycle { elements }) = TopologyAnalyzer::new(level).topological_sort() {
                errors.push(LayoutError::Cycle {
                    elements: elements.iter().map(|e| qualify(prefix, e)).collect(),
                });
            }
        });

        finish(Vec::new(), errors)
    }
}

/// Format validation - checks formats declared on both ends of a connection.
///
/// Disagreements are errors under the strict policy of the level holding the
/// connection, warnings otherwise.
pub struct FormatValidation;

impl ValidationStage for FormatValidation {
    fn name(&self) -> &str {
        "Format Validation"
    }

    fn validate(
        &self,
        layout: &PipelineLayout,
    ) -> Result<Vec<ValidationWarning>, Vec<LayoutError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        walk(layout, "", &mut |level, prefix| {
            for connection in level.connections() {
                let from = match &connection.from.element {
                    ElementRef::Boundary => level.inputs().iter().find(|p| p.name == connection.from.port),
                    ElementRef::Element(name) => level
                        .element(name)
                        .and_then(|e| e.outputs().iter().find(|p| p.name == connection.from.port)),
                };
                let to = match &connection.to.element {
                    ElementRef::Boundary => level.outputs().iter().find(|p| p.name == connection.to.port),
                    ElementRef::Element(name) => level
                        .element(name)
                        .and_then(|e| e.inputs().iter().find(|p| p.name == connection.to.port)),
                };
                let (Some(from_format), Some(to_format)) =
                    (from.and_then(|p| p.format), to.and_then(|p| p.format))
                else {
                    continue;
                };
                if from_format.is_compatible_with(&to_format) {
                    continue;
                }

                let error = LayoutError::FormatMismatch {
                    from: qualify(prefix, &connection.from.to_string()),
                    to: qualify(prefix, &connection.to.to_string()),
                    from_format,
                    to_format,
                };
                if level.format_policy().is_strict() {
                    errors.push(error);
                } else {
                    warnings.push(ValidationWarning {
                        message: error.to_string(),
                        element: Some(qualify(prefix, connection.to.element.name())),
                        suggestion: error.suggested_fix(),
                    });
                }
            }
        });

        finish(warnings, errors)
    }
}

/// Limits validation - checks every filter against device capabilities.
///
/// Verifies:
/// - Sampler count fits in the texture units
/// - Output count fits in the color attachments
/// - The output format fits in the maximum texture size
pub struct LimitsValidation {
    limits: DeviceLimits,
}

impl LimitsValidation {
    pub fn new(limits: DeviceLimits) -> Self {
        Self { limits }
    }
}

impl Default for LimitsValidation {
    fn default() -> Self {
        Self::new(DeviceLimits::default())
    }
}

impl ValidationStage for LimitsValidation {
    fn name(&self) -> &str {
        "Limits Validation"
    }

    fn validate(
        &self,
        layout: &PipelineLayout,
    ) -> Result<Vec<ValidationWarning>, Vec<LayoutError>> {
        let mut errors = Vec::new();
        let limits = self.limits;

        walk(layout, "", &mut |level, prefix| {
            for (name, element) in level.elements() {
                let Some(filter) = element.as_filter() else {
                    continue;
                };
                let path = qualify(prefix, name);
                if filter.inputs().len() > limits.max_texture_units as usize {
                    errors.push(LayoutError::ExceedsLimits {
                        element: path.clone(),
                        detail: format!(
                            "{} samplers, at most {} texture units",
                            filter.inputs().len(),
                            limits.max_texture_units
                        ),
                    });
                }
                if filter.outputs().len() > limits.max_color_attachments as usize {
                    errors.push(LayoutError::ExceedsLimits {
                        element: path.clone(),
                        detail: format!(
                            "{} outputs, at most {} color attachments",
                            filter.outputs().len(),
                            limits.max_color_attachments
                        ),
                    });
                }
                let format = filter.format();
                if format.width() > limits.max_texture_size || format.height() > limits.max_texture_size {
                    errors.push(LayoutError::ExceedsLimits {
                        element: path,
                        detail: format!(
                            "{}x{} output, at most {}",
                            format.width(),
                            format.height(),
                            limits.max_texture_size
                        ),
                    });
                }
            }
        });

        finish(Vec::new(), errors)
    }
}
