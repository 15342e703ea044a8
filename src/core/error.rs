//! Error types for glip.
//!
//! Uses thiserror for structured errors with context. The taxonomy follows
//! the life of a pipeline:
//! - [`LayoutError`]: malformed graphs, raised while a layout is built
//! - [`ResourceError`]: GPU allocation, compilation and link failures
//! - [`BindingError`]: runtime binding problems, the pipeline stays usable
//! - [`TextureIoError`]: host buffer transfers, local to the call
//!
//! Every error names the element, port or shader it originates from.

use crate::core::format::TextureFormat;
use crate::core::port::PortDirection;
use crate::core::uniform::UniformType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse classification of a [`GlipError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed graph description.
    Construction,
    /// GPU resource failure, fatal to the pipeline instance.
    Resource,
    /// Runtime binding problem, recoverable by the caller.
    Binding,
    /// Host buffer transfer problem.
    Io,
    /// Shader text could not be scanned.
    Parse,
    /// Stream chain could not be resolved.
    Stream,
    /// Configuration could not be loaded.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Construction => "construction",
            ErrorKind::Resource => "resource",
            ErrorKind::Binding => "binding",
            ErrorKind::Io => "io",
            ErrorKind::Parse => "parse",
            ErrorKind::Stream => "stream",
            ErrorKind::Config => "config",
        };
        write!(f, "{}", name)
    }
}

/// Top-level error type for glip.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum GlipError {
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("Texture I/O error: {0}")]
    TextureIo(#[from] TextureIoError),

    #[error("Shader parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to instantiate '{location}': {source}")]
    Instantiation {
        location: String,
        #[source]
        source: Box<GlipError>,
    },
}

/// Errors raised while building or validating a pipeline layout.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayoutError {
    #[error("Name '{name}' is already used in '{owner}'")]
    DuplicateName { owner: String, name: String },

    #[error("Invalid name '{name}': names must be non-empty and must not contain '::' or whitespace")]
    InvalidName { name: String },

    #[error("Element '{element}' not found in '{layout}'")]
    UnknownElement { layout: String, element: String },

    #[error("{direction} port '{port}' not found on '{element}'")]
    UnknownPort {
        element: String,
        port: String,
        direction: PortDirection,
    },

    #[error("Port '{port}' on '{element}' is an {actual} port, expected an {expected} port")]
    PortDirection {
        element: String,
        port: String,
        expected: PortDirection,
        actual: PortDirection,
    },

    #[error("Port '{port}' on '{element}' is already connected")]
    PortAlreadyConnected { element: String, port: String },

    #[error("Input '{port}' on '{element}' is not connected")]
    UnconnectedInput { element: String, port: String },

    #[error("Output '{port}' of '{layout}' has no source")]
    UnconnectedOutput { layout: String, port: String },

    #[error("Cycle detected involving elements: {elements:?}")]
    Cycle { elements: Vec<String> },

    #[error("Input '{input}' of '{layout}' cannot feed output '{output}' directly")]
    PassThrough {
        layout: String,
        input: String,
        output: String,
    },

    #[error("Filter '{filter}' has no {direction} ports and is not marked as a {marker}")]
    NoPorts {
        filter: String,
        direction: PortDirection,
        marker: String,
    },

    #[error("Format mismatch from '{from}' ({from_format}) to '{to}' ({to_format})")]
    FormatMismatch {
        from: String,
        to: String,
        from_format: TextureFormat,
        to_format: TextureFormat,
    },

    #[error("Element '{element}' exceeds device limits: {detail}")]
    ExceedsLimits { element: String, detail: String },

    #[error("Layout '{layout}' is invalid ({} error(s))", .errors.len())]
    Invalid {
        layout: String,
        errors: Vec<LayoutError>,
    },
}

/// Errors from GPU resource management.
///
/// These are fatal to the pipeline instance that raised them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("Failed to compile shader '{shader}':\n{log}")]
    Compile { shader: String, log: String },

    #[error("Failed to link program for '{shader}':\n{log}")]
    Link { shader: String, log: String },

    #[error("Failed to allocate {what}: {reason}")]
    Allocation { what: String, reason: String },

    #[error("Framebuffer is incomplete: {reason}")]
    IncompleteFramebuffer { reason: String },

    #[error("{count} {direction} ports requested, the device supports at most {max}")]
    TooManyPorts {
        direction: PortDirection,
        count: usize,
        max: u32,
    },

    #[error("Texture of {width}x{height} exceeds the maximum size of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    #[error("Pipeline '{pipeline}' failed on first use and cannot run")]
    Broken { pipeline: String },

    #[error("Device error: {0}")]
    Device(String),
}

/// Errors from binding textures and values to a live pipeline.
///
/// The pipeline remains usable once the caller corrects the binding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error("{direction} port '{port}' not found on pipeline '{pipeline}'")]
    UnknownPort {
        pipeline: String,
        port: String,
        direction: PortDirection,
    },

    #[error("Input '{port}' of pipeline '{pipeline}' is not bound")]
    UnboundInput { pipeline: String, port: String },

    #[error("Texture bound to input '{port}' of pipeline '{pipeline}' was released")]
    ReleasedInput { pipeline: String, port: String },

    #[error("Texture format {actual} does not match {expected} expected by input '{port}'")]
    FormatMismatch {
        port: String,
        expected: TextureFormat,
        actual: TextureFormat,
    },

    #[error("Input '{port}' cannot be bound to an output of pipeline '{pipeline}' itself")]
    SelfFeedback { pipeline: String, port: String },

    #[error("Texture bound to input '{port}' belongs to another context")]
    ContextMismatch { port: String },

    #[error("Filter '{filter}' not found in pipeline '{pipeline}'")]
    UnknownFilter { pipeline: String, filter: String },

    #[error("Uniform '{name}' is not declared by filter '{filter}'")]
    UnknownUniform { filter: String, name: String },

    #[error("Uniform '{name}' of filter '{filter}' has type {expected}, got {actual}")]
    UniformTypeMismatch {
        filter: String,
        name: String,
        expected: UniformType,
        actual: UniformType,
    },
}

/// Errors from host buffer transfers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TextureIoError {
    #[error("Buffer holds {actual} bytes, texture {format} needs {expected}")]
    BufferSize {
        format: TextureFormat,
        expected: usize,
        actual: usize,
    },

    #[error("Device error: {0}")]
    Device(String),
}

/// Errors from scanning shader text for ports.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read shader '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unterminated comment starting at line {line} in '{shader}'")]
    UnterminatedComment { shader: String, line: usize },

    #[error("Unbalanced '{delimiter}' at line {line} in '{shader}'")]
    UnbalancedBlock {
        shader: String,
        delimiter: char,
        line: usize,
    },

    #[error("Invalid GLSL version '{token}' in '{shader}'")]
    InvalidVersion { shader: String, token: String },

    #[error("Unsupported uniform type '{type_name}' in '{shader}'")]
    UnsupportedType { shader: String, type_name: String },
}

/// Errors from resolving stream chains.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Stream '{stream}' does not lead to any texture")]
    Unresolved { stream: String },

    #[error("Stream chain is cyclic: {}", .chain.join(" -> "))]
    Cyclic { chain: Vec<String> },

    #[error("Stream #{0} does not exist")]
    UnknownStream(usize),
}

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

// ============================================================================
// Error Utilities
// ============================================================================

impl GlipError {
    /// Wrap an error with the location it was raised from.
    pub fn at(location: impl Into<String>, source: impl Into<GlipError>) -> Self {
        GlipError::Instantiation {
            location: location.into(),
            source: Box::new(source.into()),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GlipError::Layout(_) => ErrorKind::Construction,
            GlipError::Resource(_) => ErrorKind::Resource,
            GlipError::Binding(_) => ErrorKind::Binding,
            GlipError::TextureIo(_) => ErrorKind::Io,
            GlipError::Parse(_) => ErrorKind::Parse,
            GlipError::Stream(_) => ErrorKind::Stream,
            GlipError::Config(_) | GlipError::Serialization(_) => ErrorKind::Config,
            GlipError::Instantiation { source, .. } => source.kind(),
        }
    }

    /// Check if this error leaves the pipeline instance unusable.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Resource
    }

    /// Innermost error of an instantiation chain.
    pub fn root_cause(&self) -> &GlipError {
        match self {
            GlipError::Instantiation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl LayoutError {
    /// Check if this error should stop validation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LayoutError::Cycle { .. })
    }

    /// Get suggestion for fixing this error.
    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            LayoutError::UnconnectedInput { element, port } => {
                Some(format!("Connect a source to input '{}' of '{}'", port, element))
            }
            LayoutError::UnconnectedOutput { port, .. } => {
                Some(format!("Connect a filter output to '{}'", port))
            }
            LayoutError::PortAlreadyConnected { port, .. } => Some(format!(
                "Inputs accept exactly one connection, remove the existing edge into '{}'",
                port
            )),
            LayoutError::FormatMismatch { .. } => {
                Some("Use matching pixel modes and depths, or the permissive format policy".to_string())
            }
            LayoutError::PassThrough { .. } => {
                Some("Insert a copy filter between the input and the output".to_string())
            }
            LayoutError::NoPorts { marker, .. } => {
                Some(format!("Declare the missing ports or mark the filter as a {}", marker))
            }
            _ => None,
        }
    }

    /// Get names of the elements involved.
    pub fn affected_elements(&self) -> Vec<String> {
        match self {
            LayoutError::UnknownPort { element, .. }
            | LayoutError::PortDirection { element, .. }
            | LayoutError::PortAlreadyConnected { element, .. }
            | LayoutError::UnconnectedInput { element, .. }
            | LayoutError::ExceedsLimits { element, .. } => vec![element.clone()],
            LayoutError::UnknownElement { element, .. } => vec![element.clone()],
            LayoutError::NoPorts { filter, .. } => vec![filter.clone()],
            LayoutError::Cycle { elements } => elements.clone(),
            LayoutError::Invalid { errors, .. } => {
                errors.iter().flat_map(|e| e.affected_elements()).collect()
            }
            _ => vec![],
        }
    }
}

/// Result type alias for glip operations.
pub type GlipResult<T> = Result<T, GlipError>;

/// Result type alias for layout construction.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Result type alias for GPU resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Result type alias for runtime binding.
pub type BindingResult<T> = Result<T, BindingError>;

// ============================================================================
// Validation Report
// ============================================================================

/// Comprehensive validation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether validation passed without errors.
    pub success: bool,
    /// List of errors found.
    pub errors: Vec<LayoutError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<ValidationWarning>,
    /// Time taken for validation in microseconds.
    pub duration_us: u64,
}

/// Non-fatal validation warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Warning message.
    pub message: String,
    /// Element that triggered the warning, if applicable.
    pub element: Option<String>,
    /// Suggestion for addressing the warning.
    pub suggestion: Option<String>,
}

impl ValidationReport {
    /// Create a new empty report (success).
    pub fn new() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            duration_us: 0,
        }
    }

    /// Add an error to the report.
    pub fn add_error(&mut self, error: LayoutError) {
        self.success = false;
        self.errors.push(error);
    }

    /// Add a warning to the report.
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Check if the layout can be instantiated.
    pub fn can_execute(&self) -> bool {
        self.success
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        if self.success {
            if self.warnings.is_empty() {
                "✓ Layout is valid".to_string()
            } else {
                format!("✓ Layout is valid with {} warning(s)", self.warnings.len())
            }
        } else {
            format!("✗ Validation failed with {} error(s)", self.errors.len())
        }
    }

    /// Get detailed error messages with suggestions.
    pub fn detailed_errors(&self) -> Vec<String> {
        self.errors
            .iter()
            .enumerate()
            .map(|(i, error)| {
                let mut msg = format!("{}. {}", i + 1, error);
                if let Some(fix) = error.suggested_fix() {
                    msg.push_str(&format!("\n   → Suggestion: {}", fix));
                }
                msg
            })
            .collect()
    }

    /// Turn a failed report into an error for `layout`.
    pub fn into_result(self, layout: &str) -> LayoutResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(LayoutError::Invalid {
                layout: layout.to_string(),
                errors: self.errors,
            })
        }
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_error_suggestions() {
        let error = LayoutError::UnconnectedInput {
            element: "Blur".to_string(),
            port: "inText".to_string(),
        };
        assert!(error.suggested_fix().unwrap().contains("inText"));
        assert_eq!(error.affected_elements(), vec!["Blur".to_string()]);
    }

    #[test]
    fn test_validation_report() {
        let mut report = ValidationReport::new();
        assert!(report.can_execute());

        report.add_error(LayoutError::Cycle {
            elements: vec!["A".to_string(), "B".to_string()],
        });
        assert!(!report.can_execute());
        assert_eq!(report.errors.len(), 1);
        assert!(report.summary().contains("1 error"));

        let err = report.into_result("Main").unwrap_err();
        assert!(matches!(err, LayoutError::Invalid { ref errors, .. } if errors.len() == 1));
    }

    #[test]
    fn test_error_kind_through_instantiation() {
        let inner = ResourceError::Compile {
            shader: "copy.glsl".to_string(),
            log: "0:3(1): error".to_string(),
        };
        let err = GlipError::at("Main::Copy", inner);
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(err.is_fatal());
        assert!(matches!(err.root_cause(), GlipError::Resource(ResourceError::Compile { .. })));

        let binding: GlipError = BindingError::UnboundInput {
            pipeline: "P".to_string(),
            port: "In".to_string(),
        }
        .into();
        assert!(!binding.is_fatal());
    }
}
