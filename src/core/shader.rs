//! GLSL shader sources and port discovery.
//!
//! A [`ShaderSource`] keeps the shader text as written and scans its global
//! declarations:
//! - `uniform sampler2D a, b;` declares the input ports `a` and `b`
//! - `out vec4 c;` declares the output port `c`
//! - any other `uniform` is a tunable variable of the filter
//!
//! The text is never compiled here. Compilation happens when a pipeline is
//! instantiated, and failures come back with the driver log annotated by
//! [`ShaderSource::annotate_log`].

use crate::core::error::ParseError;
use crate::core::uniform::UniformType;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output port name used by shaders that write `gl_FragColor`.
pub const FRAG_COLOR_PORT: &str = "outputTexture";

/// Sampler types that can be bound to an input port.
const SAMPLER_TYPES: &[&str] = &["sampler2D", "isampler2D", "usampler2D"];

const QUALIFIERS: &[&str] = &[
    "lowp",
    "mediump",
    "highp",
    "flat",
    "smooth",
    "noperspective",
    "centroid",
    "invariant",
];

/// A uniform variable declared by a shader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformDeclaration {
    pub name: String,
    pub ty: UniformType,
}

/// GLSL source text and the declarations found in it.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    source: String,
    name: Option<String>,
    version: Option<u32>,
    profile: Option<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    uniforms: Vec<UniformDeclaration>,
    compatibility: bool,
}

impl ShaderSource {
    /// Scan shader text.
    pub fn new(source: impl Into<String>) -> Result<Self, ParseError> {
        Self::parse(source.into(), None)
    }

    /// Read and scan a shader file. The file name becomes the shader name.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(source, Some(name))
    }

    /// Set the name used in logs and error messages.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Display name, `<inline>` when none was given.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("<inline>")
    }

    /// Number given by the `#version` directive.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Profile given by the `#version` directive (`core`, `es`, ...).
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Sampler names, in declaration order.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Output variable names, in declaration order.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Non-sampler uniforms, in declaration order.
    pub fn uniforms(&self) -> &[UniformDeclaration] {
        &self.uniforms
    }

    /// Look up a uniform declaration.
    pub fn uniform(&self, name: &str) -> Option<&UniformDeclaration> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// The shader writes `gl_FragColor` instead of declaring outputs.
    pub fn requires_compatibility(&self) -> bool {
        self.compatibility
    }

    /// Line `number` of the source, counted from 1.
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|index| self.source.lines().nth(index))
    }

    /// Append the offending source line to every log line that points at one.
    pub fn annotate_log(&self, log: &str) -> String {
        let mut annotated = String::with_capacity(log.len());
        for entry in log.lines() {
            annotated.push_str(entry);
            annotated.push('\n');
            if let Some(code) = log_line_number(entry).and_then(|n| self.line(n).map(|c| (n, c))) {
                annotated.push_str(&format!("    > {}:{}: {}\n", self.name(), code.0, code.1.trim()));
            }
        }
        annotated
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    fn parse(source: String, name: Option<String>) -> Result<Self, ParseError> {
        let shader = name.clone().unwrap_or_else(|| "<inline>".to_string());
        let uncommented = strip_comments(&source, &shader)?;
        let (directive_free, version, profile) = strip_directives(&uncommented, &shader)?;
        let flattened = strip_blocks(&directive_free, &shader)?;

        let mut result = Self {
            compatibility: false,
            version,
            profile,
            inputs: Vec::new(),
            outputs: Vec::new(),
            uniforms: Vec::new(),
            name,
            source,
        };
        result.scan_declarations(&tokenize(&flattened), &shader)?;

        if result.outputs.is_empty() && uncommented.contains("gl_FragColor") {
            result.outputs.push(FRAG_COLOR_PORT.to_string());
            result.compatibility = true;
        }

        debug!(
            "Scanned shader '{}': inputs {:?}, outputs {:?}, {} uniform(s)",
            shader,
            result.inputs,
            result.outputs,
            result.uniforms.len()
        );
        Ok(result)
    }

    fn scan_declarations(&mut self, tokens: &[String], shader: &str) -> Result<(), ParseError> {
        #[derive(PartialEq)]
        enum Declaring {
            Nothing,
            Uniform,
            Out,
        }
        enum Kind {
            Sampler,
            Value(UniformType),
            Output,
            Ignored,
        }

        let mut declaring = Declaring::Nothing;
        let mut kind: Option<Kind> = None;
        let mut in_initializer = false;
        let mut skip_statement = false;

        for token in tokens {
            match token.as_str() {
                ";" => {
                    declaring = Declaring::Nothing;
                    kind = None;
                    in_initializer = false;
                    skip_statement = false;
                }
                _ if skip_statement => {}
                "=" => in_initializer = true,
                "," => in_initializer = false,
                "{}" => skip_statement = declaring != Declaring::Nothing,
                "uniform" => declaring = Declaring::Uniform,
                "out" => declaring = Declaring::Out,
                _ if declaring == Declaring::Nothing || in_initializer => {}
                word if kind.is_none() => {
                    if QUALIFIERS.contains(&word) {
                        continue;
                    }
                    kind = Some(match declaring {
                        Declaring::Out => Kind::Output,
                        _ if SAMPLER_TYPES.contains(&word) => Kind::Sampler,
                        _ => match UniformType::from_glsl(word) {
                            Some(ty) => Kind::Value(ty),
                            None if word.starts_with("sampler")
                                || word.starts_with("isampler")
                                || word.starts_with("usampler")
                                || word.starts_with("image") =>
                            {
                                return Err(ParseError::UnsupportedType {
                                    shader: shader.to_string(),
                                    type_name: word.to_string(),
                                });
                            }
                            None => {
                                warn!(
                                    "Shader '{}': uniform of type '{}' cannot be set from the host",
                                    shader, word
                                );
                                Kind::Ignored
                            }
                        },
                    });
                }
                word => match &kind {
                    Some(Kind::Sampler) => self.inputs.push(word.to_string()),
                    Some(Kind::Output) => self.outputs.push(word.to_string()),
                    Some(Kind::Value(ty)) => self.uniforms.push(UniformDeclaration {
                        name: word.to_string(),
                        ty: *ty,
                    }),
                    Some(Kind::Ignored) | None => {}
                },
            }
        }
        Ok(())
    }
}

/// Remove `//` and `/* */` comments, keeping line breaks.
fn strip_comments(source: &str, shader: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match (c, next) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        line += 1;
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let start = line;
                let mut previous = '\0';
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        line += 1;
                    }
                    if previous == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    previous = c;
                }
                if !closed {
                    return Err(ParseError::UnterminatedComment {
                        shader: shader.to_string(),
                        line: start,
                    });
                }
                out.push(' ');
            }
            _ => {
                if c == '\n' {
                    line += 1;
                }
                out.push(c);
            }
        }
    }
    Ok(out)
}

/// Blank out preprocessor lines, extracting the `#version` directive.
fn strip_directives(
    source: &str,
    shader: &str,
) -> Result<(String, Option<u32>, Option<String>), ParseError> {
    let mut out = String::with_capacity(source.len());
    let mut version = None;
    let mut profile = None;

    for line in source.lines() {
        let trimmed = line.trim_start();
        if let Some(directive) = trimmed.strip_prefix('#') {
            let mut words = directive.split_whitespace();
            if words.next() == Some("version") {
                let token = words.next().unwrap_or_default();
                version = Some(token.parse::<u32>().map_err(|_| ParseError::InvalidVersion {
                    shader: shader.to_string(),
                    token: token.to_string(),
                })?);
                profile = words.next().map(str::to_string);
            }
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    Ok((out, version, profile))
}

/// Collapse `{}`, `()` and `[]` blocks. Brace blocks leave a `{}` marker.
fn strip_blocks(source: &str, shader: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(source.len());
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1;

    for c in source.chars() {
        if c == '\n' {
            line += 1;
        }
        match c {
            '{' | '(' | '[' => {
                if stack.is_empty() {
                    out.push_str(if c == '{' { " {} " } else { " " });
                }
                stack.push((c, line));
            }
            '}' | ')' | ']' => {
                let expected = match c {
                    '}' => '{',
                    ')' => '(',
                    _ => '[',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => {
                        return Err(ParseError::UnbalancedBlock {
                            shader: shader.to_string(),
                            delimiter: c,
                            line,
                        })
                    }
                }
            }
            _ if stack.is_empty() => out.push(c),
            _ => {}
        }
    }

    match stack.pop() {
        Some((open, line)) => Err(ParseError::UnbalancedBlock {
            shader: shader.to_string(),
            delimiter: open,
            line,
        }),
        None => Ok(out),
    }
}

fn tokenize(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == '_' || c == '.' {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        match c {
            ';' | ',' | '=' => tokens.push(c.to_string()),
            '{' if chars.peek() == Some(&'}') => {
                chars.next();
                tokens.push("{}".to_string());
            }
            _ => {}
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

/// Source line referenced by a driver log entry.
///
/// Understands `0:12(5): error` (Mesa), `ERROR: 0:12: ...` (AMD, Intel)
/// and `0(12) : error` (NVIDIA).
fn log_line_number(entry: &str) -> Option<usize> {
    let entry = entry.trim_start();
    let entry = entry
        .strip_prefix("ERROR:")
        .or_else(|| entry.strip_prefix("WARNING:"))
        .unwrap_or(entry)
        .trim_start();

    // Source string index, then `:` (Mesa, AMD, Intel) or `(` (NVIDIA).
    let rest = entry.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == entry.len() {
        return None;
    }
    let rest = rest.strip_prefix(':').or_else(|| rest.strip_prefix('('))?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GAME_OF_LIFE: &str = r#"
        #version 130
        // Conway step
        uniform sampler2D inText;
        out vec4 outText;
        uniform float aliveThreshold = 0.5, unused;
        /* uniform sampler2D commented; */
        int cell(vec2 offset)
        {
            return texture(inText, offset).r > aliveThreshold ? 1 : 0;
        }
        void main()
        {
            outText = vec4(1.0);
        }
    "#;

    #[test]
    fn test_scan_ports_and_uniforms() {
        let shader = ShaderSource::new(GAME_OF_LIFE).unwrap();
        assert_eq!(shader.version(), Some(130));
        assert_eq!(shader.inputs(), &["inText".to_string()]);
        assert_eq!(shader.outputs(), &["outText".to_string()]);
        let names: Vec<_> = shader.uniforms().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["aliveThreshold", "unused"]);
        assert_eq!(shader.uniform("unused").unwrap().ty, UniformType::Float);
        assert!(!shader.requires_compatibility());
    }

    #[test]
    fn test_multiple_declarations_and_qualifiers() {
        let shader = ShaderSource::new(
            "#version 300 es\nprecision highp float;\nuniform highp sampler2D a, b;\n\
             layout(location = 0) out vec4 first;\nlayout(location = 1) out vec4 second;\n\
             uniform vec2 offsets[4];\nuniform Params { float gain; } params;\n\
             void main() { first = vec4(0.0); second = first; }\n",
        )
        .unwrap();
        assert_eq!(shader.profile(), Some("es"));
        assert_eq!(shader.inputs(), &["a".to_string(), "b".to_string()]);
        assert_eq!(shader.outputs(), &["first".to_string(), "second".to_string()]);
        assert_eq!(shader.uniforms().len(), 1);
        assert_eq!(shader.uniforms()[0].ty, UniformType::Vec2);
    }

    #[test]
    fn test_compatibility_mode() {
        let shader = ShaderSource::new(
            "uniform sampler2D tex;\nvoid main() { gl_FragColor = texture2D(tex, gl_TexCoord[0].st); }\n",
        )
        .unwrap();
        assert!(shader.requires_compatibility());
        assert_eq!(shader.outputs(), &[FRAG_COLOR_PORT.to_string()]);
        assert_eq!(shader.version(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ShaderSource::new("uniform sampler2D a; /* open"),
            Err(ParseError::UnterminatedComment { line: 1, .. })
        ));
        assert!(matches!(
            ShaderSource::new("void main() {\n"),
            Err(ParseError::UnbalancedBlock { delimiter: '{', .. })
        ));
        assert!(matches!(
            ShaderSource::new("#version three\n"),
            Err(ParseError::InvalidVersion { .. })
        ));
        assert!(matches!(
            ShaderSource::new("uniform samplerCube sky;\n"),
            Err(ParseError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_annotate_log() {
        let shader = ShaderSource::new("#version 130\nout vec4 c;\nvoid main() { c = vec3(1.0); }\n")
            .unwrap()
            .with_name("bad.glsl");
        let log = shader.annotate_log("0:3(15): error: value of type vec3 cannot be assigned");
        assert!(log.contains("bad.glsl:3: void main() { c = vec3(1.0); }"));

        let nvidia = shader.annotate_log("0(2) : error C0000: syntax error");
        assert!(nvidia.contains("bad.glsl:2: out vec4 c;"));
    }

    #[test]
    fn test_log_line_number() {
        assert_eq!(log_line_number("0:12(5): error: undeclared identifier"), Some(12));
        assert_eq!(log_line_number("ERROR: 0:7: 'foo' : undeclared identifier"), Some(7));
        assert_eq!(log_line_number("0(3) : error C0000: syntax error"), Some(3));
        assert_eq!(log_line_number("  0(40) : warning C7050: unused"), Some(40));
        assert_eq!(log_line_number("error C0000: syntax error"), None);
        assert_eq!(log_line_number("link failed: 0:3 in message body"), None);
        assert_eq!(log_line_number(""), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".glsl").tempfile().unwrap();
        file.write_all(GAME_OF_LIFE.as_bytes()).unwrap();

        let shader = ShaderSource::from_file(file.path()).unwrap();
        assert!(shader.name().ends_with(".glsl"));
        assert_eq!(shader.inputs().len(), 1);

        assert!(matches!(
            ShaderSource::from_file("/nonexistent/shader.glsl"),
            Err(ParseError::Io { .. })
        ));
    }
}
