//! Stream bookkeeping for flattening nested pipelines.
//!
//! Every port of every element, at every nesting level, owns a stream. A
//! stream is either produced by a filter output, fed by an external input of
//! the top-level pipeline, or linked to another stream. Resolving a stream
//! follows links until it reaches a producer or an external input.

use crate::core::error::StreamError;
use log::trace;
use std::collections::HashSet;

/// Identifier of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(usize);

impl StreamId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Where a stream takes its texture from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    /// Output `output` of filter `filter` (flattened index).
    Produced { filter: usize, output: usize },
    /// Input `input` of the top-level pipeline.
    External { input: usize },
    /// Same texture as another stream.
    Link(StreamId),
    /// Not yet known.
    Unlinked,
}

/// End of a stream chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedStream {
    Produced { filter: usize, output: usize },
    External { input: usize },
}

#[derive(Debug, Clone)]
struct Stream {
    label: String,
    source: StreamSource,
}

/// Arena of streams.
#[derive(Debug, Clone, Default)]
pub struct StreamManager {
    streams: Vec<Stream>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an unlinked stream. `label` is used in error messages.
    pub fn declare(&mut self, label: impl Into<String>) -> StreamId {
        self.streams.push(Stream {
            label: label.into(),
            source: StreamSource::Unlinked,
        });
        StreamId(self.streams.len() - 1)
    }

    /// Declare a stream produced by a filter output.
    pub fn produced(&mut self, label: impl Into<String>, filter: usize, output: usize) -> StreamId {
        let id = self.declare(label);
        self.streams[id.0].source = StreamSource::Produced { filter, output };
        id
    }

    /// Declare a stream fed by a top-level input.
    pub fn external(&mut self, label: impl Into<String>, input: usize) -> StreamId {
        let id = self.declare(label);
        self.streams[id.0].source = StreamSource::External { input };
        id
    }

    /// Make `stream` carry the texture of `target`.
    pub fn link(&mut self, stream: StreamId, target: StreamId) -> Result<(), StreamError> {
        self.check(target)?;
        self.set_source(stream, StreamSource::Link(target))
    }

    pub fn set_source(&mut self, stream: StreamId, source: StreamSource) -> Result<(), StreamError> {
        self.check(stream)?;
        self.streams[stream.0].source = source;
        Ok(())
    }

    pub fn source(&self, stream: StreamId) -> Result<StreamSource, StreamError> {
        self.check(stream)?;
        Ok(self.streams[stream.0].source)
    }

    pub fn label(&self, stream: StreamId) -> Result<&str, StreamError> {
        self.check(stream)?;
        Ok(&self.streams[stream.0].label)
    }

    fn check(&self, stream: StreamId) -> Result<(), StreamError> {
        if stream.0 < self.streams.len() {
            Ok(())
        } else {
            Err(StreamError::UnknownStream(stream.0))
        }
    }

    /// Follow links from `stream` to its producer or external input.
    pub fn resolve(&self, stream: StreamId) -> Result<ResolvedStream, StreamError> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut current = stream;

        loop {
            self.check(current)?;
            let entry = &self.streams[current.0];
            chain.push(entry.label.clone());
            if !visited.insert(current) {
                return Err(StreamError::Cyclic { chain });
            }

            match entry.source {
                StreamSource::Produced { filter, output } => {
                    trace!("Resolved {} to filter #{} output #{}", chain.join(" <- "), filter, output);
                    return Ok(ResolvedStream::Produced { filter, output });
                }
                StreamSource::External { input } => {
                    trace!("Resolved {} to input #{}", chain.join(" <- "), input);
                    return Ok(ResolvedStream::External { input });
                }
                StreamSource::Link(next) => current = next,
                StreamSource::Unlinked => {
                    return Err(StreamError::Unresolved {
                        stream: self.streams[stream.0].label.clone(),
                    })
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
