//! Loaded-source descriptors exchanged with the source graph.

use crate::id::SourceReference;
use crate::protocol::Position;
use serde::{Deserialize, Serialize};

/// A source known to the adapter: either a runtime (compiled) script or an
/// authored file referenced by a source map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub source_reference: SourceReference,
    pub url: String,
}

impl Source {
    pub fn new(source_reference: SourceReference, url: impl Into<String>) -> Self {
        Self {
            source_reference,
            url: url.into(),
        }
    }
}

/// An authored source as listed by a compiled source's source map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredSource {
    pub source: Source,
    /// Last position of the authored file, used to close a range.
    pub end: Position,
}

impl AuthoredSource {
    pub fn new(source: Source, end: Position) -> Self {
        Self { source, end }
    }

    pub fn url(&self) -> &str {
        &self.source.url
    }

    /// First position of the authored file.
    pub fn start(&self) -> Position {
        Position::default()
    }
}
