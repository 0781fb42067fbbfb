//! Error taxonomy shared by every construct.
//!
//! Failures unwind through the construct tree and pick up one
//! [`PathSegment`] per level (field name or repetition index), so the error
//! that reaches the caller names the exact site of the failure:
//!
//! ```text
//! stream truncated: requested 4 bytes, 1 available (at entries -> [2] -> length)
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

use crate::codec::CodecError;

// ── Path annotation ──────────────────────────────────────────────────────────

/// One step of the nesting path from the root construct to a failure site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => f.write_str(name),
            PathSegment::Index(i)    => write!(f, "[{i}]"),
        }
    }
}

fn join_path(path: &[PathSegment]) -> String {
    path.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" -> ")
}

// ── ConstructError ───────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ConstructError {
    /// Not enough bytes left in the stream to satisfy a read.
    #[error("stream truncated: requested {requested} bytes, {available} available")]
    StreamTruncated { requested: usize, available: usize },
    /// `sizeof` was asked of a construct whose size depends on the value.
    #[error("size cannot be determined: {0}")]
    SizeUndetermined(String),
    /// A contextual expression referenced a name that is not bound (yet).
    #[error("missing context value `{0}`")]
    MissingContextValue(String),
    #[error("repetition count mismatch: expected {expected} elements, got {actual}")]
    RepeatCountMismatch { expected: usize, actual: usize },
    #[error("no case matches discriminant {0}")]
    NoMatchingCase(String),
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("container is empty")]
    EmptyContainer,
    /// A context was constructed with zero or several processing modes set.
    #[error("invalid context mode: exactly one of parsing/building/sizing must be set")]
    InvalidMode,
    /// Primitive-level decode/encode failure (bad encoding, out-of-range value, mismatch).
    #[error("format violation: {0}")]
    FormatViolation(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Any of the above, annotated with the path it unwound through.
    #[error("{source} (at {})", join_path(.path))]
    Annotated {
        path:   Vec<PathSegment>,
        source: Box<ConstructError>,
    },
}

impl ConstructError {
    /// Prepend `segment` to the nesting path of this error.
    pub fn at(self, segment: PathSegment) -> Self {
        match self {
            ConstructError::Annotated { mut path, source } => {
                path.insert(0, segment);
                ConstructError::Annotated { path, source }
            }
            other => ConstructError::Annotated {
                path:   vec![segment],
                source: Box::new(other),
            },
        }
    }

    pub fn at_field(self, name: &str) -> Self {
        self.at(PathSegment::Field(name.to_owned()))
    }

    pub fn at_index(self, index: usize) -> Self {
        self.at(PathSegment::Index(index))
    }

    /// The underlying failure with every path annotation stripped.
    pub fn root_cause(&self) -> &ConstructError {
        match self {
            ConstructError::Annotated { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Nesting path from the root construct to the failure site (empty when
    /// the failure happened at the top level).
    pub fn path(&self) -> &[PathSegment] {
        match self {
            ConstructError::Annotated { path, .. } => path,
            _ => &[],
        }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        ConstructError::FormatViolation(msg.into())
    }
}

impl From<CodecError> for ConstructError {
    fn from(e: CodecError) -> Self {
        ConstructError::FormatViolation(e.to_string())
    }
}

// ── CompileError ─────────────────────────────────────────────────────────────

/// Reason a construct refused compilation. Never surfaced by the facade:
/// see [`crate::compile::compile_or_interpret`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("{0} cannot be compiled")]
    Unsupported(&'static str),
    #[error("{0} embeds an opaque expression")]
    OpaqueExpression(&'static str),
    #[error("{0} depends on the stream position")]
    PositionDependent(&'static str),
}

pub type Result<T, E = ConstructError> = std::result::Result<T, E>;
