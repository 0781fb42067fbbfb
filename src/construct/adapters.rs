//! Constructs that transform the bytes their child sees: length-prefixed
//! substreams, compression and integrity checks.

use std::io::Cursor;
use std::sync::Arc;

use tracing::trace;

use crate::codec::{get_codec, CodecId};
use crate::construct::{expected, Construct, ConstructRef, IntoConstruct};
use crate::context::{Context, Expr};
use crate::error::{CompileError, ConstructError, Result};
use crate::stream::Stream;
use crate::value::Value;

/// Build `value` through `subcon` into a fresh in-memory buffer.
fn build_detached(subcon: &ConstructRef, value: &Value, ctx: &Context<'_>) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    subcon.build(value, &mut buf, ctx)?;
    Ok(buf.into_inner())
}

// ── Prefixed ─────────────────────────────────────────────────────────────────

/// Byte length stored in front of the data. The child only ever sees its
/// own bytes, so greedy children stop at the end of the prefixed region.
#[derive(Debug, Clone)]
pub struct Prefixed {
    length_field: ConstructRef,
    subcon:       ConstructRef,
}

impl Prefixed {
    pub fn new(length_field: impl IntoConstruct, subcon: impl IntoConstruct) -> Self {
        Self { length_field: length_field.into_construct(), subcon: subcon.into_construct() }
    }
}

impl Construct for Prefixed {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let len = self.length_field.parse(stream, ctx)?;
        let n = len
            .as_usize()
            .ok_or_else(|| ConstructError::format(format!("invalid length prefix {len:?}")))?;
        let data = stream.read_exact_bytes(n)?;
        self.subcon.parse(&mut Cursor::new(data), ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let data = build_detached(&self.subcon, value, ctx)?;
        let written = self.length_field.build(&Value::from(data.len()), stream, ctx)?;
        Ok(written + stream.write_all_bytes(&data)?)
    }

    /// The region length is whatever the stored prefix says, so only the
    /// prefix itself has a fixed size.
    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Err(ConstructError::SizeUndetermined("length-prefixed data".into()))
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(Prefixed {
            length_field: self.length_field.compile()?,
            subcon:       self.subcon.compile()?,
        }))
    }
}

// ── Compressed ───────────────────────────────────────────────────────────────

/// Compresses everything `subcon` builds. Consumes the rest of the stream
/// on parse, so it is normally wrapped in [`Prefixed`].
#[derive(Debug, Clone)]
pub struct Compressed {
    subcon: ConstructRef,
    codec:  CodecId,
    level:  i32,
}

impl Compressed {
    pub fn new(subcon: impl IntoConstruct, codec: CodecId) -> Self {
        Self { subcon: subcon.into_construct(), codec, level: codec.default_level() }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }
}

impl Construct for Compressed {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let packed = stream.read_remaining()?;
        let raw = get_codec(self.codec).decompress(&packed).map_err(|e| {
            ConstructError::format(format!("{} bytes of compressed data: {e}", packed.len()))
        })?;
        trace!(codec = self.codec.name(), packed = packed.len(), raw = raw.len(), "decompressed");
        self.subcon.parse(&mut Cursor::new(raw), ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let raw = build_detached(&self.subcon, value, ctx)?;
        let packed = get_codec(self.codec).compress(&raw, self.level)?;
        stream.write_all_bytes(&packed)
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Err(ConstructError::SizeUndetermined(format!("{} compressed data", self.codec.name())))
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(Compressed { subcon: self.subcon.compile()?, codec: self.codec, level: self.level }))
    }
}

// ── Checksum ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// CRC-32 (IEEE), as an integer.
    Crc32,
    /// BLAKE3, as 32 raw bytes.
    Blake3,
}

impl ChecksumKind {
    pub fn digest(self, data: &[u8]) -> Value {
        match self {
            ChecksumKind::Crc32 => {
                let mut h = crc32fast::Hasher::new();
                h.update(data);
                Value::from(h.finalize())
            }
            ChecksumKind::Blake3 => {
                let hash: [u8; 32] = blake3::hash(data).into();
                Value::from(hash.to_vec())
            }
        }
    }
}

/// Digest of the bytes selected by `data`, verified on parse and computed on
/// build (any supplied value is ignored).
#[derive(Debug, Clone)]
pub struct Checksum {
    field: ConstructRef,
    kind:  ChecksumKind,
    data:  Expr,
}

impl Checksum {
    pub fn new(field: impl IntoConstruct, kind: ChecksumKind, data: Expr) -> Self {
        Self { field: field.into_construct(), kind, data }
    }

    fn expected_digest(&self, ctx: &Context<'_>) -> Result<Value> {
        let data = self.data.eval(ctx)?;
        let bytes = data.as_bytes().ok_or_else(|| expected("bytes to checksum", &data))?;
        Ok(self.kind.digest(bytes))
    }
}

impl Construct for Checksum {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let stored = self.field.parse(stream, ctx)?;
        let computed = self.expected_digest(ctx)?;
        if stored != computed {
            return Err(ConstructError::format(format!(
                "{:?} checksum mismatch: stored {stored:?}, computed {computed:?}",
                self.kind
            )));
        }
        Ok(stored)
    }

    fn build(&self, _value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let digest = self.expected_digest(ctx)?;
        self.field.build(&digest, stream, ctx)
    }

    fn build_value(
        &self,
        _given: Option<&Value>,
        _stream: &mut dyn Stream,
        ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        self.expected_digest(ctx).map(Some)
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.field.sizeof(ctx)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        if self.data.is_opaque() {
            return Err(CompileError::OpaqueExpression("Checksum"));
        }
        Ok(Arc::new(Checksum { field: self.field.compile()?, kind: self.kind, data: self.data.clone() }))
    }
}
