//! Out-of-line data and stream position inspection.

use std::io::SeekFrom;

use tracing::trace;

use crate::construct::{Construct, ConstructRef, IntoConstruct};
use crate::context::{Context, Expr};
use crate::error::{CompileError, Result};
use crate::stream::{PositionGuard, Stream};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the start of the stream; a negative offset counts from the end.
    Absolute,
    /// From the position the pointer is reached at.
    Relative,
}

/// Processes `subcon` at another offset, then returns to where it started.
/// Nothing is consumed or counted at the pointer's own position.
///
/// The original position is restored on every exit path. When the inner
/// construct fails, its error is returned unchanged even if the restore
/// itself fails (the restore failure is logged). When the inner construct
/// succeeds, a failing restore is the error.
#[derive(Debug, Clone)]
pub struct Pointer {
    offset: Expr,
    subcon: ConstructRef,
    whence: Whence,
}

impl Pointer {
    pub fn new(offset: impl Into<Expr>, subcon: impl IntoConstruct) -> Self {
        Self { offset: offset.into(), subcon: subcon.into_construct(), whence: Whence::Absolute }
    }

    pub fn relative(offset: impl Into<Expr>, subcon: impl IntoConstruct) -> Self {
        Self { offset: offset.into(), subcon: subcon.into_construct(), whence: Whence::Relative }
    }

    fn target(&self, ctx: &Context<'_>) -> Result<SeekFrom> {
        let offset = self.offset.eval_i64(ctx)?;
        Ok(match self.whence {
            Whence::Absolute if offset >= 0 => SeekFrom::Start(offset as u64),
            Whence::Absolute => SeekFrom::End(offset),
            Whence::Relative => SeekFrom::Current(offset),
        })
    }

    /// Seek, run `op`, seek back.
    fn detour<T>(
        &self,
        stream: &mut dyn Stream,
        ctx: &Context<'_>,
        op: impl FnOnce(&mut dyn Stream) -> Result<T>,
    ) -> Result<T> {
        let target = self.target(ctx)?;
        let mut guard = PositionGuard::new(stream)?;
        trace!(from = guard.origin(), ?target, "pointer seek");
        let result = guard.seek_to(target).and_then(|_| op(&mut *guard));
        match result {
            Ok(v) => {
                guard.restore()?;
                Ok(v)
            }
            // guard restores on drop and logs if that fails
            Err(e) => Err(e),
        }
    }
}

impl Construct for Pointer {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        self.detour(stream, ctx, |s| self.subcon.parse(s, ctx))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        self.detour(stream, ctx, |s| self.subcon.build(value, s, ctx))?;
        Ok(0)
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Err(CompileError::PositionDependent("Pointer"))
    }
}

// ── Tell ─────────────────────────────────────────────────────────────────────

/// Current stream position, consuming and writing nothing.
#[derive(Debug, Clone, Copy)]
pub struct Tell;

impl Construct for Tell {
    fn parse(&self, stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<Value> {
        Ok(Value::from(stream.tell()?))
    }

    fn build(&self, _value: &Value, _stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn build_value(
        &self,
        _given: Option<&Value>,
        stream: &mut dyn Stream,
        _ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        Ok(Some(Value::from(stream.tell()?)))
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Err(CompileError::PositionDependent("Tell"))
    }
}
