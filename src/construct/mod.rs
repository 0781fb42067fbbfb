//! The construct contract and its operators.
//!
//! A [`Construct`] is one declarative layout unit. The same object parses
//! bytes into a [`Value`], builds a value back into bytes and, when the layout
//! allows it, reports the encoded size without touching a stream. Composite
//! constructs hold their children as [`ConstructRef`]s and thread a
//! [`Context`] plus the active stream down the tree.
//!
//! The facade methods (`parse_bytes`, `build_bytes`, `sizeof_static`, ...)
//! create the root context; operator implementations only ever call the
//! contract methods on their children.

pub mod adapters;
pub mod computed;
pub mod pointer;
pub mod primitives;
pub mod repeat;
pub mod structs;
pub mod switch;

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use tracing::trace;

use crate::container::Container;
use crate::context::{Context, Mode};
use crate::error::{CompileError, ConstructError, Result};
use crate::stream::Stream;
use crate::value::Value;

pub type ConstructRef = Arc<dyn Construct>;

pub trait Construct: fmt::Debug + Send + Sync {
    /// Consume bytes from `stream` and produce a value.
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value>;

    /// Serialize `value` into `stream`, returning the number of bytes written.
    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize>;

    /// Encoded size, when it does not depend on the value.
    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize>;

    /// Value this construct contributes to its enclosing record during a
    /// build. `given` is the caller-supplied entry, if any. Constructs that
    /// compute their own value (constants, checksums, rebuilt lengths)
    /// override this; `None` means no value is available.
    fn build_value(
        &self,
        given: Option<&Value>,
        _stream: &mut dyn Stream,
        _ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        Ok(given.cloned())
    }

    /// Behavior-equivalent fast path, if this construct has one.
    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Err(CompileError::Unsupported(std::any::type_name::<Self>()))
    }

    // ── Facade ───────────────────────────────────────────────────────────────

    fn parse_bytes(&self, data: &[u8]) -> Result<Value> {
        self.parse_with(data, Container::new())
    }

    /// Parse with `params` as the parameter store of the root context.
    fn parse_with(&self, data: &[u8], params: Container) -> Result<Value> {
        self.parse_stream(&mut Cursor::new(data.to_vec()), params)
    }

    fn parse_stream(&self, stream: &mut dyn Stream, params: Container) -> Result<Value> {
        trace!(construct = ?self, "parse");
        let ctx = Context::new_root(params, Mode::Parsing);
        self.parse(stream, &ctx)
    }

    fn build_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        self.build_with(value, Container::new())
    }

    fn build_with(&self, value: &Value, params: Container) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.build_stream(value, &mut out, params)?;
        Ok(out.into_inner())
    }

    fn build_stream(&self, value: &Value, stream: &mut dyn Stream, params: Container) -> Result<usize> {
        trace!(construct = ?self, "build");
        let ctx = Context::new_root(params, Mode::Building);
        self.build(value, stream, &ctx)
    }

    fn sizeof_with(&self, params: Container) -> Result<usize> {
        let ctx = Context::new_root(params, Mode::Sizing);
        self.sizeof(&ctx)
    }

    fn sizeof_static(&self) -> Result<usize> {
        self.sizeof_with(Container::new())
    }
}

/// Anything that can be stored as a child construct.
pub trait IntoConstruct {
    fn into_construct(self) -> ConstructRef;
}

impl<T: Construct + 'static> IntoConstruct for T {
    fn into_construct(self) -> ConstructRef {
        Arc::new(self)
    }
}

impl IntoConstruct for ConstructRef {
    fn into_construct(self) -> ConstructRef {
        self
    }
}

/// A size expression that reads an unbound name makes the size unknowable,
/// not the definition wrong.
pub(crate) fn undetermined(e: ConstructError) -> ConstructError {
    match e {
        ConstructError::MissingContextValue(name) => {
            ConstructError::SizeUndetermined(format!("depends on `{name}`"))
        }
        other => other,
    }
}

/// Type mismatch between a construct and the value handed to its build.
pub(crate) fn expected(what: &str, got: &Value) -> ConstructError {
    ConstructError::format(format!("expected {what}, got {}", got.type_name()))
}
