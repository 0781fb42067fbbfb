//! Values derived from the context rather than (only) from the stream.

use std::sync::Arc;

use crate::construct::{Construct, ConstructRef, IntoConstruct};
use crate::context::{Context, Expr};
use crate::error::{CompileError, Result};
use crate::stream::Stream;
use crate::value::Value;

// ── Computed ─────────────────────────────────────────────────────────────────

/// Evaluates an expression; consumes nothing on parse, writes nothing on build.
#[derive(Debug, Clone)]
pub struct Computed {
    expr: Expr,
}

impl Computed {
    pub fn new(expr: impl Into<Expr>) -> Self {
        Self { expr: expr.into() }
    }
}

impl Construct for Computed {
    fn parse(&self, _stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        self.expr.eval(ctx)
    }

    fn build(&self, _value: &Value, _stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn build_value(
        &self,
        _given: Option<&Value>,
        _stream: &mut dyn Stream,
        ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        self.expr.eval(ctx).map(Some)
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        if self.expr.is_opaque() {
            return Err(CompileError::OpaqueExpression("Computed"));
        }
        Ok(Arc::new(self.clone()))
    }
}

// ── Rebuild ──────────────────────────────────────────────────────────────────

/// Parses like `subcon`; on build, ignores the supplied value and encodes
/// the expression's result instead (typically a length or count).
#[derive(Debug, Clone)]
pub struct Rebuild {
    subcon: ConstructRef,
    expr:   Expr,
}

impl Rebuild {
    pub fn new(subcon: impl IntoConstruct, expr: impl Into<Expr>) -> Self {
        Self { subcon: subcon.into_construct(), expr: expr.into() }
    }
}

impl Construct for Rebuild {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        self.subcon.parse(stream, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        self.subcon.build(value, stream, ctx)
    }

    fn build_value(
        &self,
        _given: Option<&Value>,
        _stream: &mut dyn Stream,
        ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        self.expr.eval(ctx).map(Some)
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.subcon.sizeof(ctx)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        if self.expr.is_opaque() {
            return Err(CompileError::OpaqueExpression("Rebuild"));
        }
        Ok(Arc::new(Rebuild { subcon: self.subcon.compile()?, expr: self.expr.clone() }))
    }
}

// ── Defaulted ────────────────────────────────────────────────────────────────

/// Builds `value` when the caller leaves the field out.
#[derive(Debug, Clone)]
pub struct Defaulted {
    subcon: ConstructRef,
    value:  Value,
}

impl Defaulted {
    pub fn new(subcon: impl IntoConstruct, value: impl Into<Value>) -> Self {
        Self { subcon: subcon.into_construct(), value: value.into() }
    }
}

impl Construct for Defaulted {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        self.subcon.parse(stream, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        self.subcon.build(value, stream, ctx)
    }

    fn build_value(
        &self,
        given: Option<&Value>,
        _stream: &mut dyn Stream,
        _ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        Ok(Some(given.cloned().unwrap_or_else(|| self.value.clone())))
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.subcon.sizeof(ctx)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(Defaulted { subcon: self.subcon.compile()?, value: self.value.clone() }))
    }
}

// ── Pass ─────────────────────────────────────────────────────────────────────

/// Does nothing; parses to `None`.
#[derive(Debug, Clone, Copy)]
pub struct Pass;

impl Construct for Pass {
    fn parse(&self, _stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<Value> {
        Ok(Value::None)
    }

    fn build(&self, _value: &Value, _stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn build_value(
        &self,
        given: Option<&Value>,
        _stream: &mut dyn Stream,
        _ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        Ok(Some(given.cloned().unwrap_or(Value::None)))
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Ok(0)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(Pass))
    }
}
