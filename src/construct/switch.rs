//! Value-dependent branch selection.

use std::sync::Arc;

use crate::construct::computed::Pass;
use crate::construct::{undetermined, Construct, ConstructRef, IntoConstruct};
use crate::context::{Context, Expr};
use crate::error::{CompileError, ConstructError, Result};
use crate::stream::Stream;
use crate::value::Value;

// ── Switch ───────────────────────────────────────────────────────────────────

/// Picks the case whose key equals the evaluated discriminant, falling back
/// to the default case when one is set.
#[derive(Debug, Clone)]
pub struct Switch {
    key:     Expr,
    cases:   Vec<(Value, ConstructRef)>,
    default: Option<ConstructRef>,
}

impl Switch {
    pub fn new(key: impl Into<Expr>) -> Self {
        Self { key: key.into(), cases: Vec::new(), default: None }
    }

    pub fn case(mut self, key: impl Into<Value>, con: impl IntoConstruct) -> Self {
        self.cases.push((key.into(), con.into_construct()));
        self
    }

    pub fn default(mut self, con: impl IntoConstruct) -> Self {
        self.default = Some(con.into_construct());
        self
    }

    fn select(&self, ctx: &Context<'_>) -> Result<&ConstructRef> {
        let key = self.key.eval(ctx)?;
        self.cases
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, con)| con)
            .or(self.default.as_ref())
            .ok_or_else(|| ConstructError::NoMatchingCase(format!("{key:?}")))
    }
}

impl Construct for Switch {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        self.select(ctx)?.parse(stream, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        self.select(ctx)?.build(value, stream, ctx)
    }

    fn build_value(
        &self,
        given: Option<&Value>,
        stream: &mut dyn Stream,
        ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        match self.select(ctx) {
            Ok(con) => con.build_value(given, stream, ctx),
            Err(_) => Ok(given.cloned()),
        }
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.select(ctx).map_err(undetermined)?.sizeof(ctx)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        if self.key.is_opaque() {
            return Err(CompileError::OpaqueExpression("Switch"));
        }
        let cases = self
            .cases
            .iter()
            .map(|(k, con)| Ok((k.clone(), con.compile()?)))
            .collect::<Result<Vec<_>, CompileError>>()?;
        let default = self.default.as_ref().map(|d| d.compile()).transpose()?;
        Ok(Arc::new(Switch { key: self.key.clone(), cases, default }))
    }
}

// ── IfThenElse ───────────────────────────────────────────────────────────────

/// Two-way branch on the truthiness of a condition.
#[derive(Debug, Clone)]
pub struct IfThenElse {
    cond:      Expr,
    then_con:  ConstructRef,
    else_con:  ConstructRef,
}

impl IfThenElse {
    pub fn new(cond: Expr, then_con: impl IntoConstruct, else_con: impl IntoConstruct) -> Self {
        Self { cond, then_con: then_con.into_construct(), else_con: else_con.into_construct() }
    }

    /// `then_con` when the condition holds, nothing otherwise.
    pub fn when(cond: Expr, then_con: impl IntoConstruct) -> Self {
        Self::new(cond, then_con, Pass)
    }

    fn select(&self, ctx: &Context<'_>) -> Result<&ConstructRef> {
        Ok(if self.cond.eval(ctx)?.is_truthy() { &self.then_con } else { &self.else_con })
    }
}

impl Construct for IfThenElse {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        self.select(ctx)?.parse(stream, ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        self.select(ctx)?.build(value, stream, ctx)
    }

    fn build_value(
        &self,
        given: Option<&Value>,
        stream: &mut dyn Stream,
        ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        self.select(ctx)?.build_value(given, stream, ctx)
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.select(ctx).map_err(undetermined)?.sizeof(ctx)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        if self.cond.is_opaque() {
            return Err(CompileError::OpaqueExpression("IfThenElse"));
        }
        Ok(Arc::new(IfThenElse {
            cond:     self.cond.clone(),
            then_con: self.then_con.compile()?,
            else_con: self.else_con.compile()?,
        }))
    }
}
