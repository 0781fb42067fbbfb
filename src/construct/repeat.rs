//! Homogeneous repetition.
//!
//! Every element is processed in its own iteration frame carrying the
//! element index; name lookups from inside an element fall through to the
//! level that holds the repetition.

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

use tracing::trace;

use crate::construct::{expected, undetermined, Construct, ConstructRef, IntoConstruct};
use crate::container::ListContainer;
use crate::context::{Context, Expr};
use crate::error::{CompileError, ConstructError, Result};
use crate::stream::{Stream, PREALLOC_CAP};
use crate::value::Value;

fn as_list<'v>(value: &'v Value) -> Result<&'v ListContainer> {
    value.as_list().ok_or_else(|| expected("a list", value))
}

fn build_items<'v>(
    subcon: &ConstructRef,
    items: impl Iterator<Item = &'v Value>,
    stream: &mut dyn Stream,
    ctx: &Context<'_>,
) -> Result<usize> {
    let mut written = 0usize;
    for (i, item) in items.enumerate() {
        let it = ctx.derive_iteration(i);
        written += subcon.build(item, stream, &it).map_err(|e| e.at_index(i))?;
    }
    Ok(written)
}

// ── Array ────────────────────────────────────────────────────────────────────

/// Exactly `count` elements; `count` may depend on earlier fields.
#[derive(Debug, Clone)]
pub struct Array {
    count:  Expr,
    subcon: ConstructRef,
}

impl Array {
    pub fn new(count: impl Into<Expr>, subcon: impl IntoConstruct) -> Self {
        Self { count: count.into(), subcon: subcon.into_construct() }
    }
}

impl Construct for Array {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let n = self.count.eval_usize(ctx)?;
        let mut items = ListContainer::with_capacity(n.min(PREALLOC_CAP));
        for i in 0..n {
            let it = ctx.derive_iteration(i);
            items.push(self.subcon.parse(stream, &it).map_err(|e| e.at_index(i))?);
        }
        Ok(Value::List(items))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let items = as_list(value)?;
        let n = self.count.eval_usize(ctx)?;
        if items.len() != n {
            return Err(ConstructError::RepeatCountMismatch { expected: n, actual: items.len() });
        }
        build_items(&self.subcon, items.iter(), stream, ctx)
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        let n = self.count.eval_usize(ctx).map_err(undetermined)?;
        n.checked_mul(self.subcon.sizeof(ctx)?)
            .ok_or_else(|| ConstructError::SizeUndetermined(format!("{n} elements overflow usize")))
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        if self.count.is_opaque() {
            return Err(CompileError::OpaqueExpression("Array"));
        }
        Ok(Arc::new(Array { count: self.count.clone(), subcon: self.subcon.compile()? }))
    }
}

// ── GreedyRange ──────────────────────────────────────────────────────────────

/// As many elements as parse successfully.
///
/// Parsing stops at the first element that fails and rewinds to where that
/// element started. A missing context value is a definition error and is
/// propagated instead.
#[derive(Debug, Clone)]
pub struct GreedyRange {
    subcon: ConstructRef,
}

impl GreedyRange {
    pub fn new(subcon: impl IntoConstruct) -> Self {
        Self { subcon: subcon.into_construct() }
    }
}

impl Construct for GreedyRange {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let mut items = ListContainer::new();
        loop {
            let i = items.len();
            let start = stream.tell()?;
            let it = ctx.derive_iteration(i);
            match self.subcon.parse(stream, &it) {
                Ok(v) => {
                    if stream.tell()? == start {
                        return Err(ConstructError::format("greedy element consumed no bytes").at_index(i));
                    }
                    items.push(v);
                }
                Err(e) if matches!(e.root_cause(), ConstructError::MissingContextValue(_)) => {
                    return Err(e.at_index(i));
                }
                Err(e) => {
                    trace!(count = i, error = %e, "greedy repetition stopped");
                    stream.seek_to(SeekFrom::Start(start))?;
                    break;
                }
            }
        }
        Ok(Value::List(items))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        build_items(&self.subcon, as_list(value)?.iter(), stream, ctx)
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Err(ConstructError::SizeUndetermined("greedy repetition".into()))
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(GreedyRange { subcon: self.subcon.compile()? }))
    }
}

// ── RepeatUntil ──────────────────────────────────────────────────────────────

type Predicate = dyn for<'v, 'c> Fn(&'v Value, &'v ListContainer, &'v Context<'c>) -> bool + Send + Sync;

/// Elements up to and including the first one the predicate accepts. The
/// predicate sees the element, the elements so far and the iteration context.
#[derive(Clone)]
pub struct RepeatUntil {
    predicate: Arc<Predicate>,
    subcon:    ConstructRef,
}

impl RepeatUntil {
    pub fn new<F>(predicate: F, subcon: impl IntoConstruct) -> Self
    where
        F: Fn(&Value, &ListContainer, &Context<'_>) -> bool + Send + Sync + 'static,
    {
        Self { predicate: Arc::new(predicate), subcon: subcon.into_construct() }
    }
}

impl fmt::Debug for RepeatUntil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatUntil").field("subcon", &self.subcon).finish_non_exhaustive()
    }
}

impl Construct for RepeatUntil {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let mut items = ListContainer::new();
        loop {
            let i = items.len();
            let it = ctx.derive_iteration(i);
            let v = self.subcon.parse(stream, &it).map_err(|e| e.at_index(i))?;
            let done = (self.predicate)(&v, &items, &it);
            items.push(v);
            if done {
                return Ok(Value::List(items));
            }
        }
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let items = as_list(value)?;
        let mut so_far = ListContainer::new();
        let mut written = 0usize;
        for (i, item) in items.iter().enumerate() {
            let it = ctx.derive_iteration(i);
            written += self.subcon.build(item, stream, &it).map_err(|e| e.at_index(i))?;
            if (self.predicate)(item, &so_far, &it) {
                return Ok(written);
            }
            so_far.push(item.clone());
        }
        Err(ConstructError::format("no element satisfied the terminating predicate"))
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Err(ConstructError::SizeUndetermined("repeat-until".into()))
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Err(CompileError::OpaqueExpression("RepeatUntil"))
    }
}

// ── PrefixedArray ────────────────────────────────────────────────────────────

/// Element count stored in front of the elements.
#[derive(Debug, Clone)]
pub struct PrefixedArray {
    count_field: ConstructRef,
    subcon:      ConstructRef,
}

impl PrefixedArray {
    pub fn new(count_field: impl IntoConstruct, subcon: impl IntoConstruct) -> Self {
        Self { count_field: count_field.into_construct(), subcon: subcon.into_construct() }
    }
}

impl Construct for PrefixedArray {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let count = self.count_field.parse(stream, ctx)?;
        let n = count
            .as_usize()
            .ok_or_else(|| ConstructError::format(format!("invalid element count {count:?}")))?;
        let mut items = ListContainer::with_capacity(n.min(PREALLOC_CAP));
        for i in 0..n {
            let it = ctx.derive_iteration(i);
            items.push(self.subcon.parse(stream, &it).map_err(|e| e.at_index(i))?);
        }
        Ok(Value::List(items))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let items = as_list(value)?;
        let mut written = self.count_field.build(&Value::from(items.len()), stream, ctx)?;
        written += build_items(&self.subcon, items.iter(), stream, ctx)?;
        Ok(written)
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Err(ConstructError::SizeUndetermined("count-prefixed array".into()))
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(PrefixedArray {
            count_field: self.count_field.compile()?,
            subcon:      self.subcon.compile()?,
        }))
    }
}
