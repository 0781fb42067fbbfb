//! Evaluation environment threaded through one parse, build or sizeof call.
//!
//! # Ownership
//! Every [`Context`] is owned by the construct invocation that created it and
//! lives on that invocation's stack frame. `parent` and `root` are plain
//! borrows of enclosing frames, so a tree can never outlive the call that
//! built it. The parameter store is the one piece of state shared by the
//! whole tree: it is reference-counted and handed down, never copied.
//!
//! # Lookup
//! Named lookups resolve against the fields bound at the current level.
//! Repetition creates one *iteration* frame per element; iteration frames only
//! carry the index, fall through to the enclosing level for name lookups and
//! are skipped by [`Context::parent`], so an array element sees exactly the
//! names of the struct that contains the array.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::construct::structs::Field;
use crate::construct::ConstructRef;
use crate::container::Container;
use crate::error::{ConstructError, Result};
use crate::value::Value;

/// Keys a caller may not smuggle into a child through `derive_child`.
const RESERVED_KEYS: [&str; 4] = ["_parsing", "_building", "_sizing", "_index"];

// ── Mode ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Parsing,
    Building,
    Sizing,
}

impl Mode {
    /// Exactly one flag must be set.
    pub fn from_flags(parsing: bool, building: bool, sizing: bool) -> Result<Self> {
        match (parsing, building, sizing) {
            (true, false, false) => Ok(Mode::Parsing),
            (false, true, false) => Ok(Mode::Building),
            (false, false, true) => Ok(Mode::Sizing),
            _ => Err(ConstructError::InvalidMode),
        }
    }
}

// ── Context ──────────────────────────────────────────────────────────────────

pub struct Context<'a> {
    parent:    Option<&'a Context<'a>>,
    root:      Option<&'a Context<'a>>,
    params:    Rc<RefCell<Container>>,
    mode:      Mode,
    index:     Option<usize>,
    subcons:   &'a [Field],
    fields:    Container,
    iteration: bool,
}

impl Context<'static> {
    pub fn new_root(params: Container, mode: Mode) -> Self {
        Self {
            parent:    None,
            root:      None,
            params:    Rc::new(RefCell::new(params)),
            mode,
            index:     None,
            subcons:   &[],
            fields:    Container::new(),
            iteration: false,
        }
    }

    /// Root constructor taking the three mode flags separately.
    pub fn from_flags(params: Container, parsing: bool, building: bool, sizing: bool) -> Result<Self> {
        Ok(Self::new_root(params, Mode::from_flags(parsing, building, sizing)?))
    }
}

impl<'a> Context<'a> {
    /// Child one nesting level down. Mode, repetition index and parameter
    /// store are inherited; reserved mode/index keys in `extra` are dropped.
    pub fn derive_child(&self, extra: Container) -> Context<'_> {
        let mut fields = extra;
        for key in RESERVED_KEYS {
            let _ = fields.remove(key);
        }
        Context {
            parent:    Some(self),
            root:      Some(self.root()),
            params:    Rc::clone(&self.params),
            mode:      self.mode,
            index:     self.index,
            subcons:   &[],
            fields,
            iteration: false,
        }
    }

    /// Per-element frame used by repetition.
    pub(crate) fn derive_iteration(&self, index: usize) -> Context<'_> {
        Context {
            parent:    Some(self),
            root:      Some(self.root()),
            params:    Rc::clone(&self.params),
            mode:      self.mode,
            index:     Some(index),
            subcons:   &[],
            fields:    Container::new(),
            iteration: true,
        }
    }

    pub(crate) fn with_subcons(mut self, subcons: &'a [Field]) -> Self {
        self.subcons = subcons;
        self
    }

    /// Record `value` under `name` for later siblings at this level.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.set(name, value);
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        if let Some(v) = self.fields.get_opt(name) {
            return Ok(v);
        }
        match self.parent {
            Some(p) if self.iteration => p.get(name),
            _ => Err(ConstructError::MissingContextValue(name.to_owned())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// Resolve a dotted path such as `header.length` or `entries.2.kind`.
    pub fn lookup_path(&self, path: &str) -> Result<Value> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self.get(first)?.clone();
        for seg in segments {
            let next = match &current {
                Value::Container(c) => c.get_opt(seg).cloned(),
                Value::Shared(s) => s.read().get_opt(seg).cloned(),
                Value::List(l) => seg.parse::<usize>().ok().and_then(|i| l.get(i).cloned()),
                _ => None,
            };
            current = next.ok_or_else(|| ConstructError::MissingContextValue(path.to_owned()))?;
        }
        Ok(current)
    }

    /// Child context over the nested record bound under `name`, if any.
    pub fn lookup_child(&self, name: &str) -> Option<Context<'_>> {
        match self.get(name).ok()? {
            Value::Container(c) => Some(self.derive_child(c.clone())),
            Value::Shared(s) => Some(self.derive_child(s.snapshot())),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Container {
        &self.fields
    }

    pub fn into_fields(self) -> Container {
        self.fields
    }

    /// Enclosing level, skipping iteration frames.
    pub fn parent(&self) -> Option<&Context<'a>> {
        let mut p = self.parent?;
        if self.iteration {
            return p.parent();
        }
        while p.iteration {
            p = p.parent?;
        }
        Some(p)
    }

    pub fn root(&self) -> &Context<'a> {
        match self.root {
            Some(r) => r,
            None => self,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn params(&self) -> Ref<'_, Container> {
        self.params.borrow()
    }

    /// Mutations are visible from every context of the tree.
    pub fn params_mut(&self) -> RefMut<'_, Container> {
        self.params.borrow_mut()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_parsing(&self) -> bool {
        self.mode == Mode::Parsing
    }

    pub fn is_building(&self) -> bool {
        self.mode == Mode::Building
    }

    pub fn is_sizing(&self) -> bool {
        self.mode == Mode::Sizing
    }

    /// Current repetition index, `None` outside any repetition.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Sub-constructs of the struct currently being processed.
    pub fn subcons(&self) -> &[Field] {
        self.subcons
    }

    pub fn subcon(&self, name: &str) -> Option<&ConstructRef> {
        self.subcons
            .iter()
            .find(|f| f.name() == Some(name))
            .map(Field::construct)
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("mode", &self.mode)
            .field("index", &self.index)
            .field("fields", &self.fields)
            .field("is_root", &self.is_root())
            .field("iteration", &self.iteration)
            .finish()
    }
}

// ── Contextual expressions ───────────────────────────────────────────────────

type ExprFn = dyn for<'r, 'c> Fn(&'r Context<'c>) -> Result<Value> + Send + Sync;

#[derive(Clone)]
enum ExprKind {
    Const(Value),
    This(String),
    Parent(String),
    Root(String),
    Param(String),
    Index,
    LenOf(String),
    Func(Arc<ExprFn>),
}

/// Deferred computation evaluated against the current [`Context`].
///
/// The declarative forms (`this`, `parent`, `param`, ...) are transparent to
/// the compiler; [`Expr::new`] wraps an arbitrary closure and makes every
/// construct that embeds it refuse compilation.
#[derive(Clone)]
pub struct Expr(ExprKind);

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr(ExprKind::Const(value.into()))
    }

    /// Field bound at the current level; dotted paths descend into records.
    pub fn this(path: &str) -> Self {
        Expr(ExprKind::This(path.to_owned()))
    }

    pub fn parent(path: &str) -> Self {
        Expr(ExprKind::Parent(path.to_owned()))
    }

    pub fn root(path: &str) -> Self {
        Expr(ExprKind::Root(path.to_owned()))
    }

    /// Entry of the caller-supplied parameter store.
    pub fn param(name: &str) -> Self {
        Expr(ExprKind::Param(name.to_owned()))
    }

    /// Index of the innermost enclosing repetition element, 0 outside any
    /// repetition.
    pub fn index() -> Self {
        Expr(ExprKind::Index)
    }

    /// Length of a sized value bound at the current level.
    pub fn len_of(path: &str) -> Self {
        Expr(ExprKind::LenOf(path.to_owned()))
    }

    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Context<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Expr(ExprKind::Func(Arc::new(f)))
    }

    pub fn eval(&self, ctx: &Context<'_>) -> Result<Value> {
        match &self.0 {
            ExprKind::Const(v) => Ok(v.clone()),
            ExprKind::This(path) => ctx.lookup_path(path),
            ExprKind::Parent(path) => ctx
                .parent()
                .ok_or_else(|| ConstructError::MissingContextValue(format!("_.{path}")))?
                .lookup_path(path),
            ExprKind::Root(path) => ctx.root().lookup_path(path),
            ExprKind::Param(name) => ctx
                .params()
                .get_opt(name)
                .cloned()
                .ok_or_else(|| ConstructError::MissingContextValue(name.clone())),
            ExprKind::Index => Ok(Value::from(ctx.index().unwrap_or(0))),
            ExprKind::LenOf(path) => {
                let v = ctx.lookup_path(path)?;
                v.len().map(Value::from).ok_or_else(|| {
                    ConstructError::format(format!("`{path}` is a {} and has no length", v.type_name()))
                })
            }
            ExprKind::Func(f) => f(ctx),
        }
    }

    pub fn eval_usize(&self, ctx: &Context<'_>) -> Result<usize> {
        let v = self.eval(ctx)?;
        v.as_usize()
            .ok_or_else(|| ConstructError::format(format!("expected a non-negative integer, got {v:?}")))
    }

    pub fn eval_i64(&self, ctx: &Context<'_>) -> Result<i64> {
        let v = self.eval(ctx)?;
        v.as_int()
            .and_then(|i| i64::try_from(i).ok())
            .ok_or_else(|| ConstructError::format(format!("expected a 64-bit integer, got {v:?}")))
    }

    /// Value of a constant expression, `None` for anything context-dependent.
    pub fn as_const(&self) -> Option<&Value> {
        match &self.0 {
            ExprKind::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.0, ExprKind::Func(_))
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ExprKind::Const(v)     => write!(f, "{v:?}"),
            ExprKind::This(p)      => write!(f, "this.{p}"),
            ExprKind::Parent(p)    => write!(f, "this._.{p}"),
            ExprKind::Root(p)      => write!(f, "this._root.{p}"),
            ExprKind::Param(p)     => write!(f, "this._params.{p}"),
            ExprKind::Index        => f.write_str("this._index"),
            ExprKind::LenOf(p)     => write!(f, "len_(this.{p})"),
            ExprKind::Func(_)      => f.write_str("<expr>"),
        }
    }
}

macro_rules! expr_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Expr {
            fn from(v: $t) -> Self { Expr::constant(v) }
        })*
    };
}

expr_from_int!(usize, i32, u32, i64, u64);
