//! Sequential named fields.

use std::fmt;

use crate::compile;
use crate::construct::{expected, Construct, ConstructRef, IntoConstruct};
use crate::container::Container;
use crate::context::Context;
use crate::error::{CompileError, ConstructError, Result};
use crate::stream::Stream;
use crate::value::Value;

/// One member of a [`Struct`]. Anonymous members (padding, magic constants)
/// are parsed and built but never bound.
#[derive(Clone)]
pub struct Field {
    name: Option<String>,
    con:  ConstructRef,
}

impl Field {
    pub fn named(name: &str, con: impl IntoConstruct) -> Self {
        Self { name: Some(name.to_owned()), con: con.into_construct() }
    }

    pub fn anonymous(con: impl IntoConstruct) -> Self {
        Self { name: None, con: con.into_construct() }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn construct(&self) -> &ConstructRef {
        &self.con
    }

    fn annotate(&self, e: ConstructError) -> ConstructError {
        match &self.name {
            Some(n) => e.at_field(n),
            None => e,
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(n) => write!(f, "{n} / {:?}", self.con),
            None => write!(f, "{:?}", self.con),
        }
    }
}

/// Fields processed in declaration order. Each parsed value is bound into
/// the struct's context before the next field runs, so a field's size, count
/// or presence may depend on any field before it.
#[derive(Debug, Clone)]
pub struct Struct {
    fields: Vec<Field>,
}

impl Struct {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

impl Construct for Struct {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let mut child = ctx.derive_child(Container::new()).with_subcons(&self.fields);
        for field in &self.fields {
            let value = field.con.parse(stream, &child).map_err(|e| field.annotate(e))?;
            if let Some(name) = &field.name {
                child.bind(name.as_str(), value);
            }
        }
        Ok(Value::Container(child.into_fields()))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let input = match value {
            Value::Container(c) => c.clone(),
            Value::Shared(s) => s.snapshot(),
            other => return Err(expected("a container", other)),
        };
        let mut child = ctx.derive_child(input).with_subcons(&self.fields);
        let mut written = 0usize;
        for field in &self.fields {
            let given = field.name.as_deref().and_then(|n| child.fields().get_opt(n).cloned());
            let resolved = field
                .con
                .build_value(given.as_ref(), stream, &child)
                .map_err(|e| field.annotate(e))?;
            let Some(v) = resolved else {
                let name = field.name.clone().unwrap_or_default();
                return Err(field.annotate(ConstructError::MissingContextValue(name)));
            };
            written += field.con.build(&v, stream, &child).map_err(|e| field.annotate(e))?;
            if let Some(name) = &field.name {
                child.bind(name.as_str(), v);
            }
        }
        Ok(written)
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        let child = ctx.derive_child(Container::new()).with_subcons(&self.fields);
        let mut total = 0usize;
        for field in &self.fields {
            total += field.con.sizeof(&child).map_err(|e| field.annotate(e))?;
        }
        Ok(total)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        compile::compile_struct(self)
    }
}
