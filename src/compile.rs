//! Compiled fast paths.
//!
//! Compilation rewrites a construct tree into an equivalent one that does
//! less work per call. The only rewrite today is [`Buffered`]: a struct whose
//! size is known up front is read (or written) with a single stream call and
//! decoded from memory. A construct that cannot be compiled is used as is;
//! see [`compile_or_interpret`].

use std::io::Cursor;
use std::sync::Arc;

use tracing::debug;

use crate::construct::structs::{Field, Struct};
use crate::construct::{Construct, ConstructRef};
use crate::context::Context;
use crate::error::{CompileError, ConstructError, Result};
use crate::stream::Stream;
use crate::value::Value;

/// The compiled form of `con`, or `con` itself when it refuses compilation.
pub fn compile_or_interpret(con: &ConstructRef) -> ConstructRef {
    match con.compile() {
        Ok(compiled) => compiled,
        Err(reason) => {
            debug!(%reason, "falling back to interpreted construct");
            Arc::clone(con)
        }
    }
}

pub(crate) fn compile_struct(s: &Struct) -> Result<ConstructRef, CompileError> {
    let fields = s
        .fields()
        .iter()
        .map(|f| {
            let con = f.construct().compile()?;
            Ok(match f.name() {
                Some(name) => Field::named(name, con),
                None => Field::anonymous(con),
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()?;
    let compiled = Struct::new(fields);
    Ok(match compiled.sizeof_static() {
        Ok(size) => Arc::new(Buffered { inner: Arc::new(compiled), size }),
        Err(_) => Arc::new(compiled),
    })
}

/// Fixed-size construct processed through one read or one write.
#[derive(Debug, Clone)]
pub struct Buffered {
    inner: ConstructRef,
    size:  usize,
}

impl Construct for Buffered {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let block = stream.read_exact_bytes(self.size)?;
        self.inner.parse(&mut Cursor::new(block), ctx)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let mut buf = Cursor::new(Vec::with_capacity(self.size));
        self.inner.build(value, &mut buf, ctx)?;
        let block = buf.into_inner();
        if block.len() != self.size {
            return Err(ConstructError::format(format!(
                "fixed-size record built {} bytes, expected {}",
                block.len(),
                self.size
            )));
        }
        stream.write_all_bytes(&block)
    }

    fn build_value(
        &self,
        given: Option<&Value>,
        stream: &mut dyn Stream,
        ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        self.inner.build_value(given, stream, ctx)
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Ok(self.size)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(self.clone()))
    }
}
