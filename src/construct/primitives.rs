//! Leaf codecs: numbers, byte and text strings, flags, enumerations and
//! constants.
//!
//! # Endianness
//! Every multi-byte field names its byte order explicitly; there is no
//! platform-dependent default.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::construct::{expected, undetermined, Construct, ConstructRef, IntoConstruct};
use crate::container::{Container, FLAGS_MARKER};
use crate::context::{Context, Expr};
use crate::error::{CompileError, ConstructError, Result};
use crate::stream::Stream;
use crate::value::{EnumValue, Value};

// ── Numbers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumKind {
    Unsigned,
    Signed,
    Float,
}

/// Fixed-width integer or IEEE-754 float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatField {
    kind:   NumKind,
    width:  usize,
    endian: Endian,
}

impl FormatField {
    const fn new(kind: NumKind, width: usize, endian: Endian) -> Self {
        Self { kind, width, endian }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn range(&self) -> (i128, i128) {
        let bits = 8 * self.width as u32;
        match self.kind {
            NumKind::Unsigned => (0, (1i128 << bits) - 1),
            _ => (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1),
        }
    }

    fn decode<B: ByteOrder>(&self, mut r: &[u8]) -> Result<Value> {
        Ok(match self.kind {
            NumKind::Unsigned => Value::Int(r.read_uint::<B>(self.width)? as i128),
            NumKind::Signed   => Value::Int(r.read_int::<B>(self.width)? as i128),
            NumKind::Float if self.width == 4 => Value::Float(r.read_f32::<B>()? as f64),
            NumKind::Float    => Value::Float(r.read_f64::<B>()?),
        })
    }

    fn encode<B: ByteOrder>(&self, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        if self.kind == NumKind::Float {
            let f = value.as_float().ok_or_else(|| expected("a number", value))?;
            if self.width == 4 {
                out.write_f32::<B>(f as f32)?;
            } else {
                out.write_f64::<B>(f)?;
            }
            return Ok(());
        }
        let v = value.as_int().ok_or_else(|| expected("an integer", value))?;
        let (lo, hi) = self.range();
        if v < lo || v > hi {
            return Err(ConstructError::format(format!(
                "{v} out of range for {}-byte {:?} integer",
                self.width, self.kind
            )));
        }
        match self.kind {
            NumKind::Unsigned => out.write_uint::<B>(v as u64, self.width)?,
            _ => out.write_int::<B>(v as i64, self.width)?,
        }
        Ok(())
    }
}

impl Construct for FormatField {
    fn parse(&self, stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<Value> {
        let raw = stream.read_exact_bytes(self.width)?;
        match self.endian {
            Endian::Little => self.decode::<LittleEndian>(&raw),
            Endian::Big => self.decode::<BigEndian>(&raw),
        }
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<usize> {
        let mut out = Vec::with_capacity(self.width);
        match self.endian {
            Endian::Little => self.encode::<LittleEndian>(value, &mut out)?,
            Endian::Big => self.encode::<BigEndian>(value, &mut out)?,
        }
        stream.write_all_bytes(&out)
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Ok(self.width)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(*self))
    }
}

macro_rules! format_fields {
    ($($name:ident => $kind:ident, $width:expr, $endian:ident;)*) => {
        $(pub const fn $name() -> FormatField {
            FormatField::new(NumKind::$kind, $width, Endian::$endian)
        })*
    };
}

format_fields! {
    u8       => Unsigned, 1, Little;
    i8       => Signed,   1, Little;
    u16_le   => Unsigned, 2, Little;
    u16_be   => Unsigned, 2, Big;
    u32_le   => Unsigned, 4, Little;
    u32_be   => Unsigned, 4, Big;
    u64_le   => Unsigned, 8, Little;
    u64_be   => Unsigned, 8, Big;
    i16_le   => Signed,   2, Little;
    i16_be   => Signed,   2, Big;
    i32_le   => Signed,   4, Little;
    i32_be   => Signed,   4, Big;
    i64_le   => Signed,   8, Little;
    i64_be   => Signed,   8, Big;
    f32_le   => Float,    4, Little;
    f32_be   => Float,    4, Big;
    f64_le   => Float,    8, Little;
    f64_be   => Float,    8, Big;
}

/// Integer of any width from 1 to 8 bytes, e.g. 24-bit lengths.
pub fn uint(width: usize, endian: Endian) -> Result<FormatField> {
    if !(1..=8).contains(&width) {
        return Err(ConstructError::format(format!("unsupported integer width {width}")));
    }
    Ok(FormatField::new(NumKind::Unsigned, width, endian))
}

// ── Byte strings ─────────────────────────────────────────────────────────────

/// Byte string whose length comes from an expression.
#[derive(Debug, Clone)]
pub struct Bytes {
    length: Expr,
}

impl Bytes {
    pub fn new(length: impl Into<Expr>) -> Self {
        Self { length: length.into() }
    }
}

impl Construct for Bytes {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let n = self.length.eval_usize(ctx)?;
        Ok(Value::Bytes(stream.read_exact_bytes(n)?))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let data = value.as_bytes().ok_or_else(|| expected("bytes", value))?;
        let n = self.length.eval_usize(ctx)?;
        if data.len() != n {
            return Err(ConstructError::format(format!(
                "expected {n} bytes, got {}",
                data.len()
            )));
        }
        stream.write_all_bytes(data)
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.length.eval_usize(ctx).map_err(undetermined)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        if self.length.is_opaque() {
            return Err(CompileError::OpaqueExpression("Bytes"));
        }
        Ok(Arc::new(self.clone()))
    }
}

/// Everything up to the end of the stream.
#[derive(Debug, Clone, Copy)]
pub struct GreedyBytes;

impl Construct for GreedyBytes {
    fn parse(&self, stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<Value> {
        Ok(Value::Bytes(stream.read_remaining()?))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<usize> {
        let data = value.as_bytes().ok_or_else(|| expected("bytes", value))?;
        stream.write_all_bytes(data)
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Err(ConstructError::SizeUndetermined("greedy bytes".into()))
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(GreedyBytes))
    }
}

// ── Text ─────────────────────────────────────────────────────────────────────

fn decode_utf8(raw: Vec<u8>) -> Result<Value> {
    String::from_utf8(raw)
        .map(Value::Str)
        .map_err(|e| ConstructError::format(format!("invalid UTF-8: {e}")))
}

/// UTF-8 text in a fixed-size, NUL-padded slot.
#[derive(Debug, Clone)]
pub struct PaddedString {
    length: Expr,
}

impl PaddedString {
    pub fn new(length: impl Into<Expr>) -> Self {
        Self { length: length.into() }
    }
}

impl Construct for PaddedString {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let n = self.length.eval_usize(ctx)?;
        let mut raw = stream.read_exact_bytes(n)?;
        while raw.last() == Some(&0) {
            raw.pop();
        }
        decode_utf8(raw)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let text = value.as_str().ok_or_else(|| expected("a string", value))?;
        let n = self.length.eval_usize(ctx)?;
        if text.len() > n {
            return Err(ConstructError::format(format!(
                "string of {} bytes does not fit in {n}",
                text.len()
            )));
        }
        let mut raw = text.as_bytes().to_vec();
        raw.resize(n, 0);
        stream.write_all_bytes(&raw)
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.length.eval_usize(ctx).map_err(undetermined)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        if self.length.is_opaque() {
            return Err(CompileError::OpaqueExpression("PaddedString"));
        }
        Ok(Arc::new(self.clone()))
    }
}

/// NUL-terminated UTF-8 text.
#[derive(Debug, Clone, Copy)]
pub struct CString;

impl Construct for CString {
    fn parse(&self, stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<Value> {
        let mut raw = Vec::new();
        loop {
            let b = stream.read_exact_bytes(1)?[0];
            if b == 0 {
                break;
            }
            raw.push(b);
        }
        decode_utf8(raw)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<usize> {
        let text = value.as_str().ok_or_else(|| expected("a string", value))?;
        if text.as_bytes().contains(&0) {
            return Err(ConstructError::format("string contains an embedded NUL"));
        }
        let mut raw = Vec::with_capacity(text.len() + 1);
        raw.extend_from_slice(text.as_bytes());
        raw.push(0);
        stream.write_all_bytes(&raw)
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Err(ConstructError::SizeUndetermined("NUL-terminated string".into()))
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(CString))
    }
}

// ── Flag ─────────────────────────────────────────────────────────────────────

/// One byte, nonzero meaning true.
#[derive(Debug, Clone, Copy)]
pub struct Flag;

impl Construct for Flag {
    fn parse(&self, stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<Value> {
        Ok(Value::Bool(stream.read_exact_bytes(1)?[0] != 0))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, _ctx: &Context<'_>) -> Result<usize> {
        stream.write_all_bytes(&[value.is_truthy() as u8])
    }

    fn sizeof(&self, _ctx: &Context<'_>) -> Result<usize> {
        Ok(1)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(Flag))
    }
}

// ── Enum / FlagsEnum ─────────────────────────────────────────────────────────

/// Integer with symbolic names. Integers outside the mapping parse to
/// [`EnumValue::Unknown`] and build back unchanged.
#[derive(Debug, Clone)]
pub struct Enum {
    subcon:  ConstructRef,
    mapping: Vec<(String, i128)>,
}

impl Enum {
    pub fn new<'n>(subcon: impl IntoConstruct, mapping: impl IntoIterator<Item = (&'n str, i128)>) -> Self {
        Self {
            subcon:  subcon.into_construct(),
            mapping: mapping.into_iter().map(|(n, v)| (n.to_owned(), v)).collect(),
        }
    }

    fn encode(&self, value: &Value) -> Result<i128> {
        match value {
            Value::Enum(e) => Ok(e.value()),
            Value::Int(i) => Ok(*i),
            Value::Str(name) => self
                .mapping
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| *v)
                .ok_or_else(|| ConstructError::format(format!("no enum member named `{name}`"))),
            other => Err(expected("an enum member", other)),
        }
    }
}

impl Construct for Enum {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let raw = self.subcon.parse(stream, ctx)?;
        let v = raw.as_int().ok_or_else(|| expected("an integer", &raw))?;
        Ok(Value::Enum(match self.mapping.iter().find(|(_, mv)| *mv == v) {
            Some((name, _)) => EnumValue::Known { name: name.clone(), value: v },
            None => EnumValue::Unknown(v),
        }))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let v = self.encode(value)?;
        self.subcon.build(&Value::Int(v), stream, ctx)
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.subcon.sizeof(ctx)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(Enum { subcon: self.subcon.compile()?, mapping: self.mapping.clone() }))
    }
}

/// Integer decoded into one boolean per named bit mask.
#[derive(Debug, Clone)]
pub struct FlagsEnum {
    subcon: ConstructRef,
    flags:  Vec<(String, i128)>,
}

impl FlagsEnum {
    pub fn new<'n>(subcon: impl IntoConstruct, flags: impl IntoIterator<Item = (&'n str, i128)>) -> Self {
        Self {
            subcon: subcon.into_construct(),
            flags:  flags.into_iter().map(|(n, v)| (n.to_owned(), v)).collect(),
        }
    }

    fn encode(&self, value: &Value) -> Result<i128> {
        let record = match value {
            Value::Int(i) => return Ok(*i),
            Value::Container(c) => c,
            other => return Err(expected("a flags container", other)),
        };
        let mut bits = 0i128;
        for (name, set) in record.public_entries() {
            if !set.is_truthy() {
                continue;
            }
            let mask = self
                .flags
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, m)| *m)
                .ok_or_else(|| ConstructError::format(format!("no flag named `{name}`")))?;
            bits |= mask;
        }
        Ok(bits)
    }
}

impl Construct for FlagsEnum {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let raw = self.subcon.parse(stream, ctx)?;
        let v = raw.as_int().ok_or_else(|| expected("an integer", &raw))?;
        let mut record = Container::new();
        record.set(FLAGS_MARKER, true);
        for (name, mask) in &self.flags {
            record.set(name.as_str(), v & mask == *mask);
        }
        Ok(Value::Container(record))
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let v = self.encode(value)?;
        self.subcon.build(&Value::Int(v), stream, ctx)
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.subcon.sizeof(ctx)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(FlagsEnum { subcon: self.subcon.compile()?, flags: self.flags.clone() }))
    }
}

// ── Const / Padding ──────────────────────────────────────────────────────────

/// Fixed value: parsing anything else is a format violation, and builds
/// need not supply it.
#[derive(Debug, Clone)]
pub struct Const {
    subcon: ConstructRef,
    value:  Value,
}

impl Const {
    pub fn new(subcon: impl IntoConstruct, value: impl Into<Value>) -> Self {
        Self { subcon: subcon.into_construct(), value: value.into() }
    }

    /// Magic byte signature.
    pub fn bytes(signature: &[u8]) -> Self {
        Self::new(Bytes::new(signature.len()), signature)
    }
}

impl Construct for Const {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let v = self.subcon.parse(stream, ctx)?;
        if v != self.value {
            return Err(ConstructError::format(format!(
                "expected constant {:?}, parsed {v:?}",
                self.value
            )));
        }
        Ok(v)
    }

    fn build(&self, value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        if !value.is_none() && *value != self.value {
            return Err(ConstructError::format(format!(
                "expected constant {:?}, given {value:?}",
                self.value
            )));
        }
        self.subcon.build(&self.value, stream, ctx)
    }

    fn build_value(
        &self,
        _given: Option<&Value>,
        _stream: &mut dyn Stream,
        _ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        Ok(Some(self.value.clone()))
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.subcon.sizeof(ctx)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        Ok(Arc::new(Const { subcon: self.subcon.compile()?, value: self.value.clone() }))
    }
}

/// Filler bytes, discarded on parse.
#[derive(Debug, Clone)]
pub struct Padding {
    length:  Expr,
    pattern: u8,
}

impl Padding {
    pub fn new(length: impl Into<Expr>) -> Self {
        Self { length: length.into(), pattern: 0 }
    }

    pub fn with_pattern(mut self, pattern: u8) -> Self {
        self.pattern = pattern;
        self
    }
}

impl Construct for Padding {
    fn parse(&self, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<Value> {
        let n = self.length.eval_usize(ctx)?;
        stream.read_exact_bytes(n)?;
        Ok(Value::None)
    }

    fn build(&self, _value: &Value, stream: &mut dyn Stream, ctx: &Context<'_>) -> Result<usize> {
        let n = self.length.eval_usize(ctx)?;
        stream.write_all_bytes(&vec![self.pattern; n])
    }

    fn build_value(
        &self,
        _given: Option<&Value>,
        _stream: &mut dyn Stream,
        _ctx: &Context<'_>,
    ) -> Result<Option<Value>> {
        Ok(Some(Value::None))
    }

    fn sizeof(&self, ctx: &Context<'_>) -> Result<usize> {
        self.length.eval_usize(ctx).map_err(undetermined)
    }

    fn compile(&self) -> Result<ConstructRef, CompileError> {
        if self.length.is_opaque() {
            return Err(CompileError::OpaqueExpression("Padding"));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widths_and_byte_order() {
        assert_eq!(u16_be().build_bytes(&Value::from(0x0102)).unwrap(), [1, 2]);
        assert_eq!(u16_le().build_bytes(&Value::from(0x0102)).unwrap(), [2, 1]);
        assert_eq!(i16_le().parse_bytes(&[0xfe, 0xff]).unwrap(), Value::Int(-2));
        let u24 = uint(3, Endian::Big).unwrap();
        assert_eq!(u24.parse_bytes(&[1, 0, 0]).unwrap(), Value::Int(0x10000));
        assert!(uint(9, Endian::Big).is_err());
    }

    #[test]
    fn out_of_range_integer_is_rejected() {
        let err = u8().build_bytes(&Value::from(256)).unwrap_err();
        assert!(matches!(err, ConstructError::FormatViolation(_)));
        assert!(u8().build_bytes(&Value::from(-1)).is_err());
        assert!(i8().build_bytes(&Value::from(-128)).is_ok());
    }

    #[test]
    fn unknown_enum_values_survive_round_trip() {
        let e = Enum::new(u8(), [("ok", 0), ("fail", 1)]);
        assert_eq!(e.parse_bytes(&[1]).unwrap(), Value::from("fail"));
        let unknown = e.parse_bytes(&[9]).unwrap();
        assert_eq!(unknown, Value::Enum(EnumValue::Unknown(9)));
        assert_eq!(e.build_bytes(&unknown).unwrap(), [9]);
        assert_eq!(e.build_bytes(&Value::from("ok")).unwrap(), [0]);
        assert!(e.build_bytes(&Value::from("nope")).is_err());
    }

    #[test]
    fn flags_enum_marks_its_container() {
        let f = FlagsEnum::new(u8(), [("read", 1), ("write", 2), ("exec", 4)]);
        let v = f.parse_bytes(&[5]).unwrap();
        let c = v.as_container().unwrap();
        assert!(c.contains(FLAGS_MARKER));
        assert_eq!(c["write"], Value::Bool(false));
        assert_eq!(f.build_bytes(&v).unwrap(), [5]);
    }

    #[test]
    fn const_rejects_other_values() {
        let magic = Const::bytes(b"MZ");
        assert!(magic.parse_bytes(b"MZ").is_ok());
        let err = magic.parse_bytes(b"PK").unwrap_err();
        assert!(matches!(err, ConstructError::FormatViolation(_)));
        assert_eq!(magic.build_bytes(&Value::None).unwrap(), b"MZ");
    }

    #[test]
    fn strings() {
        assert_eq!(PaddedString::new(5).parse_bytes(b"ab\0\0\0").unwrap(), Value::from("ab"));
        assert_eq!(PaddedString::new(4).build_bytes(&Value::from("ab")).unwrap(), b"ab\0\0");
        assert!(PaddedString::new(1).build_bytes(&Value::from("ab")).is_err());
        assert_eq!(CString.parse_bytes(b"hi\0rest").unwrap(), Value::from("hi"));
        assert!(matches!(CString.sizeof_static(), Err(ConstructError::SizeUndetermined(_))));
        assert!(CString.parse_bytes(b"no end").is_err());
    }
}
