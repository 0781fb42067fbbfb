//! The value model produced by parsing and consumed by building.
//!
//! Struct-like constructs produce [`Value::Container`], repetitions produce
//! [`Value::List`], leaves produce scalars. [`Value::Shared`] is the only
//! variant through which a value can reach itself, so it is the one the
//! cycle guards in rendering, equality and search exist for.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::container::guard::{addr, Visited};
use crate::container::{render, Container, ListContainer, SharedContainer};

/// Enumerated value as decoded by `Enum`: a symbolic name when the integer is
/// in the mapping, the bare integer otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumValue {
    Known { name: String, value: i128 },
    Unknown(i128),
}

impl EnumValue {
    pub fn value(&self) -> i128 {
        match self {
            EnumValue::Known { value, .. } => *value,
            EnumValue::Unknown(v) => *v,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            EnumValue::Known { name, .. } => Some(name),
            EnumValue::Unknown(_) => None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    Enum(EnumValue),
    Container(Container),
    List(ListContainer),
    /// Shared handle; not persisted.
    #[serde(skip)]
    Shared(SharedContainer),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None         => "none",
            Value::Bool(_)      => "bool",
            Value::Int(_)       => "int",
            Value::Float(_)     => "float",
            Value::Bytes(_)     => "bytes",
            Value::Str(_)       => "str",
            Value::Enum(_)      => "enum",
            Value::Container(_) => "container",
            Value::List(_)      => "list",
            Value::Shared(_)    => "shared container",
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v)  => Some(*v),
            Value::Bool(b) => Some(*b as i128),
            Value::Enum(e) => Some(e.value()),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_int().and_then(|v| usize::try_from(v).ok())
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(v)   => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Enum(EnumValue::Known { name, .. }) => Some(name),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Value::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListContainer> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Element count of sized values (bytes, text, containers, lists).
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Bytes(b)     => Some(b.len()),
            Value::Str(s)       => Some(s.len()),
            Value::Container(c) => Some(c.len()),
            Value::List(l)      => Some(l.len()),
            Value::Shared(s)    => Some(s.read().len()),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Python-like truthiness, used to hide unset flags in diagnostics.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None      => false,
            Value::Bool(b)   => *b,
            Value::Int(v)    => *v != 0,
            Value::Float(f)  => *f != 0.0,
            Value::Enum(_)   => true,
            other => other.len().map_or(true, |n| n > 0),
        }
    }
}

// ── Equality ─────────────────────────────────────────────────────────────────

pub(crate) type PairVisits = Visited<(usize, usize)>;

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        eq_values(self, other, &PairVisits::new())
    }
}

/// Structural equality. A pair of shared containers already being compared
/// higher up the traversal is treated as equal, which makes comparing two
/// cyclic structures terminate.
pub(crate) fn eq_values(a: &Value, b: &Value, seen: &PairVisits) -> bool {
    use Value::*;
    match (a, b) {
        (None, None)               => true,
        (Bool(x), Bool(y))         => x == y,
        (Int(x), Int(y))           => x == y,
        (Float(x), Float(y))       => x == y,
        (Int(i), Float(f)) | (Float(f), Int(i)) => (*i as f64) == *f,
        (Bytes(x), Bytes(y))       => x == y,
        (Str(x), Str(y))           => x == y,
        (Enum(x), Enum(y))         => x == y,
        (Enum(e), Str(s)) | (Str(s), Enum(e)) => e.name() == Some(s.as_str()),
        (Enum(EnumValue::Unknown(v)), Int(i)) | (Int(i), Enum(EnumValue::Unknown(v))) => v == i,
        (Container(x), Container(y)) => x.eq_tracked(y, seen),
        (List(x), List(y))           => x.eq_tracked(y, seen),
        (Shared(x), Shared(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let (gx, gy) = (x.read(), y.read());
            gx.eq_tracked(&gy, seen)
        }
        (Shared(x), Container(y)) | (Container(y), Shared(x)) => {
            let gx = x.read();
            gx.eq_tracked(y, seen)
        }
        _ => false,
    }
}

impl Container {
    pub(crate) fn eq_tracked(&self, other: &Container, seen: &PairVisits) -> bool {
        let Some(_guard) = seen.enter((addr(self), addr(other))) else {
            return true;
        };
        let mut public = 0usize;
        for (k, v) in self.public_entries() {
            public += 1;
            match other.get_opt(k) {
                Some(ov) if eq_values(v, ov, seen) => {}
                _ => return false,
            }
        }
        public == other.public_entries().count()
    }
}

impl ListContainer {
    pub(crate) fn eq_tracked(&self, other: &ListContainer, seen: &PairVisits) -> bool {
        self.len() == other.len()
            && self.iter().zip(other.iter()).all(|(a, b)| eq_values(a, b, seen))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render::compact_value(self))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render::expanded_value(self))
    }
}

// ── Conversions ──────────────────────────────────────────────────────────────

macro_rules! int_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self { Value::Int(v as i128) }
        })*
    };
}

int_from!(u8, u16, u32, u64, usize, i8, i16, i32, i64, i128);

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self { Value::Float(v as f64) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Float(v) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Str(v.to_owned()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::Str(v) }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self { Value::Bytes(v) }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self { Value::Bytes(v.to_vec()) }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(v: &[u8; N]) -> Self { Value::Bytes(v.to_vec()) }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self { Value::Enum(v) }
}

impl From<Container> for Value {
    fn from(v: Container) -> Self { Value::Container(v) }
}

impl From<ListContainer> for Value {
    fn from(v: ListContainer) -> Self { Value::List(v) }
}

impl From<SharedContainer> for Value {
    fn from(v: SharedContainer) -> Self { Value::Shared(v) }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self { Value::List(ListContainer::from(v)) }
}
