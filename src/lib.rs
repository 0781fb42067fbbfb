//! Declarative, symmetric binary codecs.
//!
//! One construct tree describes a layout once and serves as parser, builder
//! and size calculator:
//!
//! ```
//! use symcodec::construct::primitives::{u32_le, PaddedString};
//! use symcodec::{container, Array, Construct, Expr, Field, Struct, Value};
//!
//! let record = Struct::new(vec![
//!     Field::named("count", u32_le()),
//!     Field::named("payload", Array::new(Expr::this("count"), PaddedString::new(3))),
//! ]);
//!
//! let data = b"\x01\x00\x00\x00abc";
//! let parsed = record.parse_bytes(data).unwrap();
//! assert_eq!(parsed, Value::from(container! {
//!     "count" => 1,
//!     "payload" => vec![Value::from("abc")],
//! }));
//! assert_eq!(record.build_bytes(&parsed).unwrap(), data);
//! ```

pub mod codec;
pub mod compile;
pub mod construct;
pub mod container;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod stream;
pub mod value;

pub use compile::compile_or_interpret;
pub use construct::adapters::{ChecksumKind, Checksum, Compressed, Prefixed};
pub use construct::computed::{Computed, Defaulted, Pass, Rebuild};
pub use construct::pointer::{Pointer, Tell};
pub use construct::repeat::{Array, GreedyRange, PrefixedArray, RepeatUntil};
pub use construct::structs::{Field, Struct};
pub use construct::switch::{IfThenElse, Switch};
pub use construct::{Construct, ConstructRef, IntoConstruct};
pub use container::{Container, ListContainer, SharedContainer};
pub use context::{Context, Expr, Mode};
pub use error::{CompileError, ConstructError, PathSegment, Result};
pub use stream::Stream;
pub use value::{EnumValue, Value};
