//! Diagnostic text for values and containers.
//!
//! Every entry point starts a fresh [`Visited`] set; a container met again
//! while it is still being rendered is replaced by [`RECURSION_SENTINEL`].

use crate::container::guard::{addr, Visited};
use crate::container::{is_private, Container, ListContainer, FLAGS_MARKER};
use crate::diagnostics::{self, RenderSettings};
use crate::value::{EnumValue, Value};

pub const RECURSION_SENTINEL: &str = "<recursion detected>";

const INDENT: &str = "\n    ";

type Visits = Visited<usize>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Style {
    Compact,
    Expanded,
}

pub(crate) fn compact_value(value: &Value) -> String {
    format_value(value, &diagnostics::global().settings(), &Visits::new(), Style::Compact)
}

pub(crate) fn expanded_value(value: &Value) -> String {
    format_value(value, &diagnostics::global().settings(), &Visits::new(), Style::Expanded)
}

pub(crate) fn container_compact(c: &Container, s: &RenderSettings) -> String {
    container_text(c, s, &Visits::new(), Style::Compact)
}

pub(crate) fn container_expanded_root(c: &Container, s: &RenderSettings) -> String {
    container_text(c, s, &Visits::new(), Style::Expanded)
}

pub(crate) fn list_compact(l: &ListContainer, s: &RenderSettings) -> String {
    list_text(l, s, &Visits::new(), Style::Compact)
}

pub(crate) fn list_expanded_root(l: &ListContainer, s: &RenderSettings) -> String {
    list_text(l, s, &Visits::new(), Style::Expanded)
}

// ── Value formatting policy ──────────────────────────────────────────────────

fn format_value(value: &Value, s: &RenderSettings, visits: &Visits, style: Style) -> String {
    match value {
        Value::None      => "None".to_owned(),
        Value::Bool(b)   => b.to_string(),
        Value::Int(i)    => i.to_string(),
        Value::Float(f)  => format!("{f:?}"),
        Value::Bytes(b)  => bytes_text(b, s),
        Value::Str(t)    => str_text(t, s),
        Value::Enum(EnumValue::Known { name, value }) => format!("(enum) {name} {value}"),
        Value::Enum(EnumValue::Unknown(v))            => format!("(enum) (unknown) {v}"),
        Value::Container(c) => container_text(c, s, visits, style),
        Value::List(l)      => list_text(l, s, visits, style),
        Value::Shared(sh) => match sh.try_read() {
            Some(inner) => container_text(&inner, s, visits, style),
            None => "<locked>".to_owned(),
        },
    }
}

fn bytes_text(b: &[u8], s: &RenderSettings) -> String {
    if b.len() <= s.bytes_cap || s.full_strings {
        format!("b\"{}\" (total {})", b.escape_ascii(), b.len())
    } else {
        format!(
            "b\"{}\"... (truncated, total {})",
            b[..s.bytes_cap].escape_ascii(),
            b.len()
        )
    }
}

fn str_text(t: &str, s: &RenderSettings) -> String {
    let total = t.chars().count();
    if total <= s.str_cap || s.full_strings {
        format!("{t:?} (total {total})")
    } else {
        let head: String = t.chars().take(s.str_cap).collect();
        format!("{head:?}... (truncated, total {total})")
    }
}

// ── Containers ───────────────────────────────────────────────────────────────

fn container_text(c: &Container, s: &RenderSettings, visits: &Visits, style: Style) -> String {
    let Some(_guard) = visits.enter(addr(c)) else {
        return RECURSION_SENTINEL.to_owned();
    };
    match style {
        Style::Compact => {
            let parts: Vec<String> = c
                .public_entries()
                .map(|(k, v)| format!("{k}={}", format_value(v, s, visits, style)))
                .collect();
            format!("Container({})", parts.join(", "))
        }
        Style::Expanded => {
            let is_flags = c.get_opt(FLAGS_MARKER).map_or(false, Value::is_truthy);
            let mut text = String::from("Container: ");
            for (k, v) in c.iter() {
                if is_private(k) && !s.private_entries {
                    continue;
                }
                if is_flags && !v.is_truthy() && !s.false_flags {
                    continue;
                }
                text.push_str(INDENT);
                text.push_str(k);
                text.push_str(" = ");
                text.push_str(&format_value(v, s, visits, style).replace('\n', INDENT));
            }
            text
        }
    }
}

fn list_text(l: &ListContainer, s: &RenderSettings, visits: &Visits, style: Style) -> String {
    let Some(_guard) = visits.enter(addr(l)) else {
        return RECURSION_SENTINEL.to_owned();
    };
    match style {
        Style::Compact => {
            let parts: Vec<String> = l.iter().map(|v| format_value(v, s, visits, style)).collect();
            format!("ListContainer([{}])", parts.join(", "))
        }
        Style::Expanded => {
            let mut text = String::from("ListContainer: ");
            for v in l.iter() {
                text.push_str(INDENT);
                text.push_str(&format_value(v, s, visits, style).replace('\n', INDENT));
            }
            text
        }
    }
}
