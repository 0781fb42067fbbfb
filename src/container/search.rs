//! Regex lookup of entries by name.
//!
//! Patterns are anchored at the start of the name (`"len"` matches `length`
//! but not `payload_len`). A recursive search descends into nested containers
//! and lists instead of matching their own names; a shared container that is
//! already being searched, or is locked for writing, counts as a non-match.

use regex::Regex;

use crate::container::guard::{addr, Visited};
use crate::container::{Container, ListContainer};
use crate::value::Value;

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})"))
}

impl Container {
    /// First entry of this container whose name matches `pattern`.
    pub fn search(&self, pattern: &str) -> Result<Option<Value>, regex::Error> {
        let re = anchored(pattern)?;
        Ok(self.iter().find(|(k, _)| re.is_match(k)).map(|(_, v)| v.clone()))
    }

    /// Every matching entry at any depth, depth-first in entry order.
    pub fn search_recursive(&self, pattern: &str) -> Result<Vec<Value>, regex::Error> {
        let re = anchored(pattern)?;
        let mut hits = Vec::new();
        collect_container(self, &re, &Visited::new(), &mut hits);
        Ok(hits)
    }
}

impl ListContainer {
    /// First match among the element containers, searched one level deep.
    pub fn search(&self, pattern: &str) -> Result<Option<Value>, regex::Error> {
        let re = anchored(pattern)?;
        for item in self.iter() {
            let hit = match item {
                Value::Container(c) => first_match(c, &re),
                Value::Shared(s) => s.try_read().and_then(|c| first_match(&c, &re)),
                _ => None,
            };
            if hit.is_some() {
                return Ok(hit);
            }
        }
        Ok(None)
    }

    pub fn search_recursive(&self, pattern: &str) -> Result<Vec<Value>, regex::Error> {
        let re = anchored(pattern)?;
        let mut hits = Vec::new();
        collect_list(self, &re, &Visited::new(), &mut hits);
        Ok(hits)
    }
}

fn first_match(c: &Container, re: &Regex) -> Option<Value> {
    c.iter().find(|(k, _)| re.is_match(k)).map(|(_, v)| v.clone())
}

fn collect_container(c: &Container, re: &Regex, visits: &Visited<usize>, hits: &mut Vec<Value>) {
    let Some(_guard) = visits.enter(addr(c)) else {
        return;
    };
    for (key, value) in c.iter() {
        if !descend(value, re, visits, hits) && re.is_match(key) {
            hits.push(value.clone());
        }
    }
}

fn collect_list(l: &ListContainer, re: &Regex, visits: &Visited<usize>, hits: &mut Vec<Value>) {
    let Some(_guard) = visits.enter(addr(l)) else {
        return;
    };
    for item in l.iter() {
        descend(item, re, visits, hits);
    }
}

/// Recurse into `value` if it is a container or list. Returns whether it was one.
fn descend(value: &Value, re: &Regex, visits: &Visited<usize>, hits: &mut Vec<Value>) -> bool {
    match value {
        Value::Container(c) => collect_container(c, re, visits, hits),
        Value::List(l) => collect_list(l, re, visits, hits),
        Value::Shared(s) => {
            if let Some(inner) = s.try_read() {
                collect_container(&inner, re, visits, hits);
            }
        }
        _ => return false,
    }
    true
}
