//! Ordered record and sequence containers: the two shapes a parse produces
//! and a build consumes.
//!
//! # Field storage vs. behavior
//! [`Container`] keeps its entries in a private [`IndexMap`]; every operation
//! is an inherent method, so a record with a field called `items`, `merge` or
//! `len` never interferes with the container's own API.
//!
//! # Private entries
//! Names starting with `_` are bookkeeping (e.g. the `_flagsenum` marker set
//! by `FlagsEnum`). They are ignored by equality and by compact rendering, and
//! only shown by expanded rendering when the diagnostic configuration asks
//! for them.

pub(crate) mod guard;
pub mod render;
mod search;

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{self, RenderSettings};
use crate::error::{ConstructError, Result};
use crate::value::{PairVisits, Value};

/// Prefix marking an entry as private.
pub const PRIVATE_PREFIX: char = '_';
/// Private marker entry carried by containers decoded from named bit flags.
pub const FLAGS_MARKER: &str = "_flagsenum";

pub fn is_private(name: &str) -> bool {
    name.starts_with(PRIVATE_PREFIX)
}

// ── Container ────────────────────────────────────────────────────────────────

/// Insertion-ordered mapping from field name to [`Value`].
///
/// Re-setting an existing name keeps its original position. Equality is
/// order-independent and ignores private entries.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Container {
    entries: IndexMap<String, Value>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `name`. An overwrite keeps the first-insertion position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        self.entries
            .get(name)
            .ok_or_else(|| ConstructError::KeyNotFound(name.to_owned()))
    }

    pub fn get_opt(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Remove `name`, keeping the relative order of the remaining entries.
    pub fn remove(&mut self, name: &str) -> Result<Value> {
        self.entries
            .shift_remove(name)
            .ok_or_else(|| ConstructError::KeyNotFound(name.to_owned()))
    }

    /// Remove and return the most recently inserted pair.
    pub fn remove_last(&mut self) -> Result<(String, Value)> {
        self.entries.pop().ok_or(ConstructError::EmptyContainer)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn public_entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().filter(|(k, _)| !is_private(k))
    }

    /// Bulk insert preserving source order; duplicates overwrite in place.
    pub fn merge<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (k, v) in pairs {
            self.set(k, v);
        }
    }

    /// Structural equality against any mapping of names to values.
    pub fn equals<'o, I>(&self, other: I) -> bool
    where
        I: IntoIterator<Item = (&'o String, &'o Value)>,
    {
        let seen = PairVisits::new();
        let mut public = 0usize;
        for (k, v) in other.into_iter().filter(|(k, _)| !is_private(k)) {
            public += 1;
            match self.get_opt(k) {
                Some(mine) if crate::value::eq_values(mine, v, &seen) => {}
                _ => return false,
            }
        }
        public == self.public_entries().count()
    }

    /// Plain ordered-mapping form, private entries included.
    pub fn to_mapping(&self) -> IndexMap<String, Value> {
        self.entries.clone()
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Single-line form without private entries, e.g. `Container(a=1, b="x" (total 1))`.
    pub fn render_compact(&self) -> String {
        render::container_compact(self, &diagnostics::global().settings())
    }

    /// Multi-line indented form, honoring the process-wide diagnostic toggles.
    pub fn render_expanded(&self) -> String {
        self.render_expanded_with(&diagnostics::global().settings())
    }

    pub fn render_expanded_with(&self, settings: &RenderSettings) -> String {
        render::container_expanded_root(self, settings)
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.eq_tracked(other, &PairVisits::new())
    }
}

impl PartialEq<IndexMap<String, Value>> for Container {
    fn eq(&self, other: &IndexMap<String, Value>) -> bool {
        self.equals(other)
    }
}

impl PartialEq<HashMap<String, Value>> for Container {
    fn eq(&self, other: &HashMap<String, Value>) -> bool {
        self.equals(other)
    }
}

impl Index<&str> for Container {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        match self.entries.get(name) {
            Some(v) => v,
            None => panic!("no entry named `{name}` in container"),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Container {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut c = Container::new();
        c.merge(iter);
        c
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Container {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.merge(iter);
    }
}

impl From<IndexMap<String, Value>> for Container {
    fn from(entries: IndexMap<String, Value>) -> Self {
        Self { entries }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_compact())
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_expanded())
    }
}

/// Build a [`Container`] from `name => value` pairs.
///
/// ```
/// let c = symcodec::container! { "count" => 1, "name" => "abc" };
/// assert_eq!(c.keys().collect::<Vec<_>>(), ["count", "name"]);
/// ```
#[macro_export]
macro_rules! container {
    () => { $crate::container::Container::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut c = $crate::container::Container::new();
        $( c.set($key, $value); )+
        c
    }};
}

// ── ListContainer ────────────────────────────────────────────────────────────

/// Ordered sequence of values produced by repetition constructs.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListContainer {
    items: Vec<Value>,
}

impl ListContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { items: Vec::with_capacity(n) }
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.items.pop()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn last(&self) -> Option<&Value> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.items
    }

    pub fn render_compact(&self) -> String {
        render::list_compact(self, &diagnostics::global().settings())
    }

    pub fn render_expanded(&self) -> String {
        self.render_expanded_with(&diagnostics::global().settings())
    }

    pub fn render_expanded_with(&self, settings: &RenderSettings) -> String {
        render::list_expanded_root(self, settings)
    }
}

impl PartialEq for ListContainer {
    fn eq(&self, other: &Self) -> bool {
        self.eq_tracked(other, &PairVisits::new())
    }
}

impl Index<usize> for ListContainer {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.items[index]
    }
}

impl From<Vec<Value>> for ListContainer {
    fn from(items: Vec<Value>) -> Self {
        Self { items }
    }
}

impl<V: Into<Value>> FromIterator<V> for ListContainer {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self { items: iter.into_iter().map(Into::into).collect() }
    }
}

impl IntoIterator for ListContainer {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ListContainer {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Debug for ListContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_compact())
    }
}

impl fmt::Display for ListContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_expanded())
    }
}

// ── SharedContainer ──────────────────────────────────────────────────────────

/// A container reachable from several places, possibly from inside itself.
///
/// Reads are recursive (a render of a self-referential container re-reads the
/// lock it already holds). Taking [`write`](Self::write) while a read guard of
/// the same container is alive on this thread deadlocks.
#[derive(Clone, Default)]
pub struct SharedContainer(Arc<RwLock<Container>>);

impl SharedContainer {
    pub fn new(container: Container) -> Self {
        Self(Arc::new(RwLock::new(container)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Container> {
        self.0.read_recursive()
    }

    /// `None` while a writer holds the container.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, Container>> {
        self.0.try_read_recursive()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Container> {
        self.0.write()
    }

    pub fn ptr_eq(&self, other: &SharedContainer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Detached copy of the current contents.
    pub fn snapshot(&self) -> Container {
        self.read().clone()
    }
}

impl fmt::Debug for SharedContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render::compact_value(&Value::Shared(self.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_keeps_first_position() {
        let mut c = crate::container! { "a" => 1, "b" => 2, "c" => 3 };
        c.set("a", 10);
        assert_eq!(c.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(c["a"], Value::Int(10));
    }

    #[test]
    fn remove_and_remove_last() {
        let mut c = crate::container! { "a" => 1, "b" => 2, "c" => 3 };
        assert_eq!(c.remove("b").unwrap(), Value::Int(2));
        assert!(matches!(c.remove("b"), Err(ConstructError::KeyNotFound(_))));
        assert_eq!(c.remove_last().unwrap(), ("c".to_string(), Value::Int(3)));
        assert_eq!(c.remove_last().unwrap().0, "a");
        assert!(matches!(c.remove_last(), Err(ConstructError::EmptyContainer)));
    }

    #[test]
    fn get_missing_is_key_not_found() {
        let c = Container::new();
        assert!(matches!(c.get("nope"), Err(ConstructError::KeyNotFound(k)) if k == "nope"));
    }

    #[test]
    fn equality_ignores_order_and_private_entries() {
        let a = crate::container! { "a" => 1, "b" => 2, "_io" => 99 };
        let b = crate::container! { "b" => 2, "a" => 1 };
        assert_eq!(a, b);
        assert_ne!(a, crate::container! { "a" => 1 });
        assert_ne!(crate::container! { "a" => 1 }, a);

        let mut plain = IndexMap::new();
        plain.insert("a".to_string(), Value::Int(1));
        plain.insert("b".to_string(), Value::Int(2));
        assert_eq!(a, plain);
    }

    #[test]
    fn merge_preserves_order_and_overwrites_in_place() {
        let mut c = crate::container! { "x" => 0, "y" => 0 };
        c.merge([("z", 3), ("x", 1), ("w", 4)]);
        assert_eq!(c.keys().collect::<Vec<_>>(), ["x", "y", "z", "w"]);
        assert_eq!(c["x"], Value::Int(1));
    }

    #[test]
    fn field_names_do_not_shadow_operations() {
        let c = crate::container! { "items" => 1, "merge" => 2, "len" => 3 };
        assert_eq!(c.len(), 3);
        assert_eq!(c.iter().count(), 3);
    }

    #[test]
    fn json_roundtrip_reproduces_equal_container() {
        let nested = crate::container! {
            "a" => 1,
            "b" => Container::new(),
            "c" => "text",
            "d" => crate::container! { "e" => vec![Value::from(4), Value::from(b"\x00\x01")] },
            "_private" => true,
        };
        let bytes = nested.to_json_bytes().unwrap();
        let back = Container::from_json_bytes(&bytes).unwrap();
        assert_eq!(back, nested);
        assert_eq!(back.keys().collect::<Vec<_>>(), ["a", "b", "c", "d", "_private"]);
        assert_eq!(back["_private"], Value::Bool(true));
    }
}
