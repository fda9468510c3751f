//! Deduplicating registry of named classification records.
//!
//! A `LookupTable` maps symbolic names (e.g. tile kinds) to records stored in
//! stable slots. Layers store the slot index per cell, so a record's index
//! must never change while any cell still references it.
//!
//! ## Derived records
//!
//! `get_derived` produces "the base record with these fields overridden"
//! without creating duplicate records for equal variants. Each distinct
//! override key is interned to an ordinal the first time it is seen; the
//! derived record is named `{base}-d{ordinal}-{ordinal}...` and found by
//! that name on later calls. Derivation is O(number of overrides) and never
//! compares whole records.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

/// A record that can live in a `LookupTable`.
///
/// The table owns `name` and `index`; implementors only store them.
pub trait Record: Clone {
    /// Small hashable key describing one field override.
    type Override: Clone + Debug + Eq + Hash;

    fn name(&self) -> &str;
    fn index(&self) -> usize;
    fn set_identity(&mut self, name: &str, index: usize);

    /// True when the record already holds the value the override would write.
    fn has_override(&self, value: &Self::Override) -> bool;
    fn apply_override(&mut self, value: &Self::Override);
}

/// Hook that fills defaults on every record as it is added.
pub type Normalizer<R> = fn(&mut R);

/// Slot-stable table of records addressed by index or by name.
#[derive(Debug, Clone)]
pub struct LookupTable<R: Record> {
    slots: Vec<Option<R>>,
    free: VecDeque<usize>,
    names: HashMap<String, usize>,
    normalize: Option<Normalizer<R>>,
    override_ids: HashMap<R::Override, usize>,
}

impl<R: Record> Default for LookupTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> LookupTable<R> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            names: HashMap::new(),
            normalize: None,
            override_ids: HashMap::new(),
        }
    }

    /// Table whose records all pass through `normalize` when added.
    pub fn with_normalizer(normalize: Normalizer<R>) -> Self {
        Self {
            normalize: Some(normalize),
            ..Self::new()
        }
    }

    /// Preload named records in order.
    pub fn with_table<N, I>(mut self, table: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, R)>,
    {
        for (name, record) in table {
            self.add_named(name, record);
        }
        self
    }

    /// Add a record under its own name and return its index.
    pub fn add(&mut self, record: R) -> usize {
        let name = record.name().to_string();
        self.add_named(name, record)
    }

    /// Add a record under `name`, reusing the oldest freed slot if any.
    pub fn add_named(&mut self, name: impl Into<String>, mut record: R) -> usize {
        let name = name.into();
        let index = match self.free.pop_front() {
            Some(i) => i,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        if let Some(normalize) = self.normalize {
            normalize(&mut record);
        }
        record.set_identity(&name, index);
        self.slots[index] = Some(record);
        self.names.insert(name, index);
        index
    }

    pub fn get(&self, index: usize) -> Option<&R> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn index_for_name(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// Name → index map of every live record.
    pub fn keys(&self) -> &HashMap<String, usize> {
        &self.names
    }

    /// Index of the record equal to `base` with `overrides` applied.
    ///
    /// Overrides the base already satisfies are ignored, so a no-op
    /// derivation returns `base` itself. The order of `overrides` does not
    /// matter. An unknown `base` is returned
    /// unchanged; callers are expected to pass indices they obtained from
    /// this table.
    pub fn get_derived(&mut self, base: usize, overrides: &[R::Override]) -> usize {
        let Some(base_record) = self.slots.get(base).and_then(Option::as_ref) else {
            return base;
        };

        let mut deltas = Vec::with_capacity(overrides.len());
        for value in overrides {
            if base_record.has_override(value) {
                continue;
            }
            let next = self.override_ids.len();
            let id = *self.override_ids.entry(value.clone()).or_insert(next);
            deltas.push((id, value));
        }
        if deltas.is_empty() {
            return base;
        }
        // Same set of overrides, same record, whatever the order passed in.
        deltas.sort_by_key(|(id, _)| *id);
        deltas.dedup_by_key(|(id, _)| *id);

        let ids: Vec<String> = deltas.iter().map(|(id, _)| id.to_string()).collect();
        let derived_name = format!("{}-d{}", base_record.name(), ids.join("-"));
        if let Some(index) = self.index_for_name(&derived_name) {
            return index;
        }

        let mut derived = base_record.clone();
        for (_, value) in &deltas {
            derived.apply_override(value);
        }
        self.add_named(derived_name, derived)
    }

    /// Free `index` for reuse and forget every name pointing at it.
    ///
    /// Callers must make sure no layer cell still stores the index.
    pub fn remove(&mut self, index: usize) -> Option<R> {
        let record = self.slots.get_mut(index)?.take()?;
        self.free.push_back(index);
        self.names.retain(|_, i| *i != index);
        Some(record)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.slots.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Kind {
        name: String,
        index: usize,
        solid: bool,
        weight: u32,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum KindOverride {
        Solid(bool),
        Weight(u32),
    }

    impl Record for Kind {
        type Override = KindOverride;

        fn name(&self) -> &str {
            &self.name
        }
        fn index(&self) -> usize {
            self.index
        }
        fn set_identity(&mut self, name: &str, index: usize) {
            self.name = name.to_string();
            self.index = index;
        }
        fn has_override(&self, value: &KindOverride) -> bool {
            match value {
                KindOverride::Solid(s) => self.solid == *s,
                KindOverride::Weight(w) => self.weight == *w,
            }
        }
        fn apply_override(&mut self, value: &KindOverride) {
            match value {
                KindOverride::Solid(s) => self.solid = *s,
                KindOverride::Weight(w) => self.weight = *w,
            }
        }
    }

    fn kind(solid: bool) -> Kind {
        Kind { solid, ..Default::default() }
    }

    fn table() -> LookupTable<Kind> {
        LookupTable::new().with_table([("dirt", kind(false)), ("stone", kind(true))])
    }

    #[test]
    fn test_add_assigns_identity() {
        let t = table();
        assert_eq!(t.index_for_name("dirt"), Some(0));
        assert_eq!(t.index_for_name("stone"), Some(1));
        let stone = t.get(1).unwrap();
        assert_eq!(stone.name, "stone");
        assert_eq!(stone.index, 1);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_normalizer_runs_on_add() {
        let mut t = LookupTable::with_normalizer(|k: &mut Kind| {
            if k.weight == 0 {
                k.weight = if k.solid { 10 } else { 1 };
            }
        });
        let i = t.add_named("stone", kind(true));
        assert_eq!(t.get(i).unwrap().weight, 10);
    }

    #[test]
    fn test_derived_is_memoized() {
        let mut t = table();
        let a = t.get_derived(0, &[KindOverride::Weight(5)]);
        let b = t.get_derived(0, &[KindOverride::Weight(5)]);
        assert_eq!(a, b);
        assert_ne!(a, 0);
        assert_eq!(t.get(a).unwrap().weight, 5);
        assert_eq!(t.get(a).unwrap().name, "dirt-d0");

        let c = t.get_derived(0, &[KindOverride::Weight(6)]);
        assert_ne!(a, c);
        assert_eq!(t.get(c).unwrap().name, "dirt-d1");
    }

    #[test]
    fn test_derived_noop_returns_base() {
        let mut t = table();
        assert_eq!(t.get_derived(1, &[KindOverride::Solid(true)]), 1);
        assert_eq!(t.get_derived(1, &[]), 1);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_derived_multiple_overrides() {
        let mut t = table();
        let i = t.get_derived(0, &[KindOverride::Solid(true), KindOverride::Weight(3)]);
        let derived = t.get(i).unwrap();
        assert!(derived.solid);
        assert_eq!(derived.weight, 3);
        assert_eq!(derived.name, "dirt-d0-1");
        // Base is untouched.
        assert!(!t.get(0).unwrap().solid);
    }

    #[test]
    fn test_derived_ignores_override_order() {
        let mut t = table();
        // Intern Weight first so its id sorts before Solid's.
        let heavy = t.get_derived(0, &[KindOverride::Weight(4)]);
        let a = t.get_derived(0, &[KindOverride::Solid(true), KindOverride::Weight(4)]);
        let b = t.get_derived(0, &[KindOverride::Weight(4), KindOverride::Solid(true)]);
        assert_eq!(a, b);
        assert_ne!(a, heavy);
        assert_eq!(t.get(a).unwrap().name, "dirt-d0-1");
        assert_eq!(t.len(), 4);

        let dup = t.get_derived(0, &[KindOverride::Weight(4), KindOverride::Weight(4)]);
        assert_eq!(dup, heavy);
    }

    #[test]
    fn test_derived_unknown_base_is_returned() {
        let mut t = table();
        assert_eq!(t.get_derived(99, &[KindOverride::Weight(1)]), 99);
    }

    #[test]
    fn test_remove_recycles_slot() {
        let mut t = table();
        let removed = t.remove(0).unwrap();
        assert_eq!(removed.name, "dirt");
        assert_eq!(t.index_for_name("dirt"), None);
        assert!(t.get(0).is_none());

        let i = t.add_named("mud", kind(false));
        assert_eq!(i, 0);
        assert_eq!(t.get(0).unwrap().name, "mud");
        assert!(t.remove(42).is_none());
    }
}
