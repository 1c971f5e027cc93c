//! Identifier interning.
//!
//! The translator borrows identifier text from the source buffer only while
//! scanning; anything that must outlive translation — atom payloads,
//! diagnostics for late fix-ups, runtime printing of identifiers — goes
//! through the interner. Interned strings are stored once and addressed by
//! `AtomId`, so cells stay `Copy` and comparison is an integer compare.
//!
//! The interner also keeps the reverse registry from a symbol-table value to
//! the name it was defined under, which is what lets the runtime and the
//! renderer print an `identifier` cell.

use ahash::AHashMap;

use crate::trie::Value;

/// Index into the interner's storage.
///
/// `u32` keeps the cell payload small; four billion distinct identifiers is
/// plenty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomId(u32);

impl AtomId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Interned identifier strings plus the value→name registry.
#[derive(Debug, Default)]
pub struct Interns {
    strings: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, AtomId>,
    names: AHashMap<u32, AtomId>,
}

impl Interns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Returns the id for `text`, storing it on first sight.
    pub fn intern(&mut self, text: &str) -> AtomId {
        if let Some(&id) = self.lookup.get(text) {
            return id;
        }
        let id = AtomId(u32::try_from(self.strings.len()).unwrap_or(u32::MAX));
        let boxed: Box<str> = text.into();
        self.strings.push(boxed.clone());
        self.lookup.insert(boxed, id);
        id
    }

    /// The text behind an id.
    pub fn get(&self, id: AtomId) -> &str {
        &self.strings[id.index()]
    }

    /// Remembers that `val` was defined under `name`.
    ///
    /// A name is registered again when its value changes kind (an empty
    /// function upgraded to byte code keeps both entries live).
    pub fn register_name(&mut self, val: Value, name: &str) {
        let atom = self.intern(name);
        self.names.insert(val.raw(), atom);
    }

    /// The name a value was defined under, if any.
    pub fn name_of(&self, val: Value) -> Option<&str> {
        self.names.get(&val.raw()).map(|&id| self.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::{Value, ValueKind};

    #[test]
    fn interning_deduplicates() {
        let mut interns = Interns::new();
        let a = interns.intern("Prout");
        let b = interns.intern("Prout");
        let c = interns.intern("Print");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interns.len(), 2);
        assert_eq!(interns.get(a), "Prout");
    }

    #[test]
    fn registry_resolves_values_to_names() {
        let mut interns = Interns::new();
        let val = Value { kind: ValueKind::MachineCode, index: 4 };
        interns.register_name(val, "Add");
        assert_eq!(interns.name_of(val), Some("Add"));
        assert_eq!(interns.name_of(Value { kind: ValueKind::MachineCode, index: 5 }), None);
    }
}
