//! Ternary prefix trie: the internal representation of program identifiers.
//!
//! The symbol table is filled while reading the source text, one character
//! at a time. Each node holds one character of a key plus three child links:
//! `next` advances along the key, `left`/`right` step to a smaller/greater
//! sibling character. Children are indices rather than pointers, so the
//! structure can live in one flat array.
//!
//! Keys are `u32` code points, not `char`: local-variable scoping hangs
//! sentence separators *above* the Unicode range off a function's node, and
//! module namespaces hang their exports off an ASCII space edge.

use crate::heap::CellId;

/// Addresses trie nodes.
///
/// Index 0 is the permanent root slot, kept at `chr: 0` so that every real
/// key compares greater and first-character insertions land off its `right`
/// link. A child link of 0 means "absent" (nothing can link back to the
/// root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TrieId(u32);

impl TrieId {
    pub const ROOT: Self = Self(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a key resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    /// Referenced but not yet defined.
    #[default]
    Undefined,
    /// A native function; the payload is an ordinal into the library table.
    MachineCode,
    /// A translated function; the payload is the cell index of its first
    /// opcode.
    ByteCode,
    /// An empty function; the payload is a unique small integer.
    /// Payload 0 marks a module-name placeholder.
    Enum,
}

/// The value associated with a key: a 4-bit kind and a 28-bit payload,
/// packed exactly like the original machine word when raw form is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Value {
    pub kind: ValueKind,
    pub index: u32,
}

impl Value {
    pub const UNDEFINED: Self = Self { kind: ValueKind::Undefined, index: 0 };

    pub fn machine_code(ordinal: u32) -> Self {
        Self { kind: ValueKind::MachineCode, index: ordinal }
    }

    pub fn byte_code(cell: CellId) -> Self {
        Self { kind: ValueKind::ByteCode, index: cell.raw() }
    }

    pub fn enumeration(id: u32) -> Self {
        Self { kind: ValueKind::Enum, index: id }
    }

    #[inline]
    pub fn is_undefined(self) -> bool {
        self.kind == ValueKind::Undefined
    }

    /// The packed 32-bit form: kind in the low 4 bits, payload above.
    pub fn raw(self) -> u32 {
        (self.kind as u32) | (self.index << 4)
    }

    /// The cell a byte-code value points at.
    pub fn cell(self) -> CellId {
        CellId::new(self.index)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    chr: u32,
    next: u32,
    left: u32,
    right: u32,
    val: Value,
}

/// The prefix trie.
#[derive(Debug)]
pub struct Trie {
    nodes: Vec<Node>,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        // The zero node is the root slot and stays at chr 0.
        Self { nodes: vec![Node::default()] }
    }

    /// Number of nodes; never decreases while translating.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True while no key has been inserted.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn value(&self, id: TrieId) -> Value {
        self.nodes[id.index()].val
    }

    pub fn set_value(&mut self, id: TrieId, val: Value) {
        self.nodes[id.index()].val = val;
    }

    /// Allocates a detached node for `chr`; the caller links it in.
    fn new_node(&mut self, chr: u32) -> TrieId {
        let id = TrieId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(Node { chr, ..Node::default() });
        id
    }

    /// Finds (inserting if absent) the node for `chr`, searching the sibling
    /// tree rooted at `idx`.
    pub fn insert_at(&mut self, idx: TrieId, chr: u32) -> TrieId {
        let mut idx = idx;
        loop {
            let node = self.nodes[idx.index()];
            if chr == node.chr {
                return idx;
            }
            if chr > node.chr {
                if node.right != 0 {
                    idx = TrieId(node.right);
                } else {
                    let new = self.new_node(chr);
                    self.nodes[idx.index()].right = new.0;
                    return new;
                }
            } else if node.left != 0 {
                idx = TrieId(node.left);
            } else {
                let new = self.new_node(chr);
                self.nodes[idx.index()].left = new.0;
                return new;
            }
        }
    }

    /// Finds (inserting if absent) the node for the first character of a key.
    pub fn insert_first(&mut self, chr: u32) -> TrieId {
        self.insert_at(TrieId::ROOT, chr)
    }

    /// Finds (inserting if absent) the node for the next character of a key.
    pub fn insert_next(&mut self, idx: TrieId, chr: u32) -> TrieId {
        let next = self.nodes[idx.index()].next;
        if next != 0 {
            return self.insert_at(TrieId(next), chr);
        }
        let new = self.new_node(chr);
        self.nodes[idx.index()].next = new.0;
        new
    }

    /// Looks `chr` up in the sibling tree rooted at `idx`.
    pub fn find_at(&self, idx: TrieId, chr: u32) -> Option<TrieId> {
        let mut idx = idx;
        loop {
            let node = self.nodes[idx.index()];
            if chr == node.chr {
                return Some(idx);
            }
            let link = if chr > node.chr { node.right } else { node.left };
            if link == 0 {
                return None;
            }
            idx = TrieId(link);
        }
    }

    pub fn find_first(&self, chr: u32) -> Option<TrieId> {
        self.find_at(TrieId::ROOT, chr)
    }

    pub fn find_next(&self, idx: TrieId, chr: u32) -> Option<TrieId> {
        let next = self.nodes[idx.index()].next;
        if next == 0 {
            return None;
        }
        self.find_at(TrieId(next), chr)
    }

    /// Resolves a whole key from the root. Missing keys read as undefined.
    pub fn get_value(&self, key: &str) -> Value {
        let mut chars = key.chars();
        let Some(first) = chars.next() else {
            return Value::UNDEFINED;
        };
        let Some(mut idx) = self.find_first(first as u32) else {
            return Value::UNDEFINED;
        };
        for chr in chars {
            match self.find_next(idx, chr as u32) {
                Some(next) => idx = next,
                None => return Value::UNDEFINED,
            }
        }
        self.value(idx)
    }

    /// Overwrites the node at `dst` with the node at `src`, aliasing the
    /// source's subtree. Used to link a module's local name for another
    /// module to the globally translated one.
    pub fn copy_node(&mut self, dst: TrieId, src: TrieId) {
        self.nodes[dst.index()] = self.nodes[src.index()];
    }

    /// Visits every key whose characters all fit in Unicode (synthetic
    /// local-variable separators are above the range and end the descent),
    /// passing the accumulated key and the node's value.
    pub fn for_each_key(&self, mut visit: impl FnMut(&str, Value)) {
        let mut key = String::new();
        self.walk(TrieId::ROOT, &mut key, &mut visit);
    }

    fn walk(&self, idx: TrieId, key: &mut String, visit: &mut impl FnMut(&str, Value)) {
        let node = self.nodes[idx.index()];
        if node.left != 0 {
            self.walk(TrieId(node.left), key, visit);
        }
        // chr 0 is the root slot, which carries no key character.
        if node.chr != 0 {
            if let Some(chr) = char::from_u32(node.chr) {
                key.push(chr);
                if !node.val.is_undefined() {
                    visit(key, node.val);
                }
                if node.next != 0 {
                    self.walk(TrieId(node.next), key, visit);
                }
                key.pop();
            }
        }
        if node.right != 0 {
            self.walk(TrieId(node.right), key, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_key(trie: &mut Trie, key: &str) -> TrieId {
        let mut chars = key.chars();
        let mut idx = trie.insert_first(chars.next().unwrap() as u32);
        for chr in chars {
            idx = trie.insert_next(idx, chr as u32);
        }
        idx
    }

    #[test]
    fn missing_key_reads_as_undefined() {
        let trie = Trie::new();
        assert_eq!(trie.get_value("Go"), Value::UNDEFINED);
    }

    #[test]
    fn the_root_slot_stays_a_sentinel() {
        let mut trie = Trie::new();
        assert_eq!(trie.len(), 1);
        assert!(trie.is_empty());
        let go = insert_key(&mut trie, "Go");
        assert_ne!(go, TrieId::ROOT);
        assert!(!trie.is_empty());
        // The zero node never carries a key character or a value.
        assert_eq!(trie.value(TrieId::ROOT), Value::UNDEFINED);
        assert_eq!(trie.get_value("Go"), Value::UNDEFINED);
        trie.set_value(go, Value::enumeration(1));
        assert_eq!(trie.get_value("Go"), Value::enumeration(1));
    }

    #[test]
    fn inserted_keys_resolve() {
        let mut trie = Trie::new();
        let go = insert_key(&mut trie, "Go");
        trie.set_value(go, Value::enumeration(7));
        let gopher = insert_key(&mut trie, "Gopher");
        trie.set_value(gopher, Value::machine_code(3));
        assert_eq!(trie.get_value("Go"), Value::enumeration(7));
        assert_eq!(trie.get_value("Gopher"), Value::machine_code(3));
        assert_eq!(trie.get_value("Gop"), Value::UNDEFINED);
        assert_eq!(trie.get_value("G"), Value::UNDEFINED);
    }

    #[test]
    fn sibling_order_does_not_matter() {
        let mut trie = Trie::new();
        for (i, name) in ["m", "a", "z", "Prout", "prout"].iter().enumerate() {
            let idx = insert_key(&mut trie, name);
            trie.set_value(idx, Value::enumeration(i as u32 + 1));
        }
        for (i, name) in ["m", "a", "z", "Prout", "prout"].iter().enumerate() {
            assert_eq!(trie.get_value(name), Value::enumeration(i as u32 + 1), "{name}");
        }
    }

    #[test]
    fn reinsertion_finds_the_same_node() {
        let mut trie = Trie::new();
        let a = insert_key(&mut trie, "Fn");
        let grown = trie.len();
        let b = insert_key(&mut trie, "Fn");
        assert_eq!(a, b);
        assert_eq!(trie.len(), grown);
    }

    #[test]
    fn node_count_is_monotonic() {
        let mut trie = Trie::new();
        let mut last = trie.len();
        for name in ["Go", "go", "Prout", "Print", "m", "м"] {
            insert_key(&mut trie, name);
            assert!(trie.len() >= last);
            last = trie.len();
        }
    }

    #[test]
    fn separator_code_points_are_skipped_by_the_walk() {
        let mut trie = Trie::new();
        let f = insert_key(&mut trie, "F");
        trie.set_value(f, Value::byte_code(CellId::NIL));
        // A local variable under the synthetic separator.
        let sep = trie.insert_next(f, 0x0011_0000);
        let local = trie.insert_next(sep, u32::from('s'));
        trie.set_value(local, Value::enumeration(0));
        let mut seen = Vec::new();
        trie.for_each_key(|key, _| seen.push(key.to_owned()));
        assert_eq!(seen, vec!["F".to_owned()]);
    }

    #[test]
    fn packed_raw_form_keeps_kind_and_payload() {
        let val = Value { kind: ValueKind::ByteCode, index: 12345 };
        assert_eq!(val.raw() & 0xf, ValueKind::ByteCode as u32);
        assert_eq!(val.raw() >> 4, 12345);
    }
}
