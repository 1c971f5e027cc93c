//! Canonical rendering of translated programs back to source text.
//!
//! Every byte-code function is written out in a normal form: one space
//! between lexemes, character runs re-quoted, variables spelled by their
//! slot (`s.0`, `e.1`, …), callees and identifier operands resolved to
//! names through the interner registry. Translating the rendered text
//! yields the same opcode shapes again, which is what the round-trip tests
//! lean on; it also makes a handy disassembler when poking at the machine.

use crate::{
    heap::{CellId, Heap, Item},
    intern::Interns,
    trie::{Trie, Value, ValueKind},
};

/// Renders all byte-code functions of the program, in definition order.
pub fn render_program(vm: &Heap, ids: &Trie, interns: &Interns) -> String {
    let mut functions: Vec<(String, Value)> = Vec::new();
    ids.for_each_key(|key, val| {
        // Keys with a space are module-private paths; the importing scope
        // holds its own entry for anything visible.
        if val.kind == ValueKind::ByteCode && !key.contains(' ') {
            functions.push((key.to_owned(), val));
        }
    });
    functions.sort_by_key(|&(_, val)| val.index);
    functions.dedup_by_key(|&mut (_, val)| val.raw());
    let mut out = String::new();
    for (name, val) in &functions {
        render_function(vm, interns, name, *val, &mut out);
    }
    out
}

fn render_function(vm: &Heap, interns: &Interns, name: &str, val: Value, out: &mut String) {
    let start = CellId::new(val.index);
    if matches!(vm.item(start), Item::Sentence(_)) {
        out.push_str(name);
        out.push_str(" {\n");
        let mut marker = start;
        loop {
            let (lexemes, terminator) = sentence_lexemes(vm, interns, vm.next(marker));
            out.push_str("    ");
            out.push_str(&lexemes.join(" "));
            out.push_str(";\n");
            match vm.item(terminator) {
                Item::Sentence(_) => marker = terminator,
                _ => break,
            }
        }
        out.push_str("}\n");
    } else {
        let (lexemes, _) = sentence_lexemes(vm, interns, start);
        out.push_str(name);
        out.push(' ');
        out.push_str(&lexemes.join(" "));
        out.push_str(" ;\n");
    }
}

/// Collects the lexemes of one sentence (pattern, `=`, result), stopping at
/// the next sentence marker or the completion opcode.
fn sentence_lexemes(vm: &Heap, interns: &Interns, from: CellId) -> (Vec<String>, CellId) {
    let mut lexemes = Vec::new();
    let mut chars = String::new();
    let mut at = from;
    loop {
        let item = vm.item(at);
        if matches!(item, Item::Sentence(_) | Item::Complete) {
            flush_chars(&mut chars, &mut lexemes);
            return (lexemes, at);
        }
        if let Item::Char(c) = item {
            push_escaped(&mut chars, c);
            at = vm.next(at);
            continue;
        }
        flush_chars(&mut chars, &mut lexemes);
        match item {
            Item::Number(n) => lexemes.push(n.to_string()),
            Item::Atom(a) => lexemes.push(interns.get(a).to_owned()),
            Item::Identifier(v) => lexemes.push(value_name(interns, v)),
            Item::Svar(slot) => lexemes.push(format!("s.{slot}")),
            Item::Tvar(slot) => lexemes.push(format!("t.{slot}")),
            Item::Evar(slot) => lexemes.push(format!("e.{slot}")),
            Item::OpenBracket(_) => lexemes.push("(".to_owned()),
            Item::CloseBracket(_) => lexemes.push(")".to_owned()),
            Item::Equal => lexemes.push("=".to_owned()),
            Item::OpenCall(v) => {
                lexemes.push("<".to_owned());
                lexemes.push(value_name(interns, callee_of(vm, v)));
            }
            Item::Execute(_) => lexemes.push(">".to_owned()),
            Item::Undefined | Item::Char(_) | Item::Sentence(_) | Item::Complete => {}
        }
        at = vm.next(at);
    }
}

/// The callee of an opening bracket: resolved in place, or carried by the
/// paired `execute` cell when fix-up bound it there.
fn callee_of(vm: &Heap, v: Value) -> Value {
    if !v.is_undefined() {
        return v;
    }
    match vm.item(CellId::new(v.index)) {
        Item::Execute(callee) => callee,
        _ => v,
    }
}

fn value_name(interns: &Interns, v: Value) -> String {
    match interns.name_of(v) {
        Some(name) => name.to_owned(),
        None => format!("#{}", v.raw()),
    }
}

fn push_escaped(chars: &mut String, c: char) {
    match c {
        '\'' => chars.push_str("\\'"),
        '\\' => chars.push_str("\\\\"),
        '\t' => chars.push_str("\\t"),
        '\n' => chars.push_str("\\n"),
        '\r' => chars.push_str("\\r"),
        c => chars.push(c),
    }
}

fn flush_chars(chars: &mut String, lexemes: &mut Vec<String>) {
    if !chars.is_empty() {
        lexemes.push(format!("'{chars}'"));
        chars.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        intern::Interns,
        library,
        message::CollectMessages,
        parse::{TranslatorConfig, translate_text},
    };

    fn translated(source: &str) -> (Heap, Trie, Interns) {
        let mut vm = Heap::new();
        let mut ids = Trie::new();
        let mut interns = Interns::new();
        library::register(&mut ids, &mut interns);
        let mut sink = CollectMessages::new();
        translate_text(&TranslatorConfig::default(), &mut vm, &mut ids, &mut interns, source, &mut sink)
            .expect("test source translates");
        (vm, ids, interns)
    }

    #[test]
    fn renders_a_simple_function() {
        let (vm, ids, interns) = translated("Go = <Prout 'ok'>;");
        let text = render_program(&vm, &ids, &interns);
        assert_eq!(text, "Go = < Prout 'ok' > ;\n");
    }

    #[test]
    fn renders_blocks_and_variables() {
        let (vm, ids, interns) = translated("Dup { e.X = e.X e.X; };");
        let text = render_program(&vm, &ids, &interns);
        assert_eq!(text, "Dup {\n    e.0 = e.0 e.0;\n}\n");
    }

    #[test]
    fn round_trip_is_idempotent() {
        let source = "\
F { 'a' s.1 = 1; 'b' e.2 = <F e.2>; }\n\
Go = <Prout (F '12') \"q'q\">;\n\
Fwd = <Later 3 4>;\n\
Later = <Add 1 2>;\n";
        let (vm, ids, interns) = translated(source);
        let first = render_program(&vm, &ids, &interns);
        let (vm2, ids2, interns2) = translated(&first);
        let second = render_program(&vm2, &ids2, &interns2);
        assert_eq!(first, second);
    }

    #[test]
    fn escapes_survive_the_round_trip() {
        let (vm, ids, interns) = translated("Go = <Prout 'a\\'b\\\\c\\td'>;");
        let first = render_program(&vm, &ids, &interns);
        let (vm2, ids2, interns2) = translated(&first);
        let second = render_program(&vm2, &ids2, &interns2);
        assert_eq!(first, second);
    }
}
