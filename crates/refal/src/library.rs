//! Built-in functions of the REFAL machine.
//!
//! The base library holds the operations that are awkward to express in
//! REFAL itself: I/O, integer arithmetic, and symbol/number conversions.
//! Every function receives the machine memory and the bounds of the
//! subexpression it was called on — the cells strictly between `prev` and
//! `next` — and rewrites that range in place.
//!
//! At startup [`register`] enters every name into the symbol table as
//! machine code with its table ordinal; the interpreter dispatches back
//! through [`call`], which rejects out-of-range ordinals.

use std::io;

use strum::{Display, EnumString, FromRepr, IntoStaticStr, VariantArray};
use thiserror::Error;

use crate::{
    heap::{CellId, Heap, HeapError, Item},
    intern::Interns,
    trie::{Trie, Value},
};

/// Failure of a native function.
#[derive(Debug, Error)]
pub enum NativeError {
    /// The subexpression does not match what the function expects.
    #[error("recognition impossible")]
    Unrecognized,
    /// An ordinal with no table entry; a corrupted opcode stream.
    #[error("unknown native function ordinal {0}")]
    BadOrdinal(u32),
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type NativeResult = Result<(), NativeError>;

/// Everything a native function may touch.
pub struct NativeCtx<'a> {
    pub vm: &'a mut Heap,
    pub interns: &'a Interns,
    pub out: &'a mut dyn io::Write,
    pub input: &'a mut dyn io::BufRead,
}

/// The built-in function table. Declaration order is the dispatch ordinal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, FromRepr, VariantArray,
)]
#[repr(u32)]
pub enum Builtin {
    Card,
    Print,
    Prout,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Compare,
    Type,
    Numb,
    Symb,
    Chr,
    Ord,
}

/// Enters every built-in into the symbol table as `{machine-code, ordinal}`
/// and registers the printable names. Returns the number imported.
pub fn register(ids: &mut Trie, interns: &mut Interns) -> usize {
    for (ordinal, builtin) in Builtin::VARIANTS.iter().enumerate() {
        let name: &'static str = builtin.into();
        let mut chars = name.chars();
        let mut idx = ids.insert_first(chars.next().expect("builtin names are not empty") as u32);
        for chr in chars {
            idx = ids.insert_next(idx, chr as u32);
        }
        let val = Value::machine_code(ordinal as u32);
        ids.set_value(idx, val);
        interns.register_name(val, name);
    }
    Builtin::VARIANTS.len()
}

/// Dispatches a `machine-code` ordinal over the range `(prev, next)`.
pub fn call(ordinal: u32, ctx: &mut NativeCtx<'_>, prev: CellId, next: CellId) -> NativeResult {
    let Some(builtin) = Builtin::from_repr(ordinal) else {
        return Err(NativeError::BadOrdinal(ordinal));
    };
    match builtin {
        Builtin::Card => card(ctx, prev, next),
        Builtin::Print => {
            writeln!(ctx.out, "{}", format_view(ctx.vm, ctx.interns, prev, next))?;
            Ok(())
        }
        Builtin::Prout => {
            writeln!(ctx.out, "{}", format_view(ctx.vm, ctx.interns, prev, next))?;
            ctx.vm.free_evar(prev, next);
            Ok(())
        }
        Builtin::Add => arithmetic(ctx.vm, prev, next, |x, y| x.wrapping_add(y)),
        Builtin::Sub => arithmetic(ctx.vm, prev, next, |x, y| x.wrapping_sub(y)),
        Builtin::Mul => arithmetic(ctx.vm, prev, next, |x, y| x.wrapping_mul(y)),
        // A division error yields macrodigit 0.
        Builtin::Div => {
            arithmetic(ctx.vm, prev, next, |x, y| if y == 0 { 0 } else { x.wrapping_div(y) })
        }
        Builtin::Mod => {
            arithmetic(ctx.vm, prev, next, |x, y| if y == 0 { 0 } else { x.wrapping_rem(y) })
        }
        Builtin::Compare => compare(ctx.vm, prev, next),
        Builtin::Type => type_of(ctx.vm, prev, next),
        Builtin::Numb => numb(ctx.vm, prev, next),
        Builtin::Symb => symb(ctx.vm, prev, next),
        Builtin::Chr => chr(ctx.vm, prev, next),
        Builtin::Ord => ord(ctx.vm, prev, next),
    }
}

/// Renders a fully evaluated subexpression the way `Prout` prints it:
/// character symbols run together, other symbols are space-separated,
/// brackets print bare.
pub fn format_view(vm: &Heap, interns: &Interns, prev: CellId, next: CellId) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    // A space goes only between two adjacent word-like symbols, so that
    // character runs print verbatim.
    let mut word = false;
    for i in vm.range(prev, next) {
        match vm.item(i) {
            Item::Char(c) => {
                out.push(c);
                word = false;
            }
            Item::Number(n) => {
                if word {
                    out.push(' ');
                }
                let _ = write!(out, "{n}");
                word = true;
            }
            Item::Atom(a) => {
                if word {
                    out.push(' ');
                }
                out.push_str(interns.get(a));
                word = true;
            }
            Item::Identifier(v) => {
                if word {
                    out.push(' ');
                }
                match interns.name_of(v) {
                    Some(name) => out.push_str(name),
                    None => {
                        let _ = write!(out, "#{}", v.raw());
                    }
                }
                word = true;
            }
            Item::OpenBracket(_) => {
                out.push('(');
                word = false;
            }
            Item::CloseBracket(_) => {
                out.push(')');
                word = false;
            }
            // Opcodes do not occur in an evaluated subexpression.
            _ => {}
        }
    }
    out
}

/// Replaces the range contents with cells formed by `fill`.
fn replace_view(
    vm: &mut Heap,
    prev: CellId,
    next: CellId,
    fill: impl FnOnce(&mut Heap) -> Result<(), HeapError>,
) -> NativeResult {
    if !vm.is_evar_empty(prev, next) {
        vm.free_evar(prev, next);
    }
    let mark = vm.last_allocated();
    fill(vm)?;
    if vm.last_allocated() != mark {
        let first = vm.next(mark);
        vm.insert_next(prev, first);
    }
    Ok(())
}

/// `<Card>` — the next line of input as character symbols, or macrodigit 0
/// at end of input.
fn card(ctx: &mut NativeCtx<'_>, prev: CellId, next: CellId) -> NativeResult {
    let mut line = String::new();
    let read = ctx.input.read_line(&mut line)?;
    let vm = &mut *ctx.vm;
    replace_view(vm, prev, next, |vm| {
        if read == 0 {
            vm.alloc_value(Item::Number(0))?;
            return Ok(());
        }
        let text = line.strip_suffix('\n').unwrap_or(&line);
        let text = text.strip_suffix('\r').unwrap_or(text);
        for c in text.chars() {
            vm.alloc_value(Item::Char(c))?;
        }
        Ok(())
    })
}

fn two_numbers(vm: &Heap, prev: CellId, next: CellId) -> Option<(i64, i64)> {
    let mut cells = vm.range(prev, next);
    let a = cells.next()?;
    let b = cells.next()?;
    if cells.next().is_some() {
        return None;
    }
    match (vm.item(a), vm.item(b)) {
        (Item::Number(x), Item::Number(y)) => Some((x, y)),
        _ => None,
    }
}

fn arithmetic(
    vm: &mut Heap,
    prev: CellId,
    next: CellId,
    op: impl FnOnce(i64, i64) -> i64,
) -> NativeResult {
    let (x, y) = two_numbers(vm, prev, next).ok_or(NativeError::Unrecognized)?;
    let result = op(x, y);
    replace_view(vm, prev, next, |vm| vm.alloc_value(Item::Number(result)).map(|_| ()))
}

/// `<Compare s.X s.Y>` — `'-'`, `'0'` or `'+'`.
fn compare(vm: &mut Heap, prev: CellId, next: CellId) -> NativeResult {
    let (x, y) = two_numbers(vm, prev, next).ok_or(NativeError::Unrecognized)?;
    let sign = match x.cmp(&y) {
        std::cmp::Ordering::Less => '-',
        std::cmp::Ordering::Equal => '0',
        std::cmp::Ordering::Greater => '+',
    };
    replace_view(vm, prev, next, |vm| vm.alloc_value(Item::Char(sign)).map(|_| ()))
}

/// `<Type e.X>` — prepends one symbol classifying the first element.
fn type_of(vm: &mut Heap, prev: CellId, next: CellId) -> NativeResult {
    let first = vm.next(prev);
    let tag = if first == next {
        '*'
    } else {
        match vm.item(first) {
            Item::Number(_) => 'N',
            Item::Char(c) if c.is_ascii_digit() => 'D',
            Item::Char(c) if c.is_alphabetic() => 'L',
            Item::Char(_) => 'P',
            Item::Atom(_) | Item::Identifier(_) => 'W',
            Item::OpenBracket(_) => 'B',
            _ => return Err(NativeError::Unrecognized),
        }
    };
    let mark = vm.last_allocated();
    vm.alloc_value(Item::Char(tag))?;
    let cell = vm.next(mark);
    vm.insert_next(prev, cell);
    Ok(())
}

/// `<Numb e.X>` — the macrodigit spelled by the leading decimal digits.
fn numb(vm: &mut Heap, prev: CellId, next: CellId) -> NativeResult {
    let mut value: u64 = 0;
    for i in vm.range(prev, next) {
        match vm.item(i) {
            Item::Char(c) if c.is_ascii_digit() => {
                value = value.wrapping_mul(10).wrapping_add(u64::from(c) - u64::from('0'));
            }
            _ => break,
        }
    }
    replace_view(vm, prev, next, |vm| vm.alloc_value(Item::Number(value as i64)).map(|_| ()))
}

/// `<Symb s.N>` — the decimal spelling of a macrodigit.
fn symb(vm: &mut Heap, prev: CellId, next: CellId) -> NativeResult {
    let first = vm.next(prev);
    if first == next {
        return Err(NativeError::Unrecognized);
    }
    let Item::Number(n) = vm.item(first) else {
        return Err(NativeError::Unrecognized);
    };
    replace_view(vm, prev, next, |vm| {
        vm.alloc_string(&n.to_string()).map(|_| ())
    })
}

/// `<Chr e.X>` — every macrodigit becomes the character with that code.
fn chr(vm: &mut Heap, prev: CellId, next: CellId) -> NativeResult {
    let cells: Vec<CellId> = vm.range(prev, next).collect();
    for i in cells {
        if let Item::Number(n) = vm.item(i) {
            let scalar = u32::try_from(n).ok().and_then(char::from_u32);
            let Some(c) = scalar else {
                return Err(NativeError::Unrecognized);
            };
            vm.set_item(i, Item::Char(c));
        }
    }
    Ok(())
}

/// `<Ord e.X>` — every character becomes its code as a macrodigit.
fn ord(vm: &mut Heap, prev: CellId, next: CellId) -> NativeResult {
    let cells: Vec<CellId> = vm.range(prev, next).collect();
    for i in cells {
        if let Item::Char(c) = vm.item(i) {
            vm.set_item(i, Item::Number(i64::from(u32::from(c))));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> (Heap, Interns, Trie) {
        let mut ids = Trie::new();
        let mut interns = Interns::new();
        register(&mut ids, &mut interns);
        (Heap::new(), interns, ids)
    }

    fn view_with(vm: &mut Heap, items: &[Item]) -> (CellId, CellId) {
        let prev = vm.alloc_value(Item::Equal).unwrap();
        for &item in items {
            vm.alloc_value(item).unwrap();
        }
        let next = vm.alloc_value(Item::Complete).unwrap();
        (prev, next)
    }

    fn call_on(
        vm: &mut Heap,
        interns: &Interns,
        builtin: Builtin,
        prev: CellId,
        next: CellId,
    ) -> NativeResult {
        let mut out = Vec::new();
        let mut input = io::empty();
        let mut ctx = NativeCtx { vm, interns, out: &mut out, input: &mut input };
        call(builtin as u32, &mut ctx, prev, next)
    }

    #[test]
    fn registration_resolves_names_to_ordinals() {
        let (_, _, ids) = machine();
        assert_eq!(ids.get_value("Prout"), Value::machine_code(Builtin::Prout as u32));
        assert_eq!(ids.get_value("Compare"), Value::machine_code(Builtin::Compare as u32));
        assert_eq!(ids.get_value("Pro"), Value::UNDEFINED);
    }

    #[test]
    fn bad_ordinal_is_rejected() {
        let (mut vm, interns, _) = machine();
        let (prev, next) = view_with(&mut vm, &[]);
        let mut out = Vec::new();
        let mut input = io::empty();
        let mut ctx = NativeCtx { vm: &mut vm, interns: &interns, out: &mut out, input: &mut input };
        assert!(matches!(
            call(Builtin::VARIANTS.len() as u32, &mut ctx, prev, next),
            Err(NativeError::BadOrdinal(_))
        ));
    }

    #[test]
    fn add_replaces_the_view_with_the_sum() {
        let (mut vm, interns, _) = machine();
        let (prev, next) = view_with(&mut vm, &[Item::Number(40), Item::Number(2)]);
        call_on(&mut vm, &interns, Builtin::Add, prev, next).unwrap();
        let cells: Vec<Item> = vm.range(prev, next).map(|i| vm.item(i)).collect();
        assert_eq!(cells, vec![Item::Number(42)]);
    }

    #[test]
    fn division_error_yields_zero() {
        let (mut vm, interns, _) = machine();
        let (prev, next) = view_with(&mut vm, &[Item::Number(1), Item::Number(0)]);
        call_on(&mut vm, &interns, Builtin::Div, prev, next).unwrap();
        let cells: Vec<Item> = vm.range(prev, next).map(|i| vm.item(i)).collect();
        assert_eq!(cells, vec![Item::Number(0)]);
        let (prev, next) = view_with(&mut vm, &[Item::Number(7), Item::Number(0)]);
        call_on(&mut vm, &interns, Builtin::Mod, prev, next).unwrap();
        let cells: Vec<Item> = vm.range(prev, next).map(|i| vm.item(i)).collect();
        assert_eq!(cells, vec![Item::Number(0)]);
    }

    #[test]
    fn arithmetic_rejects_a_malformed_view() {
        let (mut vm, interns, _) = machine();
        let (prev, next) = view_with(&mut vm, &[Item::Number(1), Item::Char('x')]);
        assert!(matches!(
            call_on(&mut vm, &interns, Builtin::Add, prev, next),
            Err(NativeError::Unrecognized)
        ));
    }

    #[test]
    fn chr_and_ord_are_inverse() {
        let (mut vm, interns, _) = machine();
        let (prev, next) = view_with(&mut vm, &[Item::Char('ф'), Item::Char('a')]);
        call_on(&mut vm, &interns, Builtin::Ord, prev, next).unwrap();
        let codes: Vec<Item> = vm.range(prev, next).map(|i| vm.item(i)).collect();
        assert_eq!(codes, vec![Item::Number(1092), Item::Number(97)]);
        call_on(&mut vm, &interns, Builtin::Chr, prev, next).unwrap();
        let chars: Vec<Item> = vm.range(prev, next).map(|i| vm.item(i)).collect();
        assert_eq!(chars, vec![Item::Char('ф'), Item::Char('a')]);
    }

    #[test]
    fn numb_and_symb_convert_between_digits_and_macrodigits() {
        let (mut vm, interns, _) = machine();
        let (prev, next) =
            view_with(&mut vm, &[Item::Char('1'), Item::Char('0'), Item::Char('7')]);
        call_on(&mut vm, &interns, Builtin::Numb, prev, next).unwrap();
        let cells: Vec<Item> = vm.range(prev, next).map(|i| vm.item(i)).collect();
        assert_eq!(cells, vec![Item::Number(107)]);
        call_on(&mut vm, &interns, Builtin::Symb, prev, next).unwrap();
        let cells: Vec<Item> = vm.range(prev, next).map(|i| vm.item(i)).collect();
        assert_eq!(cells, vec![Item::Char('1'), Item::Char('0'), Item::Char('7')]);
    }

    #[test]
    fn type_prepends_a_classifier() {
        let (mut vm, interns, _) = machine();
        let (prev, next) = view_with(&mut vm, &[Item::Char('q')]);
        call_on(&mut vm, &interns, Builtin::Type, prev, next).unwrap();
        let cells: Vec<Item> = vm.range(prev, next).map(|i| vm.item(i)).collect();
        assert_eq!(cells, vec![Item::Char('L'), Item::Char('q')]);
    }

    #[test]
    fn prout_prints_and_clears_the_view() {
        let (mut vm, interns, _) = machine();
        let (prev, next) = view_with(
            &mut vm,
            &[Item::Char('o'), Item::Char('k'), Item::Number(5)],
        );
        let mut out = Vec::new();
        let mut input = io::empty();
        {
            let mut ctx =
                NativeCtx { vm: &mut vm, interns: &interns, out: &mut out, input: &mut input };
            call(Builtin::Prout as u32, &mut ctx, prev, next).unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "ok5\n");
        assert!(vm.is_evar_empty(prev, next));
    }

    #[test]
    fn card_reads_one_line() {
        let (mut vm, interns, _) = machine();
        let (prev, next) = view_with(&mut vm, &[]);
        let mut out = Vec::new();
        let data = b"hi\nrest" as &[u8];
        let mut input = io::BufReader::new(data);
        {
            let mut ctx =
                NativeCtx { vm: &mut vm, interns: &interns, out: &mut out, input: &mut input };
            call(Builtin::Card as u32, &mut ctx, prev, next).unwrap();
        }
        let cells: Vec<Item> = vm.range(prev, next).map(|i| vm.item(i)).collect();
        assert_eq!(cells, vec![Item::Char('h'), Item::Char('i')]);
    }

    #[test]
    fn card_signals_end_of_input_with_zero() {
        let (mut vm, interns, _) = machine();
        let (prev, next) = view_with(&mut vm, &[]);
        let mut out = Vec::new();
        let data = b"" as &[u8];
        let mut input = io::BufReader::new(data);
        {
            let mut ctx =
                NativeCtx { vm: &mut vm, interns: &interns, out: &mut out, input: &mut input };
            call(Builtin::Card as u32, &mut ctx, prev, next).unwrap();
        }
        let cells: Vec<Item> = vm.range(prev, next).map(|i| vm.item(i)).collect();
        assert_eq!(cells, vec![Item::Number(0)]);
    }
}
