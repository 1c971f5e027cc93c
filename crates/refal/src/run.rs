//! The opcode interpreter.
//!
//! A call executes over the view field between two boundary cells. Matching
//! walks the sentence pattern left to right, binding variables; open
//! e-variables start empty and lengthen one term at a time on failure.
//! On a match, the result expression is formed in the free region — moving
//! each variable's final occurrence, copying the marked ones — and spliced
//! over the matched range.
//!
//! Active subexpressions of a result become real `open-call`/`execute`
//! boundary cells in the view field, and the calls between them go onto a
//! pending stack in reverse stream order, so the leftmost innermost call
//! always runs next. A tail-recursive function therefore never grows the
//! stack: its one pending call replaces itself each step.

use std::io;

use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    heap::{CellId, Heap, HeapError, Item, Mark},
    intern::Interns,
    library::{self, NativeCtx, NativeError},
    message::{Message, MessageSink, Severity},
    trie::{Value, ValueKind},
};

/// Interpreter limits.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Variable slots per sentence; must cover the translator's
    /// `locals_limit`.
    pub locals: u32,
    /// Abort after this many steps. `None` runs until completion.
    pub steps_limit: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { locals: 128, steps_limit: None }
    }
}

/// Interpreter failure.
#[derive(Debug, Error)]
pub enum RunError {
    /// No sentence of the called function matched its view field.
    #[error("recognition impossible")]
    RecognitionImpossible,
    #[error("the step limit is exceeded")]
    StepLimit,
    #[error("the entry function is not computable")]
    EntryNotComputable,
    /// An opcode cell out of place; the program area is corrupted.
    #[error("malformed opcode stream")]
    MalformedProgram,
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error(transparent)]
    Native(NativeError),
}

/// Executes `entry` over the view field between `prev` and `next`.
pub fn run_opcodes(
    cfg: &RunConfig,
    vm: &mut Heap,
    interns: &Interns,
    prev: CellId,
    next: CellId,
    entry: Value,
    out: &mut dyn io::Write,
    input: &mut dyn io::BufRead,
    sink: &mut dyn MessageSink,
) -> Result<(), RunError> {
    let mut interp = Interpreter {
        cfg: *cfg,
        vm,
        interns,
        out,
        input,
        sink,
        calls: Vec::new(),
        bindings: vec![Binding::Free; cfg.locals as usize],
        steps: 0,
    };
    if matches!(entry.kind, ValueKind::Undefined | ValueKind::Enum) {
        interp.report("the entry function is not computable");
        return Err(RunError::EntryNotComputable);
    }
    interp.calls.push(PendingCall { prev, next, callee: entry, drop_bounds: false });
    interp.drive()
}

/// A call waiting to run: its view field lies between the boundary cells.
#[derive(Debug, Clone, Copy)]
struct PendingCall {
    prev: CellId,
    next: CellId,
    callee: Value,
    /// The bounds are `open-call`/`execute` cells to remove afterwards.
    drop_bounds: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Free,
    /// One symbol cell.
    Sym(CellId),
    /// A term: a symbol or a whole bracket group, bounds inclusive.
    Term(CellId, CellId),
    /// A subexpression, bounds inclusive; `None` when empty.
    Expr(Option<(CellId, CellId)>),
}

/// An e-variable still open for lengthening.
#[derive(Debug, Clone, Copy)]
struct OpenEvar {
    slot: u32,
    /// Pattern position right after the variable.
    p_resume: CellId,
    /// View cell where the binding started; the first extension candidate.
    v_start: CellId,
    /// Undo-log length at bind time; later bindings roll back on reentry.
    undo_len: usize,
}

struct Interpreter<'a> {
    cfg: RunConfig,
    vm: &'a mut Heap,
    interns: &'a Interns,
    out: &'a mut dyn io::Write,
    input: &'a mut dyn io::BufRead,
    sink: &'a mut dyn MessageSink,
    calls: Vec<PendingCall>,
    bindings: Vec<Binding>,
    steps: u64,
}

impl Interpreter<'_> {
    fn report(&mut self, detail: &str) {
        self.sink.report(&Message {
            severity: Severity::Error,
            detail: detail.to_owned(),
            source: None,
            line: 0,
            column: 0,
            text: None,
        });
    }

    fn report_for(&mut self, err: &RunError, callee: Value) {
        let detail = match self.interns.name_of(callee) {
            Some(name) => format!("{err} in {name}"),
            None => err.to_string(),
        };
        self.report(&detail);
    }

    fn drive(&mut self) -> Result<(), RunError> {
        while let Some(call) = self.calls.pop() {
            self.steps += 1;
            if let Some(limit) = self.cfg.steps_limit {
                if self.steps > limit {
                    let err = RunError::StepLimit;
                    self.report_for(&err, call.callee);
                    return Err(err);
                }
            }
            match call.callee.kind {
                ValueKind::MachineCode => {
                    let mut ctx = NativeCtx {
                        vm: &mut *self.vm,
                        interns: self.interns,
                        out: &mut *self.out,
                        input: &mut *self.input,
                    };
                    if let Err(native) = library::call(call.callee.index, &mut ctx, call.prev, call.next)
                    {
                        let err = match native {
                            NativeError::Unrecognized => RunError::RecognitionImpossible,
                            NativeError::BadOrdinal(_) => RunError::MalformedProgram,
                            other => RunError::Native(other),
                        };
                        self.report_for(&err, call.callee);
                        return Err(err);
                    }
                }
                ValueKind::ByteCode => self.step(&call)?,
                ValueKind::Undefined | ValueKind::Enum => return Err(RunError::MalformedProgram),
            }
            if call.drop_bounds {
                // The boundary cells have served their purpose; the result
                // merges into the surrounding expression.
                let open = call.prev;
                let exec = call.next;
                let before = self.vm.prev(open);
                let after = self.vm.next(open);
                self.vm.free_evar(before, after);
                let before = self.vm.prev(exec);
                let after = self.vm.next(exec);
                self.vm.free_evar(before, after);
            }
        }
        Ok(())
    }

    /// One rewriting step: match the view field against the function's
    /// sentences and substitute the first matching result.
    fn step(&mut self, call: &PendingCall) -> Result<(), RunError> {
        let mut sentence = CellId::new(call.callee.index);
        loop {
            let (pattern, next_sentence) = match self.vm.item(sentence) {
                Item::Sentence(next) => (self.vm.next(sentence), next),
                Item::Undefined | Item::Complete => return Err(RunError::MalformedProgram),
                // A simple function starts right at its pattern (or at
                // `equal` when the pattern is empty).
                _ => (sentence, CellId::NIL),
            };
            if let Some(equal) = self.try_match(pattern, call.prev, call.next)? {
                return self.substitute(equal, call.prev, call.next);
            }
            if next_sentence.is_nil() {
                let err = RunError::RecognitionImpossible;
                self.report_for(&err, call.callee);
                return Err(err);
            }
            sentence = next_sentence;
        }
    }

    fn binding(&self, slot: u32) -> Result<Binding, RunError> {
        self.bindings.get(slot as usize).copied().ok_or(RunError::MalformedProgram)
    }

    fn bind(&mut self, slot: u32, binding: Binding, undo: &mut Vec<u32>) -> Result<(), RunError> {
        let entry =
            self.bindings.get_mut(slot as usize).ok_or(RunError::MalformedProgram)?;
        *entry = binding;
        undo.push(slot);
        Ok(())
    }

    /// Matches the pattern starting at `pattern` against the cells between
    /// `vp` and `vn`. Returns the `equal` cell on success, with the
    /// variable bindings left in `self.bindings`.
    fn try_match(
        &mut self,
        pattern: CellId,
        vp: CellId,
        vn: CellId,
    ) -> Result<Option<CellId>, RunError> {
        for binding in &mut self.bindings {
            *binding = Binding::Free;
        }
        let mut undo: Vec<u32> = Vec::new();
        let mut open: SmallVec<[OpenEvar; 8]> = SmallVec::new();
        let mut p = pattern;
        let mut v = self.vm.next(vp);
        loop {
            let advanced = match self.vm.item(p) {
                Item::Equal => {
                    if v == vn {
                        return Ok(Some(p));
                    }
                    false
                }
                Item::Svar(slot) => {
                    if v != vn && self.vm.item(v).is_symbol() {
                        match self.binding(slot)? {
                            Binding::Free => {
                                self.bind(slot, Binding::Sym(v), &mut undo)?;
                                v = self.vm.next(v);
                                true
                            }
                            Binding::Sym(bound) => {
                                if self.vm.svar_equal(bound, v) {
                                    v = self.vm.next(v);
                                    true
                                } else {
                                    false
                                }
                            }
                            _ => return Err(RunError::MalformedProgram),
                        }
                    } else {
                        false
                    }
                }
                Item::Tvar(slot) => {
                    let term = self.view_term(v, vn);
                    match term {
                        None => false,
                        Some((first, last)) => match self.binding(slot)? {
                            Binding::Free => {
                                self.bind(slot, Binding::Term(first, last), &mut undo)?;
                                v = self.vm.next(last);
                                true
                            }
                            Binding::Term(bf, bl) => {
                                if self.ranges_equal(bf, bl, first, last) {
                                    v = self.vm.next(last);
                                    true
                                } else {
                                    false
                                }
                            }
                            _ => return Err(RunError::MalformedProgram),
                        },
                    }
                }
                Item::Evar(slot) => match self.binding(slot)? {
                    Binding::Free => {
                        self.bind(slot, Binding::Expr(None), &mut undo)?;
                        open.push(OpenEvar {
                            slot,
                            p_resume: self.vm.next(p),
                            v_start: v,
                            undo_len: undo.len(),
                        });
                        true
                    }
                    Binding::Expr(range) => match self.match_repeated(range, v, vn) {
                        Some(rest) => {
                            v = rest;
                            true
                        }
                        None => false,
                    },
                    _ => return Err(RunError::MalformedProgram),
                },
                Item::OpenBracket(_) => {
                    if v != vn && matches!(self.vm.item(v), Item::OpenBracket(_)) {
                        v = self.vm.next(v);
                        true
                    } else {
                        false
                    }
                }
                Item::CloseBracket(_) => {
                    if v != vn && matches!(self.vm.item(v), Item::CloseBracket(_)) {
                        v = self.vm.next(v);
                        true
                    } else {
                        false
                    }
                }
                Item::Char(_) | Item::Number(_) | Item::Atom(_) | Item::Identifier(_) => {
                    if v != vn && self.vm.svar_equal(p, v) {
                        v = self.vm.next(v);
                        true
                    } else {
                        false
                    }
                }
                _ => return Err(RunError::MalformedProgram),
            };
            if advanced {
                p = self.vm.next(p);
                continue;
            }
            // Lengthen the most recent open e-variable; drop the ones that
            // cannot stretch any further.
            let mut resumed = false;
            while let Some(&top) = open.last() {
                while undo.len() > top.undo_len {
                    if let Some(slot) = undo.pop() {
                        if let Some(entry) = self.bindings.get_mut(slot as usize) {
                            *entry = Binding::Free;
                        }
                    }
                }
                let range = match self.binding(top.slot)? {
                    Binding::Expr(range) => range,
                    _ => return Err(RunError::MalformedProgram),
                };
                let candidate = match range {
                    None => top.v_start,
                    Some((_, last)) => self.vm.next(last),
                };
                if candidate == vn
                    || matches!(self.vm.item(candidate), Item::CloseBracket(_))
                {
                    open.pop();
                    continue;
                }
                let last = match self.vm.item(candidate) {
                    Item::OpenBracket(partner) => partner,
                    _ => candidate,
                };
                let first = match range {
                    None => candidate,
                    Some((first, _)) => first,
                };
                if let Some(entry) = self.bindings.get_mut(top.slot as usize) {
                    *entry = Binding::Expr(Some((first, last)));
                }
                p = top.p_resume;
                v = self.vm.next(last);
                resumed = true;
                break;
            }
            if !resumed {
                return Ok(None);
            }
        }
    }

    /// One term of the view field at `v`: a symbol, or a bracket group.
    fn view_term(&self, v: CellId, vn: CellId) -> Option<(CellId, CellId)> {
        if v == vn {
            return None;
        }
        match self.vm.item(v) {
            Item::OpenBracket(partner) => Some((v, partner)),
            Item::CloseBracket(_) => None,
            item if item.is_symbol() => Some((v, v)),
            _ => None,
        }
    }

    fn items_match(a: Item, b: Item) -> bool {
        match (a, b) {
            (Item::OpenBracket(_), Item::OpenBracket(_))
            | (Item::CloseBracket(_), Item::CloseBracket(_)) => true,
            _ => a == b,
        }
    }

    /// Structural equality of two inclusive cell ranges.
    fn ranges_equal(&self, af: CellId, al: CellId, bf: CellId, bl: CellId) -> bool {
        let mut a = af;
        let mut b = bf;
        loop {
            if !Self::items_match(self.vm.item(a), self.vm.item(b)) {
                return false;
            }
            let a_done = a == al;
            let b_done = b == bl;
            if a_done || b_done {
                return a_done && b_done;
            }
            a = self.vm.next(a);
            b = self.vm.next(b);
        }
    }

    /// A repeated e-variable: the view must continue with the same
    /// sequence the first occurrence matched. Returns the cell after it.
    fn match_repeated(
        &self,
        range: Option<(CellId, CellId)>,
        v: CellId,
        vn: CellId,
    ) -> Option<CellId> {
        let Some((first, last)) = range else { return Some(v) };
        let mut bound = first;
        let mut view = v;
        loop {
            if view == vn || !Self::items_match(self.vm.item(bound), self.vm.item(view)) {
                return None;
            }
            let done = bound == last;
            view = self.vm.next(view);
            if done {
                return Some(view);
            }
            bound = self.vm.next(bound);
        }
    }

    /// Copies or moves one bound range into the result under formation.
    fn emit_range(&mut self, first: CellId, last: CellId, copy: bool) -> Result<(), RunError> {
        if !copy {
            let prev = self.vm.prev(first);
            let next = self.vm.next(last);
            self.vm.alloc_evar_move(prev, next);
            return Ok(());
        }
        let mut opens: SmallVec<[CellId; 8]> = SmallVec::new();
        let mut i = first;
        loop {
            match self.vm.item(i) {
                Item::OpenBracket(_) => {
                    let cell = self.vm.alloc_value(Item::OpenBracket(CellId::NIL))?;
                    opens.push(cell);
                }
                Item::CloseBracket(_) => {
                    let open = opens.pop().ok_or(RunError::MalformedProgram)?;
                    let cell = self.vm.alloc_value(Item::CloseBracket(CellId::NIL))?;
                    self.vm.link_brackets(open, cell);
                }
                item => {
                    self.vm.alloc_value(item)?;
                }
            }
            if i == last {
                break;
            }
            i = self.vm.next(i);
        }
        if opens.is_empty() { Ok(()) } else { Err(RunError::MalformedProgram) }
    }

    /// Forms the result expression after `equal` in the free region and
    /// splices it over the matched range.
    fn substitute(&mut self, equal: CellId, vp: CellId, vn: CellId) -> Result<(), RunError> {
        let mark = self.vm.last_allocated();
        let mut call_opens: SmallVec<[CellId; 8]> = SmallVec::new();
        let mut bracket_opens: SmallVec<[CellId; 8]> = SmallVec::new();
        let mut pending: SmallVec<[PendingCall; 4]> = SmallVec::new();
        let mut r = self.vm.next(equal);
        loop {
            match self.vm.item(r) {
                Item::Sentence(_) | Item::Complete => break,
                item @ (Item::Char(_) | Item::Number(_) | Item::Atom(_) | Item::Identifier(_)) => {
                    self.vm.alloc_value(item)?;
                }
                Item::OpenBracket(_) => {
                    let cell = self.vm.alloc_value(Item::OpenBracket(CellId::NIL))?;
                    bracket_opens.push(cell);
                }
                Item::CloseBracket(_) => {
                    let open = bracket_opens.pop().ok_or(RunError::MalformedProgram)?;
                    let cell = self.vm.alloc_value(Item::CloseBracket(CellId::NIL))?;
                    self.vm.link_brackets(open, cell);
                }
                Item::OpenCall(val) => {
                    let cell = self.vm.alloc_value(Item::OpenCall(val))?;
                    call_opens.push(cell);
                }
                Item::Execute(callee) => {
                    let open = call_opens.pop().ok_or(RunError::MalformedProgram)?;
                    let exec = self.vm.alloc_value(Item::Execute(callee))?;
                    pending.push(PendingCall { prev: open, next: exec, callee, drop_bounds: true });
                }
                Item::Svar(slot) => {
                    let Binding::Sym(cell) = self.binding(slot)? else {
                        return Err(RunError::MalformedProgram);
                    };
                    let item = self.vm.item(cell);
                    self.vm.alloc_value(item)?;
                }
                Item::Tvar(slot) => {
                    let Binding::Term(first, last) = self.binding(slot)? else {
                        return Err(RunError::MalformedProgram);
                    };
                    let copy = self.vm.mark(r) == Mark::Copy;
                    self.emit_range(first, last, copy)?;
                }
                Item::Evar(slot) => {
                    let Binding::Expr(range) = self.binding(slot)? else {
                        return Err(RunError::MalformedProgram);
                    };
                    if let Some((first, last)) = range {
                        let copy = self.vm.mark(r) == Mark::Copy;
                        self.emit_range(first, last, copy)?;
                    }
                }
                Item::Undefined | Item::Equal => return Err(RunError::MalformedProgram),
            }
            r = self.vm.next(r);
        }
        if !call_opens.is_empty() || !bracket_opens.is_empty() {
            return Err(RunError::MalformedProgram);
        }
        if !self.vm.is_evar_empty(vp, vn) {
            self.vm.free_evar(vp, vn);
        }
        if self.vm.last_allocated() != mark {
            let first = self.vm.next(mark);
            self.vm.insert_next(vp, first);
        }
        // Reversing the stream order makes the leftmost innermost call run
        // first.
        while let Some(call) = pending.pop() {
            self.calls.push(call);
        }
        Ok(())
    }
}
