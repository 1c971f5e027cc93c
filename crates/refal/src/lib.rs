//! A compiler and interpreter for REFAL-5, the pattern-rewriting language
//! built on Markov normal algorithms.
//!
//! A program is a set of named functions, each a sequence of sentences
//! `pattern = result;`. The machine repeatedly finds an active call in the
//! view field, matches its argument against the function's sentences, and
//! substitutes the result. Program opcodes and the runtime view field share
//! one arena of uniform tagged cells ([`Heap`]); identifiers live in a
//! ternary prefix trie ([`Trie`]); the translator ([`parse`]) emits cells
//! straight from source text; the interpreter ([`run`]) rewrites them.
//!
//! [`Machine`] bundles the pieces for the common path:
//!
//! ```
//! use refal::{CollectMessages, Machine, RunConfig, TranslatorConfig};
//!
//! let mut machine = Machine::new();
//! let mut sink = CollectMessages::new();
//! machine
//!     .translate_text(&TranslatorConfig::default(), "Go = <Prout 'hi'>;", &mut sink)
//!     .unwrap();
//! let entry = machine.entry().unwrap();
//! let mut out = Vec::new();
//! let mut input = std::io::empty();
//! machine
//!     .run(&RunConfig::default(), entry, &mut out, &mut input, &mut sink)
//!     .unwrap();
//! assert_eq!(out, b"hi\n");
//! ```

mod heap;
mod intern;
mod library;
mod message;
mod parse;
mod render;
mod run;
mod trie;
mod utf8;

use std::{io, path::Path};

pub use crate::{
    heap::{Cell, CellId, Heap, HeapError, Item, Mark},
    intern::{AtomId, Interns},
    library::{Builtin, NativeCtx, NativeError, NativeResult, format_view, register as register_library},
    message::{CollectMessages, Message, MessageSink, Severity, StderrMessages},
    parse::{SyntaxError, TranslateError, TranslatorConfig, translate_file, translate_text},
    render::render_program,
    run::{RunConfig, RunError, run_opcodes},
    trie::{Trie, TrieId, Value, ValueKind},
    utf8::{Decoder, Utf8Error},
};

/// The assembled REFAL machine: cell arena, symbol table, interner, with
/// the built-in library registered.
#[derive(Debug)]
pub struct Machine {
    pub vm: Heap,
    pub ids: Trie,
    pub interns: Interns,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        let mut ids = Trie::new();
        let mut interns = Interns::new();
        library::register(&mut ids, &mut interns);
        Self { vm: Heap::new(), ids, interns }
    }

    /// Translates a source file into the machine memory.
    pub fn translate_file(
        &mut self,
        cfg: &TranslatorConfig,
        path: &Path,
        sink: &mut dyn MessageSink,
    ) -> Result<(), TranslateError> {
        parse::translate_file(cfg, &mut self.vm, &mut self.ids, &mut self.interns, path, sink)
    }

    /// Translates source text into the machine memory.
    pub fn translate_text(
        &mut self,
        cfg: &TranslatorConfig,
        text: &str,
        sink: &mut dyn MessageSink,
    ) -> Result<(), TranslateError> {
        parse::translate_text(cfg, &mut self.vm, &mut self.ids, &mut self.interns, text, sink)
    }

    /// The program's entry function: `Go`, or `go`, translated to byte
    /// code.
    pub fn entry(&self) -> Option<Value> {
        ["Go", "go"]
            .into_iter()
            .map(|name| self.ids.get_value(name))
            .find(|val| val.kind == ValueKind::ByteCode)
    }

    /// Runs `entry` over a fresh, empty view field at the end of the
    /// program area.
    pub fn run(
        &mut self,
        cfg: &RunConfig,
        entry: Value,
        out: &mut dyn io::Write,
        input: &mut dyn io::BufRead,
        sink: &mut dyn MessageSink,
    ) -> Result<(), RunError> {
        // Real boundary cells: the free head itself cannot bound the view,
        // allocation would swallow it.
        let prev = self.vm.alloc_value(Item::Undefined)?;
        let next = self.vm.alloc_value(Item::Undefined)?;
        run::run_opcodes(cfg, &mut self.vm, &self.interns, prev, next, entry, out, input, sink)
    }

    /// The canonical text of the translated program.
    pub fn render(&self) -> String {
        render::render_program(&self.vm, &self.ids, &self.interns)
    }
}
