//! The translator: REFAL source text to opcodes.
//!
//! A single pass walks the source character by character, tracking two state
//! machines at once — the lexical state (where in a token we are) and the
//! semantic state (where in the grammar we are) — and emits cells straight
//! into the machine memory while filling the symbol table. There is no
//! separate token stream and no AST.
//!
//! Identifiers may be used before they are defined. Unresolved occurrences
//! emit a placeholder cell and a record in an ordered side list; after the
//! scan, two fix-up passes resolve them (§ *Forward references* below).
//!
//! Local variables are scoped through the symbol table itself: a sentence
//! separator code point above the Unicode range is advanced at every
//! sentence start, so `s.1` of one sentence can never be found from the
//! next.

use std::{fs, io, path::Path};

use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    heap::{CellId, Heap, HeapError, Item, Mark},
    intern::Interns,
    message::{Message, MessageSink, Severity},
    trie::{Trie, TrieId, Value, ValueKind},
    utf8::{self, Utf8Error},
};

/// Translator limits and warning switches.
#[derive(Debug, Clone, Copy)]
pub struct TranslatorConfig {
    /// Variables allowed per sentence.
    pub locals_limit: u32,
    /// Nesting depth of evaluation brackets.
    pub execs_limit: u32,
    /// Nesting depth of structural brackets.
    pub brackets_limit: u32,
    /// Warn when a name is declared implicitly by use.
    pub warn_implicit_declaration: bool,
    /// Notice when a variable occurrence forces a copy.
    pub notice_copy: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            locals_limit: 128,
            execs_limit: 128,
            brackets_limit: 128,
            warn_implicit_declaration: false,
            notice_copy: false,
        }
    }
}

/// Translator rejections, reported through the sink and returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("missing function name")]
    MissingFunctionName,
    #[error("stray identifier (missing = or {{ in a function definition?)")]
    OddIdentifier,
    #[error("the function is already defined")]
    AlreadyDefined,
    #[error("the imported identifier is already defined")]
    ImportedAlreadyDefined,
    #[error("undefined identifier")]
    UndefinedIdentifier,
    #[error("the identifier is not defined in the module")]
    NotDefinedInModule,
    #[error("the identifier is not defined in the module (mutually recursive import?)")]
    NotDefinedInModuleRecursive,
    #[error("unpaired evaluation bracket")]
    UnpairedExecBracket,
    #[error("an evaluation bracket is not closed")]
    UnclosedExecBracket,
    #[error("unpaired structural bracket")]
    UnpairedStructBracket,
    #[error("a structural bracket is not closed")]
    UnclosedStructBracket,
    #[error("unpaired closing brace")]
    UnpairedBlockBracket,
    #[error("evaluation brackets are not supported in a pattern")]
    ExecInPattern,
    #[error("a pattern without a result expression (missing = ?)")]
    PatternWithoutResult,
    #[error("misplaced operator in an expression (missing ; ?)")]
    OperatorInExpression,
    #[error("a block is not allowed here (missing = ?)")]
    BlockInPattern,
    #[error("nested blocks {{}} are not supported")]
    NestedBlock,
    #[error("numbers are allowed only in expressions")]
    NumbersOnlyInExpressions,
    #[error("conditions are not supported")]
    ConditionsNotSupported,
    #[error("the operator is not supported here")]
    OperatorNotSupported,
    #[error("incorrect function definition (missing = or {{ ?)")]
    IncorrectFunctionDefinition,
    #[error("malformed import (missing ; ?)")]
    IncorrectImport,
    #[error("the module name is too long")]
    ModuleNameTooLong,
    #[error("invalid module name")]
    InvalidModuleName,
    #[error("the closing quote is missing")]
    UnterminatedString,
    #[error("incomplete UTF-8 sequence")]
    IncompleteUtf8,
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unfinished function definition (missing }} ?)")]
    UnterminatedBlock,
    #[error("unfinished function definition (missing ; ?)")]
    UnterminatedFunction,
    #[error("an active expression must contain a computable function")]
    NoComputableFunction,
    #[error("the variable limit is exceeded")]
    LocalsLimit,
    #[error("the evaluation bracket nesting limit is exceeded")]
    ExecsLimit,
    #[error("the structural bracket nesting limit is exceeded")]
    BracketsLimit,
}

/// Translation failure.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("{detail} ({line}:{column})")]
    Syntax { detail: SyntaxError, line: u32, column: u32 },
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error("source text is not available: {0}")]
    Io(#[from] io::Error),
}

/// Translates a file, filling the machine memory and the symbol table.
pub fn translate_file(
    cfg: &TranslatorConfig,
    vm: &mut Heap,
    ids: &mut Trie,
    interns: &mut Interns,
    path: &Path,
    sink: &mut dyn MessageSink,
) -> Result<(), TranslateError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            sink.report(&Message {
                severity: Severity::Critical,
                detail: "source text is not available".to_owned(),
                source: Some(path.display().to_string()),
                line: 0,
                column: 0,
                text: None,
            });
            return Err(err.into());
        }
    };
    let mut session = Session { cfg: *cfg, vm, ids, interns, sink };
    translate_unit(&mut session, None, &data, Some(path))
}

/// Translates source text directly; used by tests and embedders.
pub fn translate_text(
    cfg: &TranslatorConfig,
    vm: &mut Heap,
    ids: &mut Trie,
    interns: &mut Interns,
    text: &str,
    sink: &mut dyn MessageSink,
) -> Result<(), TranslateError> {
    let mut session = Session { cfg: *cfg, vm, ids, interns, sink };
    translate_unit(&mut session, None, text.as_bytes(), None)
}

/// Shared translation context; one per top-level translation, reborrowed by
/// every recursively translated module.
struct Session<'a> {
    cfg: TranslatorConfig,
    vm: &'a mut Heap,
    ids: &'a mut Trie,
    interns: &'a mut Interns,
    sink: &'a mut dyn MessageSink,
}

fn translate_unit(
    session: &mut Session<'_>,
    module: Option<TrieId>,
    src: &[u8],
    source: Option<&Path>,
) -> Result<(), TranslateError> {
    let locals = session.cfg.locals_limit as usize;
    let enum_counter = session.ids.len() as u32;
    let mut scanner = Scanner {
        ses: session,
        src,
        source,
        at: 0,
        chr_at: 0,
        line_num: 1,
        line_start: 0,
        pos: 0,
        lexer: Lexer::LeadingSpace,
        semantic: Semantic::Source,
        number: 0,
        node: None,
        ident: TrieId::ROOT,
        ident_span: (0, 0),
        ident_pos: 0,
        tok_start: 0,
        tok_pos: 0,
        module,
        namespace: module,
        imports: None,
        imports_local: None,
        import_node: None,
        im_line: 0,
        im_pos: 0,
        im_line_start: 0,
        enum_counter,
        id_kind: IdKind::Global,
        idc: 0x0011_0000,
        local: 0,
        var: vec![VarSlot::default(); locals],
        exec_stack: SmallVec::new(),
        bracket_stack: SmallVec::new(),
        cmd_sentence: None,
        prev_sentence: None,
        function_block: 0,
        after_block: false,
        forward: Vec::new(),
    };
    scanner.scan_unit()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexer {
    /// Spaces at the start of a line.
    LeadingSpace,
    /// Spaces after a token.
    Whitespace,
    /// A comment line, started by `*` or `//`.
    CommentLine,
    /// A C-style comment `/* ... */`.
    CommentC,
    /// A character string in single quotes.
    StringSingle,
    /// A character string in double quotes.
    StringDouble,
    /// An integer.
    Number,
    /// An identifier.
    Identifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Semantic {
    /// Top level; identifiers get defined here.
    Source,
    /// An identifier was just read at the top level: next comes a pattern,
    /// a block, an import list, or `;` closing an empty function.
    Identifier,
    /// After `Module:` — a list of identifiers to import.
    Import,
    /// The pattern of a sentence, up to `=`.
    Pattern,
    /// The result expression, up to `;` or `}`.
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdKind {
    Global,
    Svar,
    Tvar,
    Evar,
}

/// Per-slot state of the copy detector: the last occurrence of a variable
/// in the result, with its coordinates for the notice.
#[derive(Debug, Clone, Copy, Default)]
struct VarSlot {
    opcode: CellId,
    line: u32,
    pos: u32,
    line_start: usize,
}

/// An occurrence of a not-yet-defined identifier, kept in emission order.
#[derive(Debug, Clone, Copy)]
struct ForwardRef {
    /// The placeholder cell emitted at the occurrence.
    opcode: CellId,
    /// The enclosing `open-call` cell, when its callee was still pending.
    exec: Option<CellId>,
    node: TrieId,
    line: u32,
    pos: u32,
    line_start: usize,
    span: (usize, usize),
    /// Set by fix-up pass 1 when the occurrence became a call target.
    bound_as_callee: bool,
}

struct Scanner<'a, 'b> {
    ses: &'a mut Session<'b>,
    src: &'a [u8],
    source: Option<&'a Path>,

    at: usize,
    /// Byte offset of the character currently dispatched.
    chr_at: usize,
    line_num: u32,
    line_start: usize,
    pos: u32,

    lexer: Lexer,
    semantic: Semantic,

    number: u64,
    /// The node reached by the identifier in progress; `None` after a failed
    /// lookup under a module subtree.
    node: Option<TrieId>,
    /// The node of the current function, root for its local variables.
    ident: TrieId,
    ident_span: (usize, usize),
    ident_pos: u32,
    tok_start: usize,
    tok_pos: u32,

    /// Namespace root of the unit being translated as a module.
    module: Option<TrieId>,
    /// Where identifiers are inserted; `None` is the global root.
    namespace: Option<TrieId>,
    /// Search root after a module identifier, for qualified lookups and
    /// import lists.
    imports: Option<TrieId>,
    /// A module's local alias node for another module, linked to the
    /// globally translated subtree once it exists.
    imports_local: Option<TrieId>,
    /// Running lookup in the module subtree during an import list.
    import_node: Option<TrieId>,
    im_line: u32,
    im_pos: u32,
    im_line_start: usize,

    enum_counter: u32,
    id_kind: IdKind,
    /// Separator code point for local variables; above Unicode, advanced per
    /// sentence start.
    idc: u32,
    local: u32,
    var: Vec<VarSlot>,

    exec_stack: SmallVec<[CellId; 16]>,
    bracket_stack: SmallVec<[CellId; 16]>,
    cmd_sentence: Option<CellId>,
    /// The previous sentence cell, back-patched to payload 0 when `}` turns
    /// a dangling sentence marker into `complete`.
    prev_sentence: Option<CellId>,
    function_block: i32,
    /// A block was just closed; tolerates the `};` spelling.
    after_block: bool,

    forward: Vec<ForwardRef>,
}

impl Scanner<'_, '_> {
    fn scan_unit(&mut self) -> Result<(), TranslateError> {
        // A first line starting with #! is a comment.
        if self.src.first() == Some(&b'#') {
            self.lexer = Lexer::CommentLine;
        }
        loop {
            let Some(chr) = self.next_char()? else { break };
            match self.lexer {
                Lexer::CommentLine => {
                    if matches!(chr, '\n' | '\r') {
                        self.newline(chr);
                        self.lexer = Lexer::LeadingSpace;
                    }
                }
                Lexer::CommentC => match chr {
                    '\n' | '\r' => self.newline(chr),
                    '*' if self.peek_byte() == Some(b'/') => {
                        self.bump();
                        self.lexer = Lexer::Whitespace;
                    }
                    _ => {}
                },
                Lexer::StringSingle | Lexer::StringDouble => self.string_char(chr)?,
                _ => self.token_char(chr)?,
            }
        }
        self.finish_at_eof()?;
        self.fixup()
    }

    // --- input ---

    fn next_char(&mut self) -> Result<Option<char>, TranslateError> {
        if self.at >= self.src.len() {
            return Ok(None);
        }
        self.chr_at = self.at;
        match utf8::decode(&self.src[self.at..]) {
            Ok((chr, len)) => {
                self.at += len;
                self.pos += 1;
                Ok(Some(chr))
            }
            Err(Utf8Error::Incomplete) => {
                self.pos += 1;
                Err(self.error(SyntaxError::IncompleteUtf8))
            }
            Err(_) => {
                self.pos += 1;
                Err(self.error(SyntaxError::InvalidUtf8))
            }
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.src.get(self.at).copied()
    }

    fn bump(&mut self) {
        self.at += 1;
    }

    fn newline(&mut self, chr: char) {
        if chr == '\r' && self.peek_byte() == Some(b'\n') {
            self.bump();
        }
        self.line_num += 1;
        self.line_start = self.at;
        self.pos = 0;
    }

    // --- diagnostics ---

    fn line_text(&self, line_start: usize) -> String {
        let rest = &self.src[line_start.min(self.src.len())..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .unwrap_or(rest.len());
        String::from_utf8_lossy(&rest[..end]).into_owned()
    }

    fn report(&mut self, severity: Severity, detail: &str, line: u32, column: u32, line_start: usize) {
        let message = Message {
            severity,
            detail: detail.to_owned(),
            source: self.source.map(|p| p.display().to_string()),
            line,
            column,
            text: Some(self.line_text(line_start)),
        };
        self.ses.sink.report(&message);
    }

    /// Reports a syntax error at the current position and builds the
    /// corresponding return value.
    fn error(&mut self, detail: SyntaxError) -> TranslateError {
        self.report(Severity::Error, &detail.to_string(), self.line_num, self.pos, self.line_start);
        TranslateError::Syntax { detail, line: self.line_num, column: self.pos }
    }

    fn error_at(&mut self, detail: SyntaxError, line: u32, column: u32, line_start: usize) {
        self.report(Severity::Error, &detail.to_string(), line, column, line_start);
    }

    fn warning(&mut self, detail: &str) {
        self.report(Severity::Warning, detail, self.line_num, self.pos, self.line_start);
    }

    fn warning_at(&mut self, detail: &str, line: u32, column: u32, line_start: usize) {
        self.report(Severity::Warning, detail, line, column, line_start);
    }

    // --- emission ---

    fn emit(&mut self, item: Item) -> Result<CellId, TranslateError> {
        match self.ses.vm.alloc_value(item) {
            Ok(cell) => Ok(cell),
            Err(err) => {
                let message = Message {
                    severity: Severity::Critical,
                    detail: "out of memory for the view field".to_owned(),
                    source: self.source.map(|p| p.display().to_string()),
                    line: self.line_num,
                    column: self.pos,
                    text: None,
                };
                self.ses.sink.report(&message);
                Err(err.into())
            }
        }
    }

    fn fresh_enum(&mut self) -> u32 {
        self.enum_counter += 1;
        self.enum_counter
    }

    fn span_text(&self, span: (usize, usize)) -> Option<&str> {
        std::str::from_utf8(&self.src[span.0..span.1]).ok()
    }

    /// Registers the printable name of the current function's value.
    fn register_ident_name(&mut self) {
        let val = self.ses.ids.value(self.ident);
        if let Ok(name) = std::str::from_utf8(&self.src[self.ident_span.0..self.ident_span.1]) {
            self.ses.interns.register_name(val, name);
        }
    }

    fn register_token_name(&mut self, val: Value, tok_end: usize) {
        if let Ok(name) = std::str::from_utf8(&self.src[self.tok_start..tok_end]) {
            self.ses.interns.register_name(val, name);
        }
    }

    // --- character dispatch ---

    fn string_char(&mut self, chr: char) -> Result<(), TranslateError> {
        let quote = if self.lexer == Lexer::StringSingle { '\'' } else { '"' };
        match chr {
            '\n' | '\r' => Err(self.error(SyntaxError::UnterminatedString)),
            c if c == quote => {
                // A doubled quote stands for itself; a single one closes.
                if self.peek_byte() == Some(quote as u8) {
                    self.bump();
                    self.pos += 1;
                    self.emit(Item::Char(quote))?;
                } else {
                    self.lexer = Lexer::Whitespace;
                }
                Ok(())
            }
            '\\' => {
                match self.peek_byte() {
                    Some(b't') => {
                        self.bump();
                        self.pos += 1;
                        self.emit(Item::Char('\t'))?;
                    }
                    Some(b'n') => {
                        self.bump();
                        self.pos += 1;
                        self.emit(Item::Char('\n'))?;
                    }
                    Some(b'r') => {
                        self.bump();
                        self.pos += 1;
                        self.emit(Item::Char('\r'))?;
                    }
                    None | Some(b'\n' | b'\r') => {
                        self.emit(Item::Char('\\'))?;
                    }
                    Some(_) => {
                        // \x stands for x, so quotes and \ can be escaped.
                        if let Some(c) = self.next_char()? {
                            self.emit(Item::Char(c))?;
                        }
                    }
                }
                Ok(())
            }
            c => {
                self.emit(Item::Char(c))?;
                Ok(())
            }
        }
    }

    fn token_char(&mut self, chr: char) -> Result<(), TranslateError> {
        match chr {
            ' ' | '\t' => self.finish_token(),
            '\n' | '\r' => {
                self.finish_token()?;
                self.newline(chr);
                self.lexer = Lexer::LeadingSpace;
                Ok(())
            }
            '*' => {
                if self.lexer == Lexer::LeadingSpace {
                    self.lexer = Lexer::CommentLine;
                    Ok(())
                } else {
                    self.finish_token()?;
                    Err(self.error(SyntaxError::OperatorNotSupported))
                }
            }
            '/' => {
                self.finish_token()?;
                match self.peek_byte() {
                    Some(b'/') => {
                        self.bump();
                        self.lexer = Lexer::CommentLine;
                        Ok(())
                    }
                    Some(b'*') => {
                        self.bump();
                        self.lexer = Lexer::CommentC;
                        Ok(())
                    }
                    _ => Err(self.error(SyntaxError::OperatorNotSupported)),
                }
            }
            '=' | '{' | '}' | '<' | '>' | '(' | ')' | ';' | ':' => {
                self.finish_token()?;
                self.operator(chr)
            }
            '"' | '\'' => {
                self.finish_token()?;
                self.start_string(chr)
            }
            '0'..='9' => self.digit(chr),
            _ => self.word_char(chr),
        }
    }

    fn finish_token(&mut self) -> Result<(), TranslateError> {
        match self.lexer {
            Lexer::Number => {
                self.flush_number()?;
                self.lexer = Lexer::Whitespace;
            }
            Lexer::Identifier => self.finish_identifier()?,
            _ => {}
        }
        Ok(())
    }

    // --- numbers ---

    fn digit(&mut self, chr: char) -> Result<(), TranslateError> {
        let digit = u64::from(chr) - u64::from('0');
        match self.lexer {
            Lexer::Number => {
                let (mul, over_mul) = self.number.overflowing_mul(10);
                let (sum, over_add) = mul.overflowing_add(digit);
                if over_mul || over_add {
                    self.warning("integer overflow in a numeric literal");
                }
                self.number = sum;
                Ok(())
            }
            Lexer::Identifier => self.ident_continue(chr),
            _ => {
                self.after_block = false;
                match self.semantic {
                    Semantic::Source => Err(self.error(SyntaxError::NumbersOnlyInExpressions)),
                    Semantic::Import => Err(self.error(SyntaxError::IncorrectImport)),
                    Semantic::Identifier => {
                        self.define_simple()?;
                        self.semantic = Semantic::Pattern;
                        self.begin_number(digit);
                        Ok(())
                    }
                    Semantic::Pattern | Semantic::Expression => {
                        self.begin_number(digit);
                        Ok(())
                    }
                }
            }
        }
    }

    fn begin_number(&mut self, digit: u64) {
        self.lexer = Lexer::Number;
        self.number = digit;
    }

    fn flush_number(&mut self) -> Result<(), TranslateError> {
        self.emit(Item::Number(self.number as i64))?;
        Ok(())
    }

    // --- identifiers ---

    fn insert_ns(&mut self, chr: char) -> TrieId {
        let root = self.namespace.unwrap_or(TrieId::ROOT);
        self.ses.ids.insert_at(root, chr as u32)
    }

    fn word_char(&mut self, chr: char) -> Result<(), TranslateError> {
        match self.lexer {
            Lexer::Number => {
                self.flush_number()?;
                self.warning("identifiers should be separated from digits by a space");
                self.ident_start(chr)
            }
            Lexer::Identifier => self.ident_continue(chr),
            _ => self.ident_start(chr),
        }
    }

    fn ident_start(&mut self, chr: char) -> Result<(), TranslateError> {
        self.lexer = Lexer::Identifier;
        self.after_block = false;
        self.tok_start = self.chr_at;
        self.tok_pos = self.pos;
        match self.semantic {
            Semantic::Import => {
                self.import_node = match self.imports {
                    Some(root) => self.ses.ids.find_at(root, chr as u32),
                    // An import list without a module name pulls from the
                    // global namespace.
                    None => self.ses.ids.find_first(chr as u32),
                };
                self.node = Some(self.insert_ns(chr));
                Ok(())
            }
            Semantic::Source => {
                self.node = Some(self.insert_ns(chr));
                Ok(())
            }
            Semantic::Identifier => {
                self.define_simple()?;
                self.semantic = Semantic::Pattern;
                self.pattern_ident_start(chr)
            }
            Semantic::Pattern => self.pattern_ident_start(chr),
            Semantic::Expression => self.expr_ident_start(chr),
        }
    }

    fn variable_kind(&mut self, chr: char) -> Option<IdKind> {
        match chr {
            '…' | '.' => Some(IdKind::Evar),
            '?' => Some(IdKind::Svar),
            '!' => Some(IdKind::Tvar),
            'e' | 't' | 's' if self.peek_byte() == Some(b'.') => {
                self.bump();
                self.pos += 1;
                Some(match chr {
                    'e' => IdKind::Evar,
                    't' => IdKind::Tvar,
                    _ => IdKind::Svar,
                })
            }
            _ => None,
        }
    }

    fn pattern_ident_start(&mut self, chr: char) -> Result<(), TranslateError> {
        match self.variable_kind(chr) {
            Some(kind) => {
                self.id_kind = kind;
                let sep = self.ses.ids.insert_next(self.ident, self.idc);
                self.node = Some(self.ses.ids.insert_next(sep, chr as u32));
                Ok(())
            }
            None => {
                self.id_kind = IdKind::Global;
                self.global_ident_start(chr);
                Ok(())
            }
        }
    }

    fn expr_ident_start(&mut self, chr: char) -> Result<(), TranslateError> {
        match self.variable_kind(chr) {
            Some(kind) => {
                self.id_kind = kind;
                let found = self
                    .ses
                    .ids
                    .find_next(self.ident, self.idc)
                    .and_then(|sep| self.ses.ids.find_next(sep, chr as u32));
                match found {
                    Some(node) => {
                        self.node = Some(node);
                        Ok(())
                    }
                    None => Err(self.error(SyntaxError::UndefinedIdentifier)),
                }
            }
            None => {
                self.id_kind = IdKind::Global;
                self.global_ident_start(chr);
                Ok(())
            }
        }
    }

    fn global_ident_start(&mut self, chr: char) {
        if let Some(root) = self.imports {
            self.node = self.ses.ids.find_at(root, chr as u32);
        } else {
            self.node = Some(self.insert_ns(chr));
        }
    }

    fn ident_continue(&mut self, chr: char) -> Result<(), TranslateError> {
        match self.semantic {
            Semantic::Import => {
                self.import_node =
                    self.import_node.and_then(|n| self.ses.ids.find_next(n, chr as u32));
                if let Some(node) = self.node {
                    self.node = Some(self.ses.ids.insert_next(node, chr as u32));
                }
                Ok(())
            }
            Semantic::Source => {
                let node = self.node.unwrap_or(TrieId::ROOT);
                self.node = Some(self.ses.ids.insert_next(node, chr as u32));
                Ok(())
            }
            Semantic::Identifier => Err(self.error(SyntaxError::OddIdentifier)),
            Semantic::Pattern if self.id_kind != IdKind::Global => {
                let node = self.node.unwrap_or(TrieId::ROOT);
                self.node = Some(self.ses.ids.insert_next(node, chr as u32));
                Ok(())
            }
            Semantic::Pattern | Semantic::Expression => {
                if self.imports.is_some() {
                    self.node = self.node.and_then(|n| self.ses.ids.find_next(n, chr as u32));
                } else {
                    let node = self.node.unwrap_or(TrieId::ROOT);
                    self.node = Some(self.ses.ids.insert_next(node, chr as u32));
                }
                Ok(())
            }
        }
    }

    fn finish_identifier(&mut self) -> Result<(), TranslateError> {
        self.lexer = Lexer::Whitespace;
        let tok_end = self.chr_at;
        match self.semantic {
            Semantic::Source => {
                self.semantic = Semantic::Identifier;
                self.ident = self.node.unwrap_or(TrieId::ROOT);
                self.ident_span = (self.tok_start, tok_end);
                self.ident_pos = self.tok_pos;
                self.local = 0;
                self.cmd_sentence = None;
                self.prev_sentence = None;
                Ok(())
            }
            Semantic::Identifier => Err(self.error(SyntaxError::OddIdentifier)),
            Semantic::Import => {
                let Some(import_node) = self.import_node else {
                    return Err(self.error(SyntaxError::NotDefinedInModuleRecursive));
                };
                let node = self.node.unwrap_or(TrieId::ROOT);
                if !self.ses.ids.value(node).is_undefined() {
                    return Err(self.error(SyntaxError::ImportedAlreadyDefined));
                }
                let val = self.ses.ids.value(import_node);
                self.ses.ids.set_value(node, val);
                Ok(())
            }
            Semantic::Pattern => match self.id_kind {
                IdKind::Global => self.finish_global(tok_end),
                kind => {
                    let node = self.node.unwrap_or(TrieId::ROOT);
                    if self.ses.ids.value(node).is_undefined() {
                        if self.local >= self.ses.cfg.locals_limit {
                            return Err(self.error(SyntaxError::LocalsLimit));
                        }
                        self.var[self.local as usize] = VarSlot::default();
                        self.ses.ids.set_value(node, Value::enumeration(self.local));
                        self.local += 1;
                    }
                    let slot = self.ses.ids.value(node).index;
                    self.emit(var_item(kind, slot))?;
                    Ok(())
                }
            },
            Semantic::Expression => match self.id_kind {
                IdKind::Global => self.finish_global(tok_end),
                kind => {
                    let node = self.node.unwrap_or(TrieId::ROOT);
                    let val = self.ses.ids.value(node);
                    if val.is_undefined() {
                        return Err(self.error(SyntaxError::UndefinedIdentifier));
                    }
                    let slot = val.index as usize;
                    // The first occurrence would be moved; every further one
                    // turns its predecessor into a copy.
                    if kind != IdKind::Svar && !self.var[slot].opcode.is_nil() {
                        let prior = self.var[slot];
                        self.ses.vm.set_mark(prior.opcode, Mark::Copy);
                        if self.ses.cfg.notice_copy {
                            let text = "a copy of the variable is created".to_owned();
                            self.report(
                                Severity::Notice,
                                &text,
                                prior.line,
                                prior.pos,
                                prior.line_start,
                            );
                        }
                    }
                    let cell = self.emit(var_item(kind, slot as u32))?;
                    self.var[slot] = VarSlot {
                        opcode: cell,
                        line: self.line_num,
                        pos: self.tok_pos,
                        line_start: self.line_start,
                    };
                    Ok(())
                }
            },
        }
    }

    /// Looks the current token up from the global root; the fallback that
    /// makes built-ins and importer functions visible inside modules.
    fn lookup_global(&self, tok_end: usize) -> Option<(TrieId, Value)> {
        let text = std::str::from_utf8(&self.src[self.tok_start..tok_end]).ok()?;
        let mut chars = text.chars();
        let mut idx = self.ses.ids.find_first(chars.next()? as u32)?;
        for chr in chars {
            idx = self.ses.ids.find_next(idx, chr as u32)?;
        }
        let val = self.ses.ids.value(idx);
        if val.is_undefined() { None } else { Some((idx, val)) }
    }

    fn finish_global(&mut self, tok_end: usize) -> Result<(), TranslateError> {
        let Some(mut node) = self.node else {
            return Err(self.error(SyntaxError::NotDefinedInModule));
        };
        let mut val = self.ses.ids.value(node);
        if val.is_undefined() && self.module.is_some() && self.imports.is_none() {
            if let Some((global_node, global_val)) = self.lookup_global(tok_end) {
                node = global_node;
                val = global_val;
            }
        }
        if val.is_undefined() {
            if self.imports.is_some() {
                return Err(self.error(SyntaxError::NotDefinedInModule));
            }
            return self.forward_reference(node, tok_end);
        }
        let open = self.exec_stack.last().copied();
        let open_val = open.map(|cell| match self.ses.vm.item(cell) {
            Item::OpenCall(v) => v,
            _ => Value::UNDEFINED,
        });
        if val.kind != ValueKind::Enum && open_val.is_some_and(Value::is_undefined) {
            let open = open.unwrap_or(CellId::NIL);
            // A pending forward reference inside this call may still turn
            // out to be the callee; defer the decision to fix-up.
            if open_val.is_some_and(|v| v.index != 0) {
                if self.imports.is_some() {
                    return Err(self.error(SyntaxError::NotDefinedInModule));
                }
                return self.forward_reference(node, tok_end);
            }
            self.ses.vm.set_item(open, Item::OpenCall(val));
            self.register_token_name(val, tok_end);
            self.imports = None;
            Ok(())
        } else if val.kind == ValueKind::Enum && val.index == 0 {
            // A module identifier: qualify the next lookup.
            let Some(space) = self.ses.ids.find_next(node, u32::from(' ')) else {
                return Err(self.error(SyntaxError::NotDefinedInModule));
            };
            self.imports = Some(space);
            self.im_line = self.line_num;
            self.im_pos = self.tok_pos;
            self.im_line_start = self.line_start;
            Ok(())
        } else {
            self.register_token_name(val, tok_end);
            self.emit(Item::Identifier(val))?;
            self.imports = None;
            Ok(())
        }
    }

    fn forward_reference(&mut self, node: TrieId, tok_end: usize) -> Result<(), TranslateError> {
        let opcode = self.emit(Item::Undefined)?;
        let mut exec = None;
        if let Some(&open) = self.exec_stack.last() {
            if let Item::OpenCall(v) = self.ses.vm.item(open) {
                if v.is_undefined() {
                    self.ses.vm.set_item(
                        open,
                        Item::OpenCall(Value { kind: ValueKind::Undefined, index: 1 }),
                    );
                    exec = Some(open);
                }
            }
        }
        self.forward.push(ForwardRef {
            opcode,
            exec,
            node,
            line: self.line_num,
            pos: self.tok_pos,
            line_start: self.line_start,
            span: (self.tok_start, tok_end),
            bound_as_callee: false,
        });
        Ok(())
    }

    // --- operators ---

    fn define_simple(&mut self) -> Result<(), TranslateError> {
        debug_assert_eq!(self.function_block, 0);
        if !self.ses.ids.value(self.ident).is_undefined() {
            return Err(self.error(SyntaxError::AlreadyDefined));
        }
        self.ses.ids.set_value(self.ident, Value::byte_code(self.ses.vm.free_head()));
        self.register_ident_name();
        Ok(())
    }

    fn orphan_module_warning(&mut self) {
        if self.imports.take().is_some() {
            let line = self.im_line;
            let pos = self.im_pos;
            let start = self.im_line_start;
            self.warning_at("a module identifier without a function name has no effect", line, pos, start);
        }
    }

    fn operator(&mut self, chr: char) -> Result<(), TranslateError> {
        if chr != ';' {
            self.after_block = false;
        }
        match chr {
            '=' => self.op_equal(),
            '{' => self.op_open_block(),
            '}' => self.op_close_block(),
            '<' => self.op_open_call(),
            '>' => self.op_close_call(),
            '(' => self.op_open_bracket(),
            ')' => self.op_close_bracket(),
            ';' => self.op_semicolon(),
            ':' => self.op_colon(),
            _ => unreachable!("operator dispatch covers the punctuation set"),
        }
    }

    fn op_equal(&mut self) -> Result<(), TranslateError> {
        match self.semantic {
            Semantic::Source => Err(self.error(SyntaxError::MissingFunctionName)),
            Semantic::Import => Err(self.error(SyntaxError::IncorrectImport)),
            Semantic::Identifier => {
                self.define_simple()?;
                self.emit(Item::Equal)?;
                self.semantic = Semantic::Expression;
                Ok(())
            }
            Semantic::Pattern => {
                if !self.bracket_stack.is_empty() {
                    return Err(self.error(SyntaxError::UnclosedStructBracket));
                }
                self.orphan_module_warning();
                let val = self.ses.ids.value(self.ident);
                if val.kind == ValueKind::Enum {
                    // The first sentence of a block upgrades the function
                    // from empty to computable.
                    if let Some(sentence) = self.cmd_sentence {
                        self.ses.ids.set_value(self.ident, Value::byte_code(sentence));
                        self.register_ident_name();
                    }
                }
                self.emit(Item::Equal)?;
                self.semantic = Semantic::Expression;
                Ok(())
            }
            Semantic::Expression => Err(self.error(SyntaxError::OperatorInExpression)),
        }
    }

    fn op_open_block(&mut self) -> Result<(), TranslateError> {
        match self.semantic {
            Semantic::Source => Err(self.error(SyntaxError::MissingFunctionName)),
            Semantic::Import => Err(self.error(SyntaxError::IncorrectImport)),
            Semantic::Identifier => {
                if !self.ses.ids.value(self.ident).is_undefined() {
                    return Err(self.error(SyntaxError::AlreadyDefined));
                }
                let sentence = self.emit(Item::Sentence(CellId::NIL))?;
                self.cmd_sentence = Some(sentence);
                self.prev_sentence = None;
                // Counted as empty until a sentence shows up.
                let id = self.fresh_enum();
                self.ses.ids.set_value(self.ident, Value::enumeration(id));
                self.register_ident_name();
                self.semantic = Semantic::Pattern;
                self.idc += 1;
                self.function_block += 1;
                Ok(())
            }
            Semantic::Pattern => Err(self.error(SyntaxError::BlockInPattern)),
            Semantic::Expression => Err(self.error(SyntaxError::NestedBlock)),
        }
    }

    fn op_close_block(&mut self) -> Result<(), TranslateError> {
        match self.semantic {
            Semantic::Source => Err(self.error(SyntaxError::MissingFunctionName)),
            Semantic::Import => Err(self.error(SyntaxError::IncorrectImport)),
            Semantic::Identifier => Err(self.error(SyntaxError::IncorrectFunctionDefinition)),
            Semantic::Pattern => {
                let Some(sentence) = self.cmd_sentence else {
                    return Err(self.error(SyntaxError::UnpairedBlockBracket));
                };
                if self.function_block == 0 {
                    return Err(self.error(SyntaxError::UnpairedBlockBracket));
                }
                if !self.ses.vm.is_evar_empty(sentence, self.ses.vm.free_head()) {
                    return Err(self.error(SyntaxError::PatternWithoutResult));
                }
                self.function_block -= 1;
                // The dangling sentence marker left by a trailing `;`
                // becomes the terminator, and its predecessor's payload is
                // zeroed: the last sentence of a block links to nothing.
                self.ses.vm.set_item(sentence, Item::Complete);
                if let Some(prev) = self.prev_sentence.take() {
                    self.ses.vm.set_item(prev, Item::Sentence(CellId::NIL));
                }
                self.cmd_sentence = None;
                self.semantic = Semantic::Source;
                self.after_block = true;
                Ok(())
            }
            Semantic::Expression => {
                if self.function_block == 0 {
                    return Err(self.error(SyntaxError::UnpairedBlockBracket));
                }
                self.function_block -= 1;
                self.finish_sentence(true)?;
                self.after_block = true;
                Ok(())
            }
        }
    }

    fn op_open_call(&mut self) -> Result<(), TranslateError> {
        match self.semantic {
            Semantic::Source => Err(self.error(SyntaxError::MissingFunctionName)),
            Semantic::Import => Err(self.error(SyntaxError::IncorrectImport)),
            Semantic::Identifier => Err(self.error(SyntaxError::IncorrectFunctionDefinition)),
            Semantic::Pattern => Err(self.error(SyntaxError::ExecInPattern)),
            Semantic::Expression => {
                if self.exec_stack.len() + 1 >= self.ses.cfg.execs_limit as usize {
                    return Err(self.error(SyntaxError::ExecsLimit));
                }
                self.orphan_module_warning();
                let open = self.emit(Item::OpenCall(Value::UNDEFINED))?;
                self.exec_stack.push(open);
                Ok(())
            }
        }
    }

    fn op_close_call(&mut self) -> Result<(), TranslateError> {
        match self.semantic {
            Semantic::Source => Err(self.error(SyntaxError::MissingFunctionName)),
            Semantic::Import => Err(self.error(SyntaxError::IncorrectImport)),
            Semantic::Identifier => Err(self.error(SyntaxError::IncorrectFunctionDefinition)),
            Semantic::Pattern => Err(self.error(SyntaxError::ExecInPattern)),
            Semantic::Expression => {
                let Some(&open) = self.exec_stack.last() else {
                    return Err(self.error(SyntaxError::UnpairedExecBracket));
                };
                self.orphan_module_warning();
                let callee = match self.ses.vm.item(open) {
                    Item::OpenCall(v) => v,
                    _ => Value::UNDEFINED,
                };
                // The execute cell copies the callee from its opening
                // bracket; an unresolved opening bracket is linked to the
                // execute cell instead, for the fix-up passes.
                let exec = self.emit(Item::Execute(callee))?;
                if callee.is_undefined() {
                    if callee.index == 0 {
                        return Err(self.error(SyntaxError::NoComputableFunction));
                    }
                    self.ses.vm.set_item(
                        open,
                        Item::OpenCall(Value { kind: ValueKind::Undefined, index: exec.raw() }),
                    );
                }
                self.exec_stack.pop();
                Ok(())
            }
        }
    }

    fn op_open_bracket(&mut self) -> Result<(), TranslateError> {
        match self.semantic {
            Semantic::Source => Err(self.error(SyntaxError::MissingFunctionName)),
            Semantic::Import => Err(self.error(SyntaxError::IncorrectImport)),
            Semantic::Identifier | Semantic::Pattern | Semantic::Expression => {
                if self.semantic == Semantic::Identifier {
                    self.define_simple()?;
                    self.semantic = Semantic::Pattern;
                }
                if self.bracket_stack.len() >= self.ses.cfg.brackets_limit as usize {
                    return Err(self.error(SyntaxError::BracketsLimit));
                }
                let open = self.emit(Item::OpenBracket(CellId::NIL))?;
                self.bracket_stack.push(open);
                Ok(())
            }
        }
    }

    fn op_close_bracket(&mut self) -> Result<(), TranslateError> {
        match self.semantic {
            Semantic::Source => Err(self.error(SyntaxError::MissingFunctionName)),
            Semantic::Import => Err(self.error(SyntaxError::IncorrectImport)),
            Semantic::Identifier => Err(self.error(SyntaxError::IncorrectFunctionDefinition)),
            Semantic::Pattern | Semantic::Expression => {
                let Some(open) = self.bracket_stack.pop() else {
                    return Err(self.error(SyntaxError::UnpairedStructBracket));
                };
                let close = self.emit(Item::CloseBracket(CellId::NIL))?;
                self.ses.vm.link_brackets(open, close);
                Ok(())
            }
        }
    }

    fn op_semicolon(&mut self) -> Result<(), TranslateError> {
        match self.semantic {
            Semantic::Source => {
                // Tolerate the `};` spelling after a block.
                if self.after_block {
                    self.after_block = false;
                    Ok(())
                } else {
                    Err(self.error(SyntaxError::MissingFunctionName))
                }
            }
            Semantic::Import => {
                self.semantic = Semantic::Source;
                self.imports = None;
                Ok(())
            }
            Semantic::Identifier => {
                // An empty function (ENUM).
                if !self.ses.ids.value(self.ident).is_undefined() {
                    return Err(self.error(SyntaxError::AlreadyDefined));
                }
                let id = self.fresh_enum();
                self.ses.ids.set_value(self.ident, Value::enumeration(id));
                self.register_ident_name();
                self.semantic = Semantic::Source;
                Ok(())
            }
            Semantic::Pattern => Err(self.error(SyntaxError::PatternWithoutResult)),
            Semantic::Expression => self.finish_sentence(false),
        }
    }

    fn finish_sentence(&mut self, closing: bool) -> Result<(), TranslateError> {
        if !self.exec_stack.is_empty() {
            return Err(self.error(SyntaxError::UnclosedExecBracket));
        }
        if !self.bracket_stack.is_empty() {
            return Err(self.error(SyntaxError::UnclosedStructBracket));
        }
        self.orphan_module_warning();
        let boundary;
        if !closing && self.function_block > 0 && self.cmd_sentence.is_some() {
            let next = self.emit(Item::Sentence(CellId::NIL))?;
            if let Some(current) = self.cmd_sentence {
                self.ses.vm.set_item(current, Item::Sentence(next));
                self.prev_sentence = Some(current);
            }
            self.cmd_sentence = Some(next);
            self.semantic = Semantic::Pattern;
            self.local = 0;
            self.idc += 1;
            boundary = next;
        } else {
            boundary = self.emit(Item::Complete)?;
            self.cmd_sentence = None;
            self.semantic = Semantic::Source;
        }
        // A call right before the sentence boundary needs no context to
        // come back to: mark it for the interpreter as a tail call.
        let before = self.ses.vm.prev(boundary);
        if matches!(self.ses.vm.item(before), Item::Execute(_)) {
            self.ses.vm.set_mark(before, Mark::Tail);
        }
        Ok(())
    }

    fn start_string(&mut self, quote: char) -> Result<(), TranslateError> {
        self.after_block = false;
        match self.semantic {
            Semantic::Source => Err(self.error(SyntaxError::MissingFunctionName)),
            Semantic::Import => Err(self.error(SyntaxError::IncorrectImport)),
            Semantic::Identifier => {
                self.define_simple()?;
                self.semantic = Semantic::Pattern;
                self.lexer = if quote == '\'' { Lexer::StringSingle } else { Lexer::StringDouble };
                Ok(())
            }
            Semantic::Pattern | Semantic::Expression => {
                self.lexer = if quote == '\'' { Lexer::StringSingle } else { Lexer::StringDouble };
                Ok(())
            }
        }
    }

    // --- modules ---

    fn op_colon(&mut self) -> Result<(), TranslateError> {
        match self.semantic {
            Semantic::Source => {
                self.imports = None;
                self.semantic = Semantic::Import;
                Ok(())
            }
            Semantic::Import => Err(self.error(SyntaxError::IncorrectImport)),
            Semantic::Pattern | Semantic::Expression => {
                Err(self.error(SyntaxError::ConditionsNotSupported))
            }
            Semantic::Identifier => self.module_import(),
        }
    }

    fn module_import(&mut self) -> Result<(), TranslateError> {
        let node = self.ident;
        let val = self.ses.ids.value(node);
        match val.kind {
            // Payload 0 marks a module already translated: reuse its
            // subtree.
            ValueKind::Enum if val.index == 0 => {
                let Some(space) = self.ses.ids.find_next(node, u32::from(' ')) else {
                    return Err(self.error(SyntaxError::NotDefinedInModule));
                };
                if let Some(alias) = self.imports_local.take() {
                    self.ses.ids.copy_node(alias, space);
                }
                self.imports = Some(space);
                self.namespace = self.module;
                self.semantic = Semantic::Import;
                Ok(())
            }
            ValueKind::Enum | ValueKind::MachineCode | ValueKind::ByteCode => {
                Err(self.error(SyntaxError::AlreadyDefined))
            }
            ValueKind::Undefined => {
                self.ses.ids.set_value(node, Value::enumeration(0));
                let space = self.ses.ids.insert_next(node, u32::from(' '));
                if self.module.is_some() && self.namespace == self.module {
                    // Module names of a module must land in the global
                    // namespace, where every importer finds the same
                    // subtree. Rescan the name with the global root.
                    self.namespace = None;
                    self.imports_local = Some(space);
                    self.imports = None;
                    self.at = self.ident_span.0;
                    self.pos = self.ident_pos.saturating_sub(1);
                    self.semantic = Semantic::Source;
                    self.lexer = Lexer::Whitespace;
                    return Ok(());
                }
                debug_assert!(self.namespace.is_none());
                self.namespace = self.module;
                self.load_module(space)?;
                // Link the in-module alias only after the subtree is
                // populated.
                if let Some(alias) = self.imports_local.take() {
                    self.ses.ids.copy_node(alias, space);
                }
                self.imports = Some(space);
                self.semantic = Semantic::Import;
                Ok(())
            }
        }
    }

    fn load_module(&mut self, space: TrieId) -> Result<(), TranslateError> {
        let span = self.ident_span;
        let Some(name) = self.span_text(span).map(str::to_owned) else {
            return Err(self.error(SyntaxError::InvalidModuleName));
        };
        if name.len() + ".реф".len() > 255 {
            return Err(self.error(SyntaxError::ModuleNameTooLong));
        }
        let dir = self.source.and_then(Path::parent);
        for ext in [".реф", ".ref"] {
            let file = format!("{name}{ext}");
            let path = match dir {
                Some(dir) => dir.join(&file),
                None => Path::new(&file).to_path_buf(),
            };
            if let Ok(data) = fs::read(&path) {
                return translate_unit(self.ses, Some(space), &data, Some(&path));
            }
        }
        let message = Message {
            severity: Severity::Critical,
            detail: "module source text is not available".to_owned(),
            source: Some(format!("{name}.реф")),
            line: 0,
            column: 0,
            text: None,
        };
        self.ses.sink.report(&message);
        Err(self.error(SyntaxError::InvalidModuleName))
    }

    // --- end of input ---

    fn finish_at_eof(&mut self) -> Result<(), TranslateError> {
        if matches!(self.lexer, Lexer::StringSingle | Lexer::StringDouble) {
            return Err(self.error(SyntaxError::UnterminatedString));
        }
        self.finish_token()?;
        if self.semantic != Semantic::Source {
            let detail = if self.function_block > 0 {
                SyntaxError::UnterminatedBlock
            } else {
                SyntaxError::UnterminatedFunction
            };
            return Err(self.error(detail));
        }
        Ok(())
    }

    // --- forward references ---

    /// Resolves identifiers defined after use.
    ///
    /// Pass 1 visits, in emission order, the occurrences inside calls whose
    /// callee was still open, and binds the first computable definition to
    /// the call. Pass 2 turns every remaining occurrence into an
    /// `identifier` cell — declaring still-unknown names implicitly as
    /// enums — and reports calls that never acquired a computable callee.
    fn fixup(&mut self) -> Result<(), TranslateError> {
        for k in 0..self.forward.len() {
            let rec = self.forward[k];
            let Some(open) = rec.exec else { continue };
            let val = self.ses.ids.value(rec.node);
            if val.is_undefined() || val.kind == ValueKind::Enum {
                continue;
            }
            let Item::OpenCall(open_val) = self.ses.vm.item(open) else { continue };
            if !open_val.is_undefined() {
                continue;
            }
            let exec = CellId::new(open_val.index);
            let Item::Execute(exec_val) = self.ses.vm.item(exec) else { continue };
            if !exec_val.is_undefined() {
                continue;
            }
            self.ses.vm.set_item(exec, Item::Execute(val));
            let name = self.span_text(rec.span).map(str::to_owned);
            if let Some(name) = name {
                self.ses.interns.register_name(val, &name);
            }
            self.forward[k].bound_as_callee = true;
        }

        let mut errors = 0usize;
        let mut first: Option<(u32, u32)> = None;
        let mut last_exec = CellId::NIL;
        for k in 0..self.forward.len() {
            let rec = self.forward[k];
            if rec.bound_as_callee {
                // The occurrence was consumed as the call target; drop the
                // placeholder from the stream.
                let before = self.ses.vm.prev(rec.opcode);
                let after = self.ses.vm.next(rec.opcode);
                self.ses.vm.free_evar(before, after);
                continue;
            }
            let mut val = self.ses.ids.value(rec.node);
            if val.is_undefined() {
                if self.ses.cfg.warn_implicit_declaration {
                    self.warning_at(
                        "implicit declaration of an identifier",
                        rec.line,
                        rec.pos,
                        rec.line_start,
                    );
                }
                let id = self.fresh_enum();
                val = Value::enumeration(id);
                self.ses.ids.set_value(rec.node, val);
            }
            let name = self.span_text(rec.span).map(str::to_owned);
            if let Some(name) = name {
                self.ses.interns.register_name(val, &name);
            }
            if let Some(open) = rec.exec {
                if let Item::OpenCall(open_val) = self.ses.vm.item(open) {
                    if open_val.is_undefined() {
                        let exec = CellId::new(open_val.index);
                        if let Item::Execute(exec_val) = self.ses.vm.item(exec) {
                            if exec_val.is_undefined() && last_exec != exec {
                                last_exec = exec;
                                self.error_at(
                                    SyntaxError::NoComputableFunction,
                                    rec.line,
                                    rec.pos,
                                    rec.line_start,
                                );
                                first.get_or_insert((rec.line, rec.pos));
                                errors += 1;
                            }
                        }
                    }
                }
            }
            self.ses.vm.set_item(rec.opcode, Item::Identifier(val));
        }
        if errors > 0 {
            let (line, column) = first.unwrap_or((self.line_num, self.pos));
            return Err(TranslateError::Syntax {
                detail: SyntaxError::NoComputableFunction,
                line,
                column,
            });
        }
        Ok(())
    }
}

fn var_item(kind: IdKind, slot: u32) -> Item {
    match kind {
        IdKind::Svar => Item::Svar(slot),
        IdKind::Tvar => Item::Tvar(slot),
        IdKind::Evar => Item::Evar(slot),
        IdKind::Global => unreachable!("variable emission is only for variable kinds"),
    }
}
