//! Diagnostics: structured messages and the sink they are reported through.
//!
//! The core never formats user-facing strings itself; every error, warning
//! and notice is a [`Message`] record handed to an injected [`MessageSink`].
//! [`StderrMessages`] renders them with the offending line and a caret under
//! the column; [`CollectMessages`] buffers them for inspection in tests.

use std::fmt::Write as _;

use strum::Display;

/// Message severities, from fatal to advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Severity {
    #[strum(serialize = "critical error")]
    Critical,
    #[strum(serialize = "error")]
    Error,
    #[strum(serialize = "warning")]
    Warning,
    #[strum(serialize = "notice")]
    Notice,
}

/// One diagnostic with its source coordinates.
#[derive(Debug, Clone)]
pub struct Message {
    pub severity: Severity,
    pub detail: String,
    /// Path of the source file, when known.
    pub source: Option<String>,
    /// 1-based line number; 0 when coordinates do not apply.
    pub line: u32,
    /// 1-based column of the offending character.
    pub column: u32,
    /// The offending source line, up to the line break.
    pub text: Option<String>,
}

impl Message {
    /// Renders the message the way the command-line driver prints it.
    pub fn render(&self) -> String {
        let source = self.source.as_deref().unwrap_or("");
        let mut out = String::new();
        match &self.text {
            None => {
                let _ = write!(
                    out,
                    "{source}: {}: {} ({}:{}).",
                    self.severity, self.detail, self.line, self.column
                );
            }
            Some(text) => {
                let _ = write!(
                    out,
                    "{source}:{}:{}: {}: {}:",
                    self.line, self.column, self.severity, self.detail
                );
                let _ = write!(out, "\n{:5} |{text}", self.line);
                let pad = text
                    .chars()
                    .take(self.column.saturating_sub(1) as usize)
                    .map(|c| if c == '\t' { '\t' } else { ' ' })
                    .collect::<String>();
                let _ = write!(out, "\n      |{pad}^");
            }
        }
        out
    }
}

/// Consumes diagnostics produced by the translator and the interpreter.
pub trait MessageSink {
    fn report(&mut self, message: &Message);
}

/// Default sink: prints every message to stderr.
#[derive(Debug, Default)]
pub struct StderrMessages;

impl MessageSink for StderrMessages {
    fn report(&mut self, message: &Message) {
        eprintln!("{}", message.render());
    }
}

/// Buffering sink for tests and embedding.
#[derive(Debug, Default)]
pub struct CollectMessages {
    pub messages: Vec<Message>,
}

impl CollectMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of messages at the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.messages.iter().filter(|m| m.severity == severity).count()
    }

    /// True when some message's detail contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.detail.contains(needle))
    }
}

impl MessageSink for CollectMessages {
    fn report(&mut self, message: &Message) {
        self.messages.push(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_form_points_at_the_column() {
        let message = Message {
            severity: Severity::Error,
            detail: "unpaired evaluation bracket".to_owned(),
            source: Some("demo.ref".to_owned()),
            line: 3,
            column: 9,
            text: Some("Go = 'x' >;".to_owned()),
        };
        let rendered = message.render();
        assert!(rendered.starts_with("demo.ref:3:9: error: unpaired evaluation bracket:"));
        let caret_line = rendered.lines().last().unwrap();
        assert_eq!(caret_line.chars().filter(|&c| c == '^').count(), 1);
        assert!(caret_line.ends_with("        ^"));
    }

    #[test]
    fn bare_form_appends_coordinates() {
        let message = Message {
            severity: Severity::Critical,
            detail: "source text is not available".to_owned(),
            source: Some("missing.ref".to_owned()),
            line: 0,
            column: 0,
            text: None,
        };
        assert_eq!(
            message.render(),
            "missing.ref: critical error: source text is not available (0:0)."
        );
    }

    #[test]
    fn collecting_sink_counts_by_severity() {
        let mut sink = CollectMessages::new();
        for severity in [Severity::Warning, Severity::Warning, Severity::Notice] {
            sink.report(&Message {
                severity,
                detail: "integer overflow in a numeric literal".to_owned(),
                source: None,
                line: 1,
                column: 1,
                text: None,
            });
        }
        assert_eq!(sink.count(Severity::Warning), 2);
        assert_eq!(sink.count(Severity::Notice), 1);
        assert!(sink.contains("integer overflow"));
    }
}
