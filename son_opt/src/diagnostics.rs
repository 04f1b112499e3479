//! Rendering of semantic errors against source text.
//!
//! Nodes only carry byte spans. A [`SourceMap`] turns those into line and
//! column positions so a front-end can print
//!
//! ```text
//! error: might be null accessing 'x'
//!   --> prog.smp:3:12
//!    |
//!  3 |     return p.x;
//!    |            ^^^
//! ```

use son_core::error::{Diagnostic, SonError};
use son_core::span::Span;
use std::fmt::Write;

// =============================================================================
// Source Map
// =============================================================================

/// Line-start table over one source file.
#[derive(Debug, Clone)]
pub struct SourceMap {
    /// Byte offset of every line start; always begins with 0.
    line_starts: Vec<usize>,
    source: String,
    filename: String,
}

/// A resolved position: 1-based line, 0-based byte column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl SourceMap {
    pub fn new(source: &str, filename: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(
                source
                    .bytes()
                    .enumerate()
                    .filter(|&(_, b)| b == b'\n')
                    .map(|(i, _)| i + 1),
            )
            .collect();
        Self {
            line_starts,
            source: source.to_string(),
            filename: filename.to_string(),
        }
    }

    /// Position of a byte offset. Offsets past the end land on the last line.
    pub fn resolve(&self, offset: usize) -> SourcePosition {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert.saturating_sub(1),
        };
        SourcePosition {
            line: line + 1,
            column: offset.saturating_sub(self.line_starts[line]),
        }
    }

    /// Text of a 1-based line without its line terminator.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        if line == 0 || line > self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.source.len());
        let text = self.source.get(start..end)?;
        Some(text.trim_end_matches('\n').trim_end_matches('\r'))
    }

    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[inline]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Render one diagnostic with its source line and a caret underline.
///
/// Spans covering several lines are underlined to the end of the first.
/// A synthetic node's empty span at offset 0 still gets a single caret.
pub fn render_diagnostic(map: &SourceMap, diag: &Diagnostic) -> String {
    let mut out = String::with_capacity(128);
    let _ = writeln!(out, "error: {}", diag.message);

    let span = diag.span;
    let pos = map.resolve(span.start as usize);
    let _ = write!(out, "  --> {}:{}:{}", map.filename(), pos.line, pos.column + 1);

    if let Some(text) = map.line_text(pos.line) {
        let gutter = pos.line.to_string().len();
        let pad = " ".repeat(gutter);
        let width = caret_width(map, span, pos, text);
        let _ = write!(
            out,
            "\n{pad} |\n{} | {text}\n{pad} | {}{}",
            pos.line,
            " ".repeat(pos.column),
            "^".repeat(width)
        );
    }
    out
}

fn caret_width(map: &SourceMap, span: Span, pos: SourcePosition, text: &str) -> usize {
    if span.is_empty() {
        return 1;
    }
    let last = map.resolve(span.end as usize - 1);
    let end = if last.line == pos.line {
        last.column + 1
    } else {
        text.len()
    };
    end.saturating_sub(pos.column).max(1)
}

/// Render every diagnostic of an error, separated by blank lines.
///
/// Internal errors have no source location and print as a single line.
pub fn render_error(map: &SourceMap, err: &SonError) -> String {
    match err {
        SonError::Semantic(diags) => diags
            .iter()
            .map(|d| render_diagnostic(map, d))
            .collect::<Vec<_>>()
            .join("\n\n"),
        SonError::Internal { .. } => format!("error: {err}"),
    }
}

// =============================================================================
// Tests
// =============================================================================
