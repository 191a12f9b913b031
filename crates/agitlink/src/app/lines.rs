//! Mapping rune offsets in a text buffer to 1-based line numbers.

use crate::domain::model::LineRange;

/// Which end of a selection an offset marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// The offset names the first selected rune.
    Start,
    /// The offset sits just past the last selected rune.
    End,
}

/// Line number (1-based) containing `rune_offset` in `body`.
///
/// A start offset resolves to the line of the rune it points at. An end offset resolves to
/// the line of the rune just before it, so a selection ending right after a newline stays on
/// the line that newline terminates. Offsets past the end of the text land on the last line.
pub fn line_number(body: &[u8], rune_offset: usize, bound: Bound) -> usize {
    let mut line = 1;
    let mut offset = 0;
    for rune in runes(body) {
        if bound == Bound::Start && offset >= rune_offset {
            return line;
        }
        offset += 1;
        if bound == Bound::End && offset >= rune_offset {
            return line;
        }
        if rune == Some('\n') {
            line += 1;
        }
    }

    // There's no line after the final newline.
    if line > 1 {
        line -= 1;
    }
    line
}

impl LineRange {
    /// Lines covered by the selection `[start, end)` of rune offsets.
    ///
    /// An empty selection at the start of a line maps its end onto the previous line; the
    /// range collapses onto the start line instead.
    pub fn from_selection(body: &[u8], start: usize, end: usize) -> Self {
        let start = line_number(body, start, Bound::Start);
        let end = line_number(body, end, Bound::End).max(start);
        Self { start, end }
    }
}

/// Decode `body` into runes. Each byte of an invalid sequence counts as one rune (`None`).
fn runes(body: &[u8]) -> impl Iterator<Item = Option<char>> + '_ {
    body.utf8_chunks().flat_map(|chunk| {
        chunk
            .valid()
            .chars()
            .map(Some)
            .chain(chunk.invalid().iter().map(|_| None))
    })
}
