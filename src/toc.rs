//! Table-of-contents parser: DjVu outline s-expression → flat bookmark list.
//!
//! `djvused -e print-outline` prints the document outline as one nested
//! s-expression:
//!
//! ```text
//! (bookmarks
//!  ("Intro" "#1")
//!  ("Chapter 1" "#5"
//!   ("Section" "#7") ) )
//! ```
//!
//! Each node is `(title reference child*)`. [`parse`] flattens the tree into
//! depth-first pre-order [`Bookmark`]s, which [`format_toc`] serialises into
//! the tab-indented `"title" "page"` lines understood by `pdfbeads --toc`.
//!
//! ## Grammar
//!
//! ```text
//! node          := '(' ws* quoted_string ws+ quoted_string (ws+ node)* ')'
//! quoted_string := '"' (any_char_except_unescaped_quote | '\"')* '"'
//! ```
//!
//! The input is scanned once, left to right. Open nodes live on an explicit
//! stack of `(` offsets rather than the call stack, so nesting depth is bounded
//! only by memory.
//!
//! ## Quirks kept on purpose
//!
//! * An escaped quote `\"` inside a string is emitted as a single quote `'`,
//!   not as `"`. Downstream TOC files have always been written this way.
//! * Any run of `)` between top-level nodes is accepted. Real outlines end
//!   with the closing paren of `(bookmarks`, and some files carry extra ones.
//!   A node that is still open at end of input is an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker that opens every outline printed by `djvused`.
pub const OUTLINE_PREFIX: &str = "(bookmarks";

/// Number of input bytes shown on each side of an error offset.
const CONTEXT_RADIUS: usize = 16;

/// One flattened outline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Title text with the escaped-quote transform applied.
    pub title: String,
    /// Target reference as written in the outline, usually `#<page>`.
    pub reference: String,
    /// Nesting depth; top-level entries are 0.
    pub depth: usize,
}

impl Bookmark {
    /// Reference with a single leading `#` removed.
    pub fn target(&self) -> &str {
        self.reference
            .strip_prefix('#')
            .unwrap_or(self.reference.as_str())
    }

    /// 1-based page number when the target is a plain decimal page number.
    pub fn page_number(&self) -> Option<usize> {
        let target = self.target();
        if target.is_empty() || !target.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        target.parse().ok().filter(|&n: &usize| n >= 1)
    }

    /// Render as a `pdfbeads --toc` line: `depth` tabs, then `"title" "target"`.
    pub fn to_line(&self) -> String {
        let mut line = "\t".repeat(self.depth);
        line.push('"');
        line.push_str(&self.title);
        line.push_str("\" \"");
        line.push_str(self.target());
        line.push('"');
        line
    }
}

/// Malformed outline input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TocParseError {
    #[error("unterminated string starting at offset {offset} near {context:?}")]
    UnterminatedString { offset: usize, context: String },

    #[error("outline node opened at offset {offset} is never closed, near {context:?}")]
    UnclosedNode { offset: usize, context: String },

    #[error("expected {expected} at offset {offset}, found {found}, near {context:?}")]
    Unexpected {
        offset: usize,
        expected: &'static str,
        found: String,
        context: String,
    },
}

impl TocParseError {
    /// Byte offset into the parsed input where the problem was detected.
    pub fn offset(&self) -> usize {
        match self {
            TocParseError::UnterminatedString { offset, .. }
            | TocParseError::UnclosedNode { offset, .. }
            | TocParseError::Unexpected { offset, .. } => *offset,
        }
    }
}

/// Parse the whole `djvused print-outline` output.
///
/// Empty output, or output no longer than the `(bookmarks` marker, means the
/// document has no outline and yields an empty list.
pub fn parse_outline(raw: &str) -> Result<Vec<Bookmark>, TocParseError> {
    if raw.len() <= OUTLINE_PREFIX.len() {
        return Ok(Vec::new());
    }
    let body = raw.trim_start();
    let body = body.strip_prefix(OUTLINE_PREFIX).unwrap_or(body);
    parse(body)
}

/// Parse an outline body (the text after `(bookmarks`) into pre-order bookmarks.
pub fn parse(body: &str) -> Result<Vec<Bookmark>, TocParseError> {
    let src = body.as_bytes();
    let mut out = Vec::new();
    // Offsets of the `(` of every node not yet closed, outermost first.
    let mut open: Vec<usize> = Vec::new();

    let mut pos = skip_leading_keyword(src, skip_ws(src, 0));
    loop {
        match open.last().copied() {
            None => {
                pos = skip_closers(src, pos);
                match src.get(pos) {
                    None => break,
                    Some(b'(') => pos = open_node(body, pos, &mut open, &mut out)?,
                    Some(_) => return Err(unexpected(body, pos, "'(' or end of outline")),
                }
            }
            Some(innermost) => {
                pos = skip_ws(src, pos);
                match src.get(pos) {
                    Some(b'(') => pos = open_node(body, pos, &mut open, &mut out)?,
                    Some(b')') => {
                        open.pop();
                        pos += 1;
                    }
                    Some(_) => return Err(unexpected(body, pos, "'(' or ')'")),
                    None => {
                        return Err(TocParseError::UnclosedNode {
                            offset: innermost,
                            context: excerpt(body, innermost),
                        })
                    }
                }
            }
        }
    }

    Ok(out)
}

/// Serialise bookmarks as newline-separated `pdfbeads --toc` lines.
pub fn format_toc(bookmarks: &[Bookmark]) -> String {
    bookmarks
        .iter()
        .map(Bookmark::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read the title and reference of the node whose `(` sits at `start`, record
/// it one level below the innermost open node and push it onto `open`.
/// Returns the offset after the reference.
fn open_node(
    body: &str,
    start: usize,
    open: &mut Vec<usize>,
    out: &mut Vec<Bookmark>,
) -> Result<usize, TocParseError> {
    let src = body.as_bytes();
    let pos = skip_ws(src, start + 1);
    let (title, pos) = read_quoted(body, pos)?;

    let after_title = pos;
    let pos = skip_ws(src, pos);
    if pos == after_title && pos < src.len() {
        return Err(unexpected(body, pos, "whitespace after title"));
    }
    let (reference, pos) = read_quoted(body, pos)?;

    out.push(Bookmark {
        title,
        reference,
        depth: open.len(),
    });
    open.push(start);
    Ok(pos)
}

/// Read a quoted string starting at `start`; returns the transformed text and
/// the offset after the closing quote.
fn read_quoted(body: &str, start: usize) -> Result<(String, usize), TocParseError> {
    let src = body.as_bytes();
    if src.get(start) != Some(&b'"') {
        return Err(unexpected(body, start, "'\"'"));
    }

    let mut text = String::new();
    let mut segment = start + 1;
    let mut pos = start + 1;
    while pos < src.len() {
        match src[pos] {
            b'"' => {
                text.push_str(&body[segment..pos]);
                return Ok((text, pos + 1));
            }
            b'\\' if src.get(pos + 1) == Some(&b'"') => {
                text.push_str(&body[segment..pos]);
                text.push('\'');
                pos += 2;
                segment = pos;
            }
            // Other escape pairs pass through untouched but still cannot close the string.
            b'\\' if pos + 1 < src.len() => pos += 2,
            _ => pos += 1,
        }
    }

    Err(TocParseError::UnterminatedString {
        offset: start,
        context: excerpt(body, start),
    })
}

fn skip_ws(src: &[u8], mut pos: usize) -> usize {
    while pos < src.len() && src[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn skip_closers(src: &[u8], mut pos: usize) -> usize {
    while pos < src.len() && (src[pos] == b')' || src[pos].is_ascii_whitespace()) {
        pos += 1;
    }
    pos
}

/// Skip a bare `bookmarks` keyword left over when only `(` was stripped.
/// The keyword must end at whitespace, a paren or end of input.
fn skip_leading_keyword(src: &[u8], pos: usize) -> usize {
    let keyword = &OUTLINE_PREFIX.as_bytes()[1..];
    if !src[pos..].starts_with(keyword) {
        return pos;
    }
    let end = pos + keyword.len();
    match src.get(end) {
        None | Some(b'(') | Some(b')') => end,
        Some(b) if b.is_ascii_whitespace() => end,
        Some(_) => pos,
    }
}

fn unexpected(body: &str, pos: usize, expected: &'static str) -> TocParseError {
    let found = body[pos..]
        .chars()
        .next()
        .map(|c| format!("{c:?}"))
        .unwrap_or_else(|| "end of input".to_string());
    TocParseError::Unexpected {
        offset: pos,
        expected,
        found,
        context: excerpt(body, pos),
    }
}

/// Input text around `pos`, clamped to char boundaries.
fn excerpt(body: &str, pos: usize) -> String {
    let mut start = pos.saturating_sub(CONTEXT_RADIUS);
    while !body.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + CONTEXT_RADIUS).min(body.len());
    while !body.is_char_boundary(end) {
        end += 1;
    }
    body[start..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(body: &str) -> Vec<String> {
        parse(body)
            .expect("outline should parse")
            .iter()
            .map(Bookmark::to_line)
            .collect()
    }

    #[test]
    fn parses_nested_outline_in_preorder() {
        let body = r##" ("Intro" "#1") ("Chapter 1" "#5" ("Section" "#7")))"##;
        assert_eq!(
            lines(body),
            vec!["\"Intro\" \"1\"", "\"Chapter 1\" \"5\"", "\t\"Section\" \"7\""]
        );
    }

    #[test]
    fn escaped_quotes_become_single_quotes() {
        let body = r##"("He said \"Hi\"" "#3")"##;
        let bookmarks = parse(body).unwrap();
        assert_eq!(bookmarks[0].title, "He said 'Hi'");
    }

    #[test]
    fn other_escapes_are_kept_verbatim() {
        let body = r##"("back\\slash" "#2")"##;
        let bookmarks = parse(body).unwrap();
        assert_eq!(bookmarks[0].title, r"back\\slash");
    }

    #[test]
    fn tolerates_bare_bookmarks_keyword_and_extra_closers() {
        let body = r##"bookmarks ("Intro" "#1") ("Chapter 1" "#5" ("Section" "#7")))))"##;
        assert_eq!(lines(body).len(), 3);
    }

    #[test]
    fn empty_and_blank_bodies_yield_nothing() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("  \n\t").unwrap().is_empty());
        assert!(parse(" ) ) ").unwrap().is_empty());
    }

    #[test]
    fn parse_outline_handles_short_and_prefixed_input() {
        assert!(parse_outline("").unwrap().is_empty());
        assert!(parse_outline("(bookmarks").unwrap().is_empty());
        assert!(parse_outline("(bookmarks)").unwrap().is_empty());

        let raw = "(bookmarks\n (\"A\" \"#1\"\n  (\"B\" \"#2\") ) )\n";
        let bookmarks = parse_outline(raw).unwrap();
        assert_eq!(bookmarks.len(), 2);
        assert_eq!(bookmarks[1].depth, 1);
    }

    #[test]
    fn deep_nesting_tracks_depth() {
        let body = r##"("a" "#1" ("b" "#2" ("c" "#3" ("d" "#4"))))"##;
        let depths: Vec<usize> = parse(body).unwrap().iter().map(|b| b.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 3]);
    }

    #[test]
    fn target_strips_only_leading_hash() {
        let b = Bookmark {
            title: "x".into(),
            reference: "#42".into(),
            depth: 0,
        };
        assert_eq!(b.target(), "42");
        assert_eq!(b.page_number(), Some(42));

        let named = Bookmark {
            title: "x".into(),
            reference: "p0005.djvu".into(),
            depth: 0,
        };
        assert_eq!(named.target(), "p0005.djvu");
        assert_eq!(named.page_number(), None);
    }

    #[test]
    fn unterminated_string_reports_offset() {
        let err = parse(r##"("Intro "#1")"##).unwrap_err();
        // `"Intro "` closes early, then `#` is not a quote.
        assert!(matches!(err, TocParseError::Unexpected { .. }), "{err}");

        let err = parse(r#"("Intro" "never closed"#).unwrap_err();
        assert!(matches!(err, TocParseError::UnterminatedString { offset: 9, .. }), "{err}");
    }

    #[test]
    fn unclosed_node_is_an_error() {
        let err = parse(r##"("Intro" "#1" ("Child" "#2")"##).unwrap_err();
        match err {
            TocParseError::UnclosedNode { offset, .. } => assert_eq!(offset, 0),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn garbage_between_nodes_is_rejected() {
        let err = parse(r##"("a" "#1") junk"##).unwrap_err();
        assert_eq!(err.offset(), 11);
        assert!(err.to_string().contains("junk"));
    }

    #[test]
    fn keyword_must_stand_alone() {
        let err = parse(r##"bookmarksX ("a" "#1")"##).unwrap_err();
        assert!(matches!(err, TocParseError::Unexpected { offset: 0, .. }), "{err}");

        let err = parse(r##"bookmarks2 ("a" "#1")"##).unwrap_err();
        assert_eq!(err.offset(), 0);

        assert_eq!(parse(r##"bookmarks("a" "#1")"##).unwrap().len(), 1);
        assert!(parse("bookmarks").unwrap().is_empty());
        assert!(parse("bookmarks)").unwrap().is_empty());
    }

    #[test]
    fn very_deep_nesting_does_not_exhaust_the_stack() {
        const LEVELS: usize = 100_000;
        let mut body = String::with_capacity(LEVELS * 12);
        for _ in 0..LEVELS {
            body.push_str(r##"("t" "#1" "##);
        }
        body.push_str(&")".repeat(LEVELS));

        let bookmarks = parse(&body).unwrap();
        assert_eq!(bookmarks.len(), LEVELS);
        assert_eq!(bookmarks[0].depth, 0);
        assert_eq!(bookmarks[LEVELS - 1].depth, LEVELS - 1);
    }

    #[test]
    fn very_deep_unclosed_nesting_reports_innermost_node() {
        const LEVELS: usize = 100_000;
        let node = r##"("t" "#1" "##;
        let body = node.repeat(LEVELS);

        let err = parse(&body).unwrap_err();
        match err {
            TocParseError::UnclosedNode { offset, .. } => {
                assert_eq!(offset, (LEVELS - 1) * node.len())
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_ascii_titles_survive() {
        let bookmarks = parse(r##"("Глава 1 — начало" "#9")"##).unwrap();
        assert_eq!(bookmarks[0].title, "Глава 1 — начало");
        assert_eq!(format_toc(&bookmarks), "\"Глава 1 — начало\" \"9\"");
    }
}
