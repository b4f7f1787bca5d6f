//! Minimal s-expression reader for `djvused print-txt` output.
//!
//! The hidden text layer of a DjVu page is printed as nested zones:
//!
//! ```text
//! (page 0 0 2550 3300
//!  (line 100 3000 900 3040
//!   (word 100 3000 300 3040 "Hello")
//!   (word 340 3000 900 3040 "world")))
//! ```
//!
//! Zone coordinates are `xmin ymin xmax ymax` with the origin at the
//! bottom-left of the page. [`word_boxes`] collects the `word` zones and
//! converts them to top-left [`WordBox`]es. A page whose text was stored
//! without word zones (only `line` or `page` zones) yields those zones
//! instead, so the text is still searchable.

use crate::overlay::WordBox;
use thiserror::Error;
use tracing::debug;

/// A parsed s-expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    /// Bare symbol or number.
    Atom(String),
    /// Quoted string with escapes decoded.
    Str(String),
    List(Vec<SExpr>),
}

impl SExpr {
    fn as_atom(&self) -> Option<&str> {
        match self {
            SExpr::Atom(a) => Some(a.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SExprError {
    #[error("unterminated string at offset {0}")]
    UnterminatedString(usize),
    #[error("unbalanced parenthesis at offset {0}")]
    Unbalanced(usize),
}

/// Which corner the zone coordinates are measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxOrigin {
    TopLeft,
    BottomLeft,
}

/// Zone kinds in the order DjVu nests them, finest last.
const ZONE_KINDS: [&str; 7] = ["page", "column", "region", "para", "line", "word", "char"];

/// Parse every top-level expression in `input`.
pub fn parse(input: &str) -> Result<Vec<SExpr>, SExprError> {
    let src = input.as_bytes();
    let mut stack: Vec<(usize, Vec<SExpr>)> = Vec::new();
    let mut top = Vec::new();
    let mut pos = 0;

    while pos < src.len() {
        let b = src[pos];
        if b.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let item = match b {
            b'(' => {
                stack.push((pos, Vec::new()));
                pos += 1;
                continue;
            }
            b')' => {
                let (_, items) = stack.pop().ok_or(SExprError::Unbalanced(pos))?;
                pos += 1;
                SExpr::List(items)
            }
            b'"' => {
                let (text, next) = read_string(src, pos)?;
                pos = next;
                SExpr::Str(text)
            }
            _ => {
                let start = pos;
                while pos < src.len()
                    && !src[pos].is_ascii_whitespace()
                    && !matches!(src[pos], b'(' | b')' | b'"')
                {
                    pos += 1;
                }
                SExpr::Atom(String::from_utf8_lossy(&src[start..pos]).into_owned())
            }
        };
        match stack.last_mut() {
            Some((_, items)) => items.push(item),
            None => top.push(item),
        }
    }

    if let Some((open, _)) = stack.last() {
        return Err(SExprError::Unbalanced(*open));
    }
    Ok(top)
}

/// Decode a C-style quoted string starting at `start`. Octal escapes are raw
/// bytes (djvused emits UTF-8 this way without `-u`).
fn read_string(src: &[u8], start: usize) -> Result<(String, usize), SExprError> {
    let mut bytes = Vec::new();
    let mut pos = start + 1;
    while pos < src.len() {
        match src[pos] {
            b'"' => return Ok((String::from_utf8_lossy(&bytes).into_owned(), pos + 1)),
            b'\\' if pos + 1 < src.len() => {
                let esc = src[pos + 1];
                pos += 2;
                match esc {
                    b'n' => bytes.push(b'\n'),
                    b't' => bytes.push(b'\t'),
                    b'r' => bytes.push(b'\r'),
                    b'0'..=b'7' => {
                        let mut value = u32::from(esc - b'0');
                        let mut digits = 1;
                        while digits < 3 && pos < src.len() && (b'0'..=b'7').contains(&src[pos]) {
                            value = value * 8 + u32::from(src[pos] - b'0');
                            pos += 1;
                            digits += 1;
                        }
                        bytes.push(value as u8);
                    }
                    other => bytes.push(other),
                }
            }
            other => {
                bytes.push(other);
                pos += 1;
            }
        }
    }
    Err(SExprError::UnterminatedString(start))
}

/// Collect the finest-grained text zones as top-left word boxes.
///
/// `page_height` is needed to flip bottom-left coordinates. Zones with
/// missing or unparsable coordinates are skipped.
pub fn word_boxes(exprs: &[SExpr], origin: BoxOrigin, page_height: f32) -> Vec<WordBox> {
    let mut finest: Option<usize> = None;
    let mut zones: Vec<(usize, WordBox)> = Vec::new();
    for expr in exprs {
        collect_zones(expr, origin, page_height, &mut zones, &mut finest);
    }

    match finest {
        Some(rank) => zones
            .into_iter()
            .filter(|(r, _)| *r == rank)
            .map(|(_, w)| w)
            .collect(),
        None => Vec::new(),
    }
}

fn collect_zones(
    expr: &SExpr,
    origin: BoxOrigin,
    page_height: f32,
    zones: &mut Vec<(usize, WordBox)>,
    finest: &mut Option<usize>,
) {
    let SExpr::List(items) = expr else {
        return;
    };
    let Some(rank) = items
        .first()
        .and_then(SExpr::as_atom)
        .and_then(|kind| ZONE_KINDS.iter().position(|k| *k == kind))
    else {
        return;
    };

    let text = items.iter().skip(5).find_map(|item| match item {
        SExpr::Str(s) => Some(s.as_str()),
        _ => None,
    });

    if let Some(text) = text {
        match zone_box(items, text, origin, page_height) {
            Some(word) => {
                *finest = Some(finest.map_or(rank, |f| f.max(rank)));
                zones.push((rank, word));
            }
            None => debug!(?items, "skipping zone with unparsable coordinates"),
        }
    }

    for child in items.iter().skip(5) {
        collect_zones(child, origin, page_height, zones, finest);
    }
}

fn zone_box(items: &[SExpr], text: &str, origin: BoxOrigin, page_height: f32) -> Option<WordBox> {
    if items.len() < 5 {
        return None;
    }
    let mut coords = [0f32; 4];
    for (slot, item) in coords.iter_mut().zip(&items[1..5]) {
        *slot = item.as_atom()?.parse().ok()?;
    }
    let [x0, a, x1, b] = coords;
    let (y0, y1) = match origin {
        BoxOrigin::TopLeft => (a, b),
        BoxOrigin::BottomLeft => (page_height - b, page_height - a),
    };
    Some(WordBox::new(text, x0, y0, x1, y1))
}
