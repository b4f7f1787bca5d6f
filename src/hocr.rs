//! hOCR word extraction and serialisation.
//!
//! `djvu2hocr` and `tesseract … hocr` both describe words as spans:
//!
//! ```html
//! <span class="ocrx_word" title="bbox 10 20 60 40; x_wconf 93">Hello</span>
//! ```
//!
//! `djvu2hocr` uses the `ocrx_word` class where pdfbeads expects `ocr_word`,
//! so both spellings are accepted here, and [`write_page`] always emits
//! `ocr_word`.

use crate::overlay::{PageGeometry, WordBox};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Opening tag of any element whose class list contains `ocr_word` or `ocrx_word`.
static WORD_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<(?P<tag>span|div)\b(?P<attrs>[^>]*\bclass\s*=\s*["'][^"']*\bocrx?_word\b[^"']*["'][^>]*)>"#)
        .expect("valid regex")
});

static TITLE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\btitle\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

static BBOX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bbbox\s+(-?\d+(?:\.\d+)?)\s+(-?\d+(?:\.\d+)?)\s+(-?\d+(?:\.\d+)?)\s+(-?\d+(?:\.\d+)?)")
        .expect("valid regex")
});

static INNER_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

/// Extract every word span with a readable bbox and non-empty text.
///
/// Spans with a missing or garbled `bbox`, or with no text, are skipped.
pub fn parse_words(hocr: &str) -> Vec<WordBox> {
    let mut words = Vec::new();
    let lower = hocr.to_ascii_lowercase();

    for caps in WORD_SPAN.captures_iter(hocr) {
        let (Some(whole), Some(tag), Some(attrs)) = (caps.get(0), caps.name("tag"), caps.name("attrs"))
        else {
            continue;
        };

        let Some(inner) = element_inner(hocr, &lower, whole.end(), tag.as_str()) else {
            debug!(offset = whole.start(), "skipping unterminated hOCR word");
            continue;
        };

        let text = decode_entities(&INNER_TAG.replace_all(inner, ""));
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        match parse_bbox(attrs.as_str()) {
            Some([x0, y0, x1, y1]) => words.push(WordBox::new(text, x0, y0, x1, y1)),
            None => debug!(word = text, "skipping hOCR word without a usable bbox"),
        }
    }

    words
}

/// Contents between `start` and the closing tag of the element, allowing
/// nested elements of the same name (`<span><span>…</span></span>`).
/// `lower` is `hocr` lowercased, so byte offsets line up.
fn element_inner<'a>(hocr: &'a str, lower: &str, start: usize, tag: &str) -> Option<&'a str> {
    let lower = &lower[start..];
    let open = format!("<{}", tag.to_ascii_lowercase());
    let close = format!("</{}", tag.to_ascii_lowercase());

    let mut depth = 1usize;
    let mut pos = 0usize;
    loop {
        let next_close = lower[pos..].find(&close)? + pos;
        match lower[pos..].find(&open).map(|i| i + pos) {
            Some(next_open) if next_open < next_close => {
                depth += 1;
                pos = next_open + open.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some(&hocr[start..start + next_close]);
                }
                pos = next_close + close.len();
            }
        }
    }
}

fn parse_bbox(attrs: &str) -> Option<[f32; 4]> {
    let title = TITLE_ATTR.captures(attrs)?;
    let title = title.get(1).or_else(|| title.get(2))?.as_str();
    let caps = BBOX.captures(title)?;
    let mut out = [0f32; 4];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = caps.get(i + 1)?.as_str().parse().ok()?;
    }
    Some(out)
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace('\u{00a0}', " ")
        .replace("&amp;", "&")
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Serialise word boxes as a single-page hOCR document.
pub fn write_page(page_num: usize, geometry: PageGeometry, words: &[WordBox]) -> String {
    let mut html = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\" \
         \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\">\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\n<head>\n\
         <meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\" />\n\
         <meta name=\"ocr-capabilities\" content=\"ocr_page ocr_word\" />\n\
         </head>\n<body>\n",
    );
    html.push_str(&format!(
        "<div class=\"ocr_page\" id=\"page_{page_num}\" title=\"bbox 0 0 {} {}; ppageno {}\">\n",
        geometry.width.round() as i64,
        geometry.height.round() as i64,
        page_num.saturating_sub(1)
    ));
    for (i, w) in words.iter().enumerate() {
        html.push_str(&format!(
            "<span class=\"ocr_word\" id=\"word_{page_num}_{}\" title=\"bbox {} {} {} {}\">{}</span>\n",
            i + 1,
            w.x0.round() as i64,
            w.y0.round() as i64,
            w.x1.round() as i64,
            w.y1.round() as i64,
            escape_html(w.text.trim()),
        ));
    }
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_ocrx_and_ocr_word_spans() {
        let hocr = r#"
<div class='ocr_page' title='bbox 0 0 600 800'>
 <span class='ocr_line' title="bbox 10 20 200 40">
  <span class='ocrx_word' id='w1' title='bbox 10 20 60 40; x_wconf 91'>Hello</span>
  <span class="ocr_word" title="bbox 70 20 200 40">w<em>orl</em>d</span>
 </span>
</div>"#;
        let words = parse_words(hocr);
        assert_eq!(
            words,
            vec![
                WordBox::new("Hello", 10.0, 20.0, 60.0, 40.0),
                WordBox::new("world", 70.0, 20.0, 200.0, 40.0),
            ]
        );
    }

    #[test]
    fn skips_words_without_bbox_or_text() {
        let hocr = r#"
<span class="ocr_word" title="x_wconf 50">nobox</span>
<span class="ocr_word" title="bbox 1 2 three 4">garbled</span>
<span class="ocr_word" title="bbox 1 2 3 4">   </span>
<span class="ocr_word" title="bbox 5 6 7 8">kept</span>"#;
        let words = parse_words(hocr);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "kept");
    }

    #[test]
    fn decodes_entities() {
        let hocr = r#"<span class="ocr_word" title="bbox 0 0 9 9">A&amp;B&lt;</span>"#;
        assert_eq!(parse_words(hocr)[0].text, "A&B<");
    }

    #[test]
    fn ignores_line_spans() {
        let hocr = r#"<span class="ocr_line" title="bbox 0 0 9 9">line</span>"#;
        assert!(parse_words(hocr).is_empty());
    }

    #[test]
    fn written_page_reads_back() {
        let words = vec![
            WordBox::new("Tom & Jerry", 1.0, 2.0, 30.0, 12.0),
            WordBox::new("<x>", 40.0, 2.0, 60.0, 12.0),
        ];
        let html = write_page(3, PageGeometry::new(100, 50), &words);
        assert!(html.contains("class=\"ocr_page\""));
        assert!(html.contains("ppageno 2"));
        assert_eq!(parse_words(&html), words);
    }
}
