//! Outline parsing through the public API.

use djvu2pdf::toc::{self, OUTLINE_PREFIX};
use djvu2pdf::{format_toc, Bookmark, TocParseError};

/// Outline tree used to build inputs and expected output side by side.
struct Node {
    title: String,
    page: usize,
    children: Vec<Node>,
}

impl Node {
    fn leaf(title: &str, page: usize) -> Self {
        Node {
            title: title.to_string(),
            page,
            children: Vec::new(),
        }
    }

    fn with(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    fn render(&self, out: &mut String) {
        out.push_str(&format!("(\"{}\" \"#{}\"", self.title, self.page));
        for c in &self.children {
            out.push_str("\n ");
            c.render(out);
        }
        out.push_str(" )");
    }

    /// Pre-order (title, depth, subtree size) triples.
    fn flatten(&self, depth: usize, out: &mut Vec<(String, usize, usize)>) {
        let at = out.len();
        out.push((self.title.clone(), depth, 0));
        for c in &self.children {
            c.flatten(depth + 1, out);
        }
        out[at].2 = out.len() - at;
    }
}

fn sample_forest() -> Vec<Node> {
    vec![
        Node::leaf("Preface", 1),
        Node::leaf("Part I", 3)
            .with(Node::leaf("Chapter 1", 4).with(Node::leaf("1.1", 5)).with(Node::leaf("1.2", 9)))
            .with(Node::leaf("Chapter 2", 12).with(Node::leaf("2.1", 13).with(Node::leaf("2.1.1", 14)))),
        Node::leaf("Part II", 20).with(Node::leaf("Chapter 3", 21)),
        Node::leaf("Index", 40),
    ]
}

fn render_body(forest: &[Node]) -> String {
    let mut body = String::new();
    for n in forest {
        body.push_str("\n ");
        n.render(&mut body);
    }
    body.push_str(" )");
    body
}

#[test]
fn depth_matches_nesting_and_order_is_preorder() {
    let forest = sample_forest();
    let mut expected = Vec::new();
    for n in &forest {
        n.flatten(0, &mut expected);
    }

    let parsed = toc::parse(&render_body(&forest)).unwrap();
    assert_eq!(parsed.len(), expected.len());

    for (i, (b, (title, depth, size))) in parsed.iter().zip(&expected).enumerate() {
        assert_eq!(&b.title, title);
        assert_eq!(b.depth, *depth);
        // Descendants occupy the lines directly after their ancestor; every
        // one of them is strictly deeper.
        for d in &parsed[i + 1..i + size] {
            assert!(d.depth > b.depth, "{} should nest under {}", d.title, b.title);
        }
        // The next line after the subtree is a sibling or a shallower node.
        if let Some(next) = parsed.get(i + size) {
            assert!(next.depth <= b.depth);
        }
    }
}

#[test]
fn worked_example_yields_three_lines() {
    let body = r##"("Intro" "#1") ("Chapter 1" "#5" ("Section" "#7")))"##;
    let lines: Vec<String> = toc::parse(body).unwrap().iter().map(Bookmark::to_line).collect();
    assert_eq!(
        lines,
        vec![
            "\"Intro\" \"1\"".to_string(),
            "\"Chapter 1\" \"5\"".to_string(),
            "\t\"Section\" \"7\"".to_string(),
        ]
    );
}

#[test]
fn escaped_quotes_render_as_single_quotes() {
    let body = r##"("He said \"Hi\"" "#2")"##;
    let parsed = toc::parse(body).unwrap();
    assert_eq!(parsed[0].title, "He said 'Hi'");
    assert_eq!(parsed[0].to_line(), "\"He said 'Hi'\" \"2\"");
}

#[test]
fn reference_hash_is_stripped_only_when_present() {
    let parsed = toc::parse(r##"("A" "#42") ("B" "appendix.djvu")"##).unwrap();
    assert_eq!(parsed[0].target(), "42");
    assert_eq!(parsed[0].page_number(), Some(42));
    assert_eq!(parsed[1].target(), "appendix.djvu");
    assert_eq!(parsed[1].page_number(), None);
    assert_eq!(format_toc(&parsed), "\"A\" \"42\"\n\"B\" \"appendix.djvu\"");
}

#[test]
fn empty_and_prefix_only_inputs_are_empty() {
    assert!(toc::parse("").unwrap().is_empty());
    assert!(toc::parse(" \n\t ").unwrap().is_empty());
    assert!(toc::parse_outline("").unwrap().is_empty());
    assert!(toc::parse_outline(OUTLINE_PREFIX).unwrap().is_empty());
    assert!(toc::parse_outline("(bookm").unwrap().is_empty());
    assert_eq!(format_toc(&[]), "");
}

#[test]
fn full_djvused_output_parses() {
    let raw = "(bookmarks\n (\"Contents\" \"#3\")\n (\"Body\" \"#7\"\n  (\"Detail\" \"#8\") ) )\n";
    let parsed = toc::parse_outline(raw).unwrap();
    assert_eq!(
        format_toc(&parsed),
        "\"Contents\" \"3\"\n\"Body\" \"7\"\n\t\"Detail\" \"8\""
    );
}

#[test]
fn stray_trailing_parens_are_tolerated() {
    let parsed = toc::parse(r##"("A" "#1") ) ) ) ("B" "#2") )))"##).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[1].depth, 0);
}

#[test]
fn malformed_outlines_fail_with_location() {
    let unterminated = r##"("Intro" "#1") ("Broken" "#2)"##;
    let err = toc::parse(unterminated).unwrap_err();
    assert!(matches!(err, TocParseError::UnterminatedString { offset: 25, .. }));

    let unclosed = r##"("Intro" "#1" ("Child" "#2")"##;
    let err = toc::parse(unclosed).unwrap_err();
    assert!(matches!(err, TocParseError::UnclosedNode { offset: 0, .. }));
    assert!(err.to_string().contains("offset 0"));
}

#[test]
fn large_flat_outline_parses() {
    let mut body = String::new();
    for i in 1..=5_000 {
        body.push_str(&format!("(\"Entry {i}\" \"#{i}\") "));
    }
    let parsed = toc::parse(&body).unwrap();
    assert_eq!(parsed.len(), 5_000);
    assert_eq!(parsed[4_999].page_number(), Some(5_000));
}
