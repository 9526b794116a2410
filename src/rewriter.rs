//! Content document rewriter
//!
//! Walks the body of one content document and replaces each text node with
//! its bionic markup. The walk pushes a copy of each node's children before
//! any of them is replaced, so splicing never disturbs the iteration.

use serde::Serialize;

use crate::bionic::Bionic;
use crate::dom::{Document, MarkupCodec, NodeId, NodeKind, XhtmlCodec};
use crate::error::DocumentError;

/// Elements whose content is never rewritten
const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "b", "strong"];

/// Counters for one rewritten document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteStats {
    /// Text nodes replaced by emphasis markup
    pub segments: usize,
    /// Words emphasized across those text nodes
    pub words: usize,
}

impl std::ops::AddAssign for RewriteStats {
    fn add_assign(&mut self, other: Self) {
        self.segments += other.segments;
        self.words += other.words;
    }
}

/// Rewritten document bytes and what changed
#[derive(Debug, Clone)]
pub struct Rewritten {
    pub markup: Vec<u8>,
    pub stats: RewriteStats,
}

/// Applies the bionic transform to content documents
#[derive(Debug, Clone, Default)]
pub struct DocumentRewriter<C = XhtmlCodec> {
    codec: C,
    bionic: Bionic,
}

impl DocumentRewriter<XhtmlCodec> {
    pub fn new(bionic: Bionic) -> Self {
        Self::with_codec(XhtmlCodec::new(), bionic)
    }
}

impl<C: MarkupCodec> DocumentRewriter<C> {
    pub fn with_codec(codec: C, bionic: Bionic) -> Self {
        Self { codec, bionic }
    }

    /// Rewrite one content document
    ///
    /// Any error means the document should be left as it was.
    pub fn rewrite(&self, markup: &[u8]) -> Result<Rewritten, DocumentError> {
        let mut doc = self.codec.parse(markup)?;
        let body = doc.find_element("body").ok_or(DocumentError::MissingBody)?;
        let stats = self.rewrite_subtree(&mut doc, body)?;
        let markup = self.codec.serialize(&doc)?;
        Ok(Rewritten { markup, stats })
    }

    /// Depth-first walk from `start`, replacing text nodes in place
    pub fn rewrite_subtree(
        &self,
        doc: &mut Document,
        start: NodeId,
    ) -> Result<RewriteStats, DocumentError> {
        let mut stats = RewriteStats::default();
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            match doc.kind(id) {
                NodeKind::Text(text) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    let (fragment, words) = self.bionic.transform_counted(text);
                    self.splice_fragment(doc, id, &fragment)?;
                    stats.segments += 1;
                    stats.words += words;
                }
                NodeKind::Element(el) => {
                    if self.is_skipped(el.local_name()) {
                        continue;
                    }
                    let snapshot = doc.children(id).to_vec();
                    stack.extend(snapshot.into_iter().rev());
                }
                _ => {}
            }
        }

        Ok(stats)
    }

    fn splice_fragment(
        &self,
        doc: &mut Document,
        target: NodeId,
        fragment: &str,
    ) -> Result<(), DocumentError> {
        let parsed = self.codec.parse_fragment(fragment)?;
        let nodes = doc.import_children(&parsed, parsed.root());
        doc.replace_with(target, &nodes);
        Ok(())
    }

    fn is_skipped(&self, local_name: &str) -> bool {
        SKIPPED_ELEMENTS
            .iter()
            .any(|name| name.eq_ignore_ascii_case(local_name))
            || self.bionic.tag().eq_ignore_ascii_case(local_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Element;

    fn em_rewriter() -> DocumentRewriter {
        DocumentRewriter::new(Bionic::new("em"))
    }

    fn rewrite_str(markup: &str) -> String {
        let out = em_rewriter().rewrite(markup.as_bytes()).unwrap();
        String::from_utf8(out.markup).unwrap()
    }

    #[test]
    fn test_rewrites_body_text() {
        let out = rewrite_str(
            r#"<html><head><title>Title</title></head><body><p>Hello world</p></body></html>"#,
        );
        assert_eq!(
            out,
            "<html><head><title>Title</title></head><body><p><em>Hel</em>lo <em>wor</em>ld</p></body></html>"
        );
    }

    #[test]
    fn test_nested_inline_markup() {
        let out = rewrite_str("<html><body><p>Go <i>fast</i> now</p></body></html>");
        assert_eq!(
            out,
            "<html><body><p><em>G</em>o <i><em>fa</em>st</i> <em>no</em>w</p></body></html>"
        );
    }

    #[test]
    fn test_skips_script_style_and_bold() {
        let markup = concat!(
            "<html><body>",
            "<script>var x = 1;</script>",
            "<style>p { color: red }</style>",
            "<b>bold</b><strong>strong</strong><STRONG>loud</STRONG>",
            "<em>already</em>",
            "</body></html>"
        );
        assert_eq!(rewrite_str(markup), markup);
    }

    #[test]
    fn test_whitespace_nodes_untouched() {
        let markup = "<html><body>\n  <p>a</p>\n</body></html>";
        let out = em_rewriter().rewrite(markup.as_bytes()).unwrap();
        assert_eq!(
            String::from_utf8(out.markup).unwrap(),
            "<html><body>\n  <p><em>a</em></p>\n</body></html>"
        );
        assert_eq!(out.stats, RewriteStats { segments: 1, words: 1 });
    }

    #[test]
    fn test_escaped_text_survives() {
        let out = rewrite_str("<html><body><p>Q&amp;A &lt;3</p></body></html>");
        assert_eq!(
            out,
            "<html><body><p><em>Q</em>&amp;<em>A</em> &lt;<em>3</em></p></body></html>"
        );
    }

    #[test]
    fn test_adjacent_text_nodes_all_visited() {
        // A comment splits the paragraph into two text nodes
        let out = rewrite_str("<html><body><p>one<!--x-->two</p></body></html>");
        assert_eq!(
            out,
            "<html><body><p><em>on</em>e<!--x--><em>tw</em>o</p></body></html>"
        );
    }

    #[test]
    fn test_head_is_not_rewritten() {
        let out = rewrite_str("<html><head><title>Keep</title></head><body/></html>");
        assert_eq!(out, "<html><head><title>Keep</title></head><body/></html>");
    }

    #[test]
    fn test_missing_body() {
        let result = em_rewriter().rewrite(b"<html><head/></html>");
        assert_eq!(result.unwrap_err(), DocumentError::MissingBody);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result = em_rewriter().rewrite(b"<html><body><p>oops</body></html>");
        assert!(matches!(result, Err(DocumentError::Parse(_))));
    }

    #[test]
    fn test_deeply_nested_document() {
        let depth = 10_000;
        let markup = format!(
            "<html><body>{}deep{}</body></html>",
            "<span>".repeat(depth),
            "</span>".repeat(depth)
        );
        let out = em_rewriter().rewrite(markup.as_bytes()).unwrap();
        let expected = format!(
            "<html><body>{}<em>de</em>ep{}</body></html>",
            "<span>".repeat(depth),
            "</span>".repeat(depth)
        );
        assert_eq!(String::from_utf8(out.markup).unwrap(), expected);
        assert_eq!(out.stats, RewriteStats { segments: 1, words: 1 });
    }

    #[test]
    fn test_unresolvable_entities_are_parse_errors() {
        let declared = concat!(
            r#"<!DOCTYPE html [<!ENTITY auth "Tolstoy">]>"#,
            "<html><body><p>By &auth;</p></body></html>"
        );
        for markup in [declared, "<html><body><p>a &foo; b &amp c</p></body></html>"] {
            let result = em_rewriter().rewrite(markup.as_bytes());
            assert!(matches!(result, Err(DocumentError::Parse(_))), "{}", markup);
        }
    }

    #[test]
    fn test_default_tag_rewrites_with_b() {
        let rewriter = DocumentRewriter::new(Bionic::default());
        let out = rewriter.rewrite(b"<html><body><p>Hi</p></body></html>").unwrap();
        assert_eq!(
            String::from_utf8(out.markup).unwrap(),
            "<html><body><p><b>H</b>i</p></body></html>"
        );
    }

    /// Codec that hands out a fixed tree and serializes a compact outline
    struct OutlineCodec;

    impl MarkupCodec for OutlineCodec {
        fn parse(&self, markup: &[u8]) -> Result<Document, DocumentError> {
            if markup.starts_with(b"<bionic-fragment>") {
                return XhtmlCodec::new().parse(markup);
            }
            if markup == b"broken" {
                return Err(DocumentError::Parse("broken".to_string()));
            }
            let mut doc = Document::new();
            let root = doc.root();
            let body = doc.create(NodeKind::Element(Element::new("body")));
            let text = doc.create(NodeKind::Text("ab cd".to_string()));
            doc.append(root, body);
            doc.append(body, text);
            Ok(doc)
        }

        fn serialize(&self, doc: &Document) -> Result<Vec<u8>, DocumentError> {
            let outline: Vec<String> = doc
                .descendants(doc.root())
                .into_iter()
                .filter_map(|id| match doc.kind(id) {
                    NodeKind::Element(el) => Some(format!("[{}]", el.name)),
                    NodeKind::Text(t) => Some(t.clone()),
                    _ => None,
                })
                .collect();
            Ok(outline.join("|").into_bytes())
        }
    }

    #[test]
    fn test_rewriter_with_fake_codec() {
        let rewriter = DocumentRewriter::with_codec(OutlineCodec, Bionic::new("em"));
        let out = rewriter.rewrite(b"anything").unwrap();
        assert_eq!(
            String::from_utf8(out.markup).unwrap(),
            "[body]|[em]|a|b |[em]|c|d"
        );
        assert_eq!(out.stats, RewriteStats { segments: 1, words: 2 });

        assert!(rewriter.rewrite(b"broken").is_err());
    }
}
