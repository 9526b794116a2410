//! XHTML codec built on quick-xml
//!
//! Content documents are parsed as XML, the way EPUB reading systems treat
//! them. Names, prefixes, attribute order, comments, doctypes and whitespace
//! are kept so an untouched tree serializes back to equivalent markup.
//! HTML named entities (`&nbsp;`, `&mdash;`) are accepted in text and
//! attribute values and written back as characters.

use std::borrow::Cow;
use std::io::Cursor;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::codec::MarkupCodec;
use super::{Document, Element, NodeId, NodeKind, XmlDecl};
use crate::error::DocumentError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// quick-xml backed [`MarkupCodec`] for XHTML content documents
#[derive(Debug, Clone, Copy, Default)]
pub struct XhtmlCodec;

impl XhtmlCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MarkupCodec for XhtmlCodec {
    fn parse(&self, markup: &[u8]) -> Result<Document, DocumentError> {
        let markup = markup.strip_prefix(UTF8_BOM).unwrap_or(markup);
        let text = std::str::from_utf8(markup)?;

        let mut reader = Reader::from_str(text);
        reader
            .trim_text(false)
            .expand_empty_elements(false)
            .check_end_names(true);

        let mut doc = Document::new();
        let mut open = vec![doc.root()];

        loop {
            let event = reader.read_event().map_err(|e| {
                DocumentError::Parse(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;
            let parent = *open.last().unwrap_or(&doc.root());

            match event {
                Event::Start(e) => {
                    let id = doc.create(NodeKind::Element(read_element(&e, false)?));
                    doc.append(parent, id);
                    open.push(id);
                }
                Event::Empty(e) => {
                    let id = doc.create(NodeKind::Element(read_element(&e, true)?));
                    doc.append(parent, id);
                }
                Event::End(e) => {
                    if open.len() <= 1 {
                        return Err(DocumentError::Parse(format!(
                            "unexpected closing tag </{}>",
                            String::from_utf8_lossy(e.name().as_ref())
                        )));
                    }
                    open.pop();
                }
                Event::Text(e) => {
                    let raw = std::str::from_utf8(&e)?;
                    let id = doc.create(NodeKind::Text(decode_entities(raw)?.into_owned()));
                    doc.append(parent, id);
                }
                Event::CData(e) => {
                    let content = std::str::from_utf8(&e)?.to_string();
                    let id = doc.create(NodeKind::CData(content));
                    doc.append(parent, id);
                }
                Event::Comment(e) => {
                    let id = doc.create(NodeKind::Comment(std::str::from_utf8(&e)?.to_string()));
                    doc.append(parent, id);
                }
                Event::PI(e) => {
                    let id = doc.create(NodeKind::ProcessingInstruction(
                        std::str::from_utf8(&e)?.to_string(),
                    ));
                    doc.append(parent, id);
                }
                Event::DocType(e) => {
                    let raw = std::str::from_utf8(&e)?;
                    // Entities declared here would be lost on write-back
                    if raw.contains('[') {
                        return Err(DocumentError::Parse(
                            "doctype with an internal subset".to_string(),
                        ));
                    }
                    let id = doc.create(NodeKind::DocType(raw.to_string()));
                    doc.append(parent, id);
                }
                Event::Decl(e) => {
                    let decl = read_decl(&e)?;
                    if let Some(encoding) = &decl.encoding {
                        if !is_utf8_label(encoding) {
                            return Err(DocumentError::Parse(format!(
                                "unsupported encoding {}",
                                encoding
                            )));
                        }
                    }
                    let id = doc.create(NodeKind::Declaration(decl));
                    doc.append(parent, id);
                }
                Event::Eof => break,
            }
        }

        if open.len() > 1 {
            let unclosed = open
                .last()
                .and_then(|&id| doc.element(id))
                .map(|el| el.name.clone())
                .unwrap_or_default();
            return Err(DocumentError::Parse(format!("unclosed element <{}>", unclosed)));
        }
        if doc.document_element().is_none() {
            return Err(DocumentError::Parse("no root element".to_string()));
        }

        Ok(doc)
    }

    fn serialize(&self, doc: &Document) -> Result<Vec<u8>, DocumentError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write_tree(&mut writer, doc).map_err(|e| DocumentError::Serialize(e.to_string()))?;
        Ok(writer.into_inner().into_inner())
    }
}

fn read_element(start: &BytesStart, self_closing: bool) -> Result<Element, DocumentError> {
    let name = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocumentError::Parse(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let raw = std::str::from_utf8(&attr.value)?;
        attributes.push((key, decode_entities(raw)?.into_owned()));
    }

    Ok(Element {
        name,
        attributes,
        self_closing,
    })
}

fn read_decl(decl: &BytesDecl) -> Result<XmlDecl, DocumentError> {
    let version = std::str::from_utf8(&decl.version()?)?.to_string();
    let encoding = match decl.encoding() {
        Some(value) => Some(std::str::from_utf8(&value?)?.to_string()),
        None => None,
    };
    let standalone = match decl.standalone() {
        Some(value) => Some(std::str::from_utf8(&value?)?.to_string()),
        None => None,
    };
    Ok(XmlDecl {
        version,
        encoding,
        standalone,
    })
}

/// Resolve character and entity references
///
/// Only the XML predefined entities, numeric references and HTML named
/// entities are known. Anything else, including a bare `&`, is malformed.
fn decode_entities(raw: &str) -> Result<Cow<'_, str>, DocumentError> {
    if !raw.contains('&') {
        return Ok(Cow::Borrowed(raw));
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let name = after
            .find(';')
            .map(|end| &after[..end])
            .filter(|name| is_reference_name(name))
            .ok_or_else(|| DocumentError::Parse("unescaped '&' in character data".to_string()))?;

        let reference = &rest[amp..amp + name.len() + 2];
        let decoded = html_escape::decode_html_entities(reference);
        if decoded == reference {
            return Err(DocumentError::Parse(format!("unresolvable reference {}", reference)));
        }
        out.push_str(&decoded);
        rest = &after[name.len() + 1..];
    }
    out.push_str(rest);

    Ok(Cow::Owned(out))
}

/// `name` in `&name;`: `#123`, `#x1F` or an ASCII alphanumeric name
fn is_reference_name(name: &str) -> bool {
    if let Some(number) = name.strip_prefix('#') {
        return match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
            Some(hex) => !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()),
            None => !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()),
        };
    }
    let mut bytes = name.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric())
}

fn is_utf8_label(label: &str) -> bool {
    label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8")
}

/// Write every node below the document root in document order
///
/// Frames are `(node, entered)`: an entered element has had its start tag
/// written and gets its end tag when popped again.
fn write_tree<W: std::io::Write>(
    writer: &mut Writer<W>,
    doc: &Document,
) -> quick_xml::Result<()> {
    let mut stack: Vec<(NodeId, bool)> = doc
        .children(doc.root())
        .iter()
        .rev()
        .map(|&id| (id, false))
        .collect();

    while let Some((id, entered)) = stack.pop() {
        if entered {
            if let Some(el) = doc.element(id) {
                writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
            }
            continue;
        }

        match doc.kind(id) {
            NodeKind::Document => {
                stack.extend(doc.children(id).iter().rev().map(|&child| (child, false)));
            }
            NodeKind::Element(el) => {
                let mut start = BytesStart::new(el.name.as_str());
                for (key, value) in &el.attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }

                let children = doc.children(id);
                if children.is_empty() && el.self_closing {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    stack.push((id, true));
                    stack.extend(children.iter().rev().map(|&child| (child, false)));
                }
            }
            NodeKind::Text(text) => {
                // Quotes stay literal in text content
                writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
            }
            NodeKind::CData(content) => {
                writer.write_event(Event::CData(BytesCData::new(content.as_str())))?;
            }
            NodeKind::Comment(raw) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(raw.as_str())))?;
            }
            NodeKind::ProcessingInstruction(raw) => {
                writer.write_event(Event::PI(BytesText::from_escaped(raw.as_str())))?;
            }
            NodeKind::DocType(raw) => {
                writer.write_event(Event::DocType(BytesText::from_escaped(raw.as_str())))?;
            }
            NodeKind::Declaration(decl) => {
                writer.write_event(Event::Decl(BytesDecl::new(
                    &decl.version,
                    decl.encoding.as_deref(),
                    decl.standalone.as_deref(),
                )))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>One</title><link rel="stylesheet" href="style.css"/></head>
<body>
  <!-- chapter start -->
  <p class="first">Fish &amp; chips</p>
  <br/>
  <div></div>
</body>
</html>"#;

    fn roundtrip(markup: &str) -> String {
        let codec = XhtmlCodec::new();
        let doc = codec.parse(markup.as_bytes()).unwrap();
        String::from_utf8(codec.serialize(&doc).unwrap()).unwrap()
    }

    #[test]
    fn test_untouched_tree_serializes_back() {
        assert_eq!(roundtrip(CHAPTER), CHAPTER);
    }

    #[test]
    fn test_text_is_unescaped_in_tree() {
        let doc = XhtmlCodec::new().parse(CHAPTER.as_bytes()).unwrap();
        let p = doc.find_element("p").unwrap();
        assert_eq!(doc.text_content(p), "Fish & chips");
        assert_eq!(doc.element(p).unwrap().attribute("class"), Some("first"));
    }

    #[test]
    fn test_html_entities_become_characters() {
        let out = roundtrip("<p title=\"a&nbsp;b\">x&nbsp;&mdash;y</p>");
        assert_eq!(out, "<p title=\"a\u{a0}b\">x\u{a0}\u{2014}y</p>");
    }

    #[test]
    fn test_quotes_in_text_stay_literal() {
        let markup = r#"<p class="q">It's "quoted" &amp; &lt;tagged&gt;</p>"#;
        assert_eq!(roundtrip(markup), markup);
    }

    #[test]
    fn test_bom_is_accepted() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"<p>hi</p>");
        assert!(XhtmlCodec::new().parse(&bytes).is_ok());
    }

    #[test]
    fn test_malformed_markup_fails() {
        let codec = XhtmlCodec::new();
        assert!(codec.parse(b"<html><body><p>open</body></html>").is_err());
        assert!(codec.parse(b"<html><body>").is_err());
        assert!(codec.parse(b"</p>").is_err());
        assert!(codec.parse(b"just text").is_err());
        assert!(codec.parse(&[0x3c, 0x70, 0x3e, 0xff, 0xfe, 0x3c, 0x2f, 0x70, 0x3e]).is_err());
    }

    #[test]
    fn test_non_utf8_declaration_rejected() {
        let markup = br#"<?xml version="1.0" encoding="ISO-8859-1"?><p>x</p>"#;
        assert!(matches!(
            XhtmlCodec::new().parse(markup),
            Err(DocumentError::Parse(msg)) if msg.contains("ISO-8859-1")
        ));
    }

    #[test]
    fn test_unknown_entities_fail() {
        let codec = XhtmlCodec::new();
        assert!(matches!(
            codec.parse(b"<p>a &foo; b</p>"),
            Err(DocumentError::Parse(msg)) if msg.contains("&foo;")
        ));
        assert!(codec.parse(b"<p>a &amp c</p>").is_err());
        assert!(codec.parse(b"<p>fish & chips</p>").is_err());
        assert!(codec.parse(b"<p title=\"&bogus;\">x</p>").is_err());
        assert!(codec.parse(b"<p>&#0;</p>").is_err());
    }

    #[test]
    fn test_numeric_references_decode() {
        assert_eq!(roundtrip("<p>&#65;&#x42;&#X43;</p>"), "<p>ABC</p>");
    }

    #[test]
    fn test_internal_subset_fails() {
        let markup = br#"<!DOCTYPE html [<!ENTITY auth "Tolstoy">]><html><body><p>By &auth;</p></body></html>"#;
        assert!(matches!(
            XhtmlCodec::new().parse(markup),
            Err(DocumentError::Parse(msg)) if msg.contains("internal subset")
        ));
    }

    #[test]
    fn test_deep_nesting_serializes() {
        let depth = 10_000;
        let markup = format!("{}deep{}", "<span>".repeat(depth), "</span>".repeat(depth));
        assert_eq!(roundtrip(&markup), markup);
    }

    #[test]
    fn test_parse_fragment() {
        let codec = XhtmlCodec::new();
        let fragment = codec.parse_fragment("<b>Hel</b>lo &amp; <b>wor</b>ld").unwrap();
        let top = fragment.children(fragment.root());
        assert_eq!(top.len(), 4);
        assert_eq!(fragment.element(top[0]).unwrap().name, "b");
        assert_eq!(fragment.text(top[1]), Some("lo & "));
        assert_eq!(fragment.text_content(fragment.root()), "Hello & world");
    }
}
