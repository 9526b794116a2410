//! Markup parser/serializer seam

use super::Document;
use crate::error::DocumentError;

/// Element wrapped around fragments so they parse as a single document
const FRAGMENT_WRAPPER: &str = "bionic-fragment";

/// Parses markup into a [`Document`] and writes it back out
pub trait MarkupCodec: Send + Sync {
    /// Parse a complete document
    fn parse(&self, markup: &[u8]) -> Result<Document, DocumentError>;

    /// Serialize a document back to markup bytes
    fn serialize(&self, doc: &Document) -> Result<Vec<u8>, DocumentError>;

    /// Parse an inline fragment; its top-level nodes become children of the
    /// returned document's root
    fn parse_fragment(&self, fragment: &str) -> Result<Document, DocumentError> {
        let wrapped = format!("<{0}>{1}</{0}>", FRAGMENT_WRAPPER, fragment);
        let parsed = self.parse(wrapped.as_bytes())?;
        let wrapper = parsed
            .document_element()
            .ok_or_else(|| DocumentError::Parse("empty fragment".to_string()))?;

        let mut doc = Document::new();
        let root = doc.root();
        for node in doc.import_children(&parsed, wrapper) {
            doc.append(root, node);
        }
        Ok(doc)
    }
}
