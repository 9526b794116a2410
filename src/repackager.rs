//! Archive repackaging
//!
//! Rewritten documents go back to the path they were read from; everything
//! else is serialized exactly as it was loaded.

use crate::archive::{Archive, EPUB_MEDIA_TYPE};
use crate::error::Result;

/// A rewritten content document ready to be written back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenEntry {
    pub path: String,
    pub markup: Vec<u8>,
}

/// Final container blob
#[derive(Debug, Clone)]
pub struct PackagedEpub {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Write every rewritten entry into the archive and serialize it
pub fn apply(mut archive: Archive, rewrites: Vec<RewrittenEntry>) -> Result<PackagedEpub> {
    let count = rewrites.len();
    for entry in rewrites {
        archive.write(&entry.path, entry.markup);
    }

    let bytes = archive.serialize()?;
    tracing::debug!("Repackaged EPUB with {} rewritten entries ({} bytes)", count, bytes.len());

    Ok(PackagedEpub {
        bytes,
        content_type: EPUB_MEDIA_TYPE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;

    #[test]
    fn test_apply_replaces_only_rewritten_paths() {
        let input = build_zip(&[
            ("mimetype", b"application/epub+zip", true),
            ("OEBPS/ch1.xhtml", b"<p>old</p>", false),
            ("OEBPS/image.png", &[1, 2, 3, 4], false),
        ]);
        let archive = Archive::load(input).unwrap();

        let packaged = apply(
            archive,
            vec![RewrittenEntry {
                path: "OEBPS/ch1.xhtml".to_string(),
                markup: b"<p>new</p>".to_vec(),
            }],
        )
        .unwrap();
        assert_eq!(packaged.content_type, "application/epub+zip");

        let output = Archive::load(packaged.bytes).unwrap();
        assert_eq!(output.len(), 3);
        assert_eq!(output.read("OEBPS/ch1.xhtml").unwrap().unwrap(), b"<p>new</p>");
        assert_eq!(output.read("OEBPS/image.png").unwrap().unwrap(), vec![1, 2, 3, 4]);
        assert!(output.layout_problem().is_none());
    }

    #[test]
    fn test_apply_without_rewrites_keeps_content() {
        let input = build_zip(&[
            ("mimetype", b"application/epub+zip", true),
            ("OEBPS/ch1.xhtml", b"<p>same</p>", false),
        ]);
        let packaged = apply(Archive::load(input).unwrap(), Vec::new()).unwrap();
        let output = Archive::load(packaged.bytes).unwrap();
        assert_eq!(output.read("OEBPS/ch1.xhtml").unwrap().unwrap(), b"<p>same</p>");
    }
}
