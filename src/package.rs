//! Package (OPF) document parser
//!
//! Lists the manifest items that hold readable markup. Everything else in the
//! manifest (images, stylesheets, fonts, NCX) is left out of the working set.

use serde::Serialize;

use crate::archive::Archive;
use crate::error::{EpubError, Result};

/// Media types of content documents the rewriter works on
pub const CONTENT_MEDIA_TYPES: [&str; 2] = ["application/xhtml+xml", "text/html"];

/// Manifest item that holds a content document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub id: Option<String>,
    /// Reference exactly as written in the manifest
    pub href: String,
    /// Archive path, resolved against the package document's directory
    pub path: String,
    pub media_type: String,
}

impl ManifestItem {
    /// Archive paths to try for this item, most literal first
    ///
    /// Manifest hrefs are URLs, so `chapter%201.xhtml` may name the entry
    /// `chapter 1.xhtml`.
    pub fn candidate_paths(&self) -> Vec<String> {
        let mut paths = vec![self.path.clone()];
        if let Ok(decoded) = urlencoding::decode(&self.path) {
            if decoded != self.path {
                paths.push(decoded.into_owned());
            }
        }
        paths
    }
}

/// Whether a manifest media type denotes a content document
pub fn is_content_media_type(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    CONTENT_MEDIA_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(essence))
}

/// Directory part of the package document path (empty at archive root)
pub fn package_dir(package_path: &str) -> &str {
    package_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or_default()
}

/// Resolve a manifest reference against the package directory
pub fn resolve_href(opf_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    if opf_dir.is_empty() {
        href.to_string()
    } else {
        format!("{}/{}", opf_dir, href)
    }
}

/// Read the package document and list its content documents in manifest order
pub fn parse_manifest(archive: &Archive, package_path: &str) -> Result<Vec<ManifestItem>> {
    let content = archive
        .read_to_string(package_path)?
        .ok_or_else(|| EpubError::MissingPackageDocument(package_path.to_string()))?;

    parse_content_items(&content, package_dir(package_path))
}

/// Extract qualifying manifest items from package document markup
pub fn parse_content_items(content: &str, opf_dir: &str) -> Result<Vec<ManifestItem>> {
    let doc = roxmltree::Document::parse(content)
        .map_err(|e| EpubError::InvalidArchive(format!("package document: {}", e)))?;

    let items = doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "manifest")
        .flat_map(|manifest| manifest.children())
        .filter(|node| node.is_element() && node.tag_name().name() == "item")
        .filter_map(|node| {
            let href = node.attribute("href")?;
            let media_type = node.attribute("media-type")?;
            if href.is_empty() || !is_content_media_type(media_type) {
                return None;
            }
            Some(ManifestItem {
                id: node.attribute("id").map(str::to_string),
                href: href.to_string(),
                path: resolve_href(opf_dir, href),
                media_type: media_type.to_string(),
            })
        })
        .collect();

    Ok(items)
}
