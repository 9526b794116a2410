//! Container resolution
//!
//! Every EPUB carries `META-INF/container.xml`, whose first `rootfile`
//! element names the package document.

use crate::archive::Archive;
use crate::error::{EpubError, Result};

/// Fixed location of the container document
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Find the path of the package (OPF) document
pub fn resolve(archive: &Archive) -> Result<String> {
    let content = archive
        .read_to_string(CONTAINER_PATH)?
        .ok_or_else(|| EpubError::InvalidArchive(format!("{} not found", CONTAINER_PATH)))?;

    find_rootfile_path(&content)
}

/// Extract `full-path` from the first `rootfile` element of a container document
pub fn find_rootfile_path(content: &str) -> Result<String> {
    let doc = roxmltree::Document::parse(content).map_err(|e| {
        EpubError::InvalidArchive(format!("{} is not well-formed: {}", CONTAINER_PATH, e))
    })?;

    let rootfile = doc
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "rootfile")
        .ok_or_else(|| {
            EpubError::InvalidArchive(format!("no rootfile element in {}", CONTAINER_PATH))
        })?;

    match rootfile.attribute("full-path").map(str::trim) {
        Some(path) if !path.is_empty() => Ok(path.to_string()),
        _ => Err(EpubError::InvalidArchive(
            "Could not find OPF path in container.xml".to_string(),
        )),
    }
}
