//! In-memory EPUB archive store
//!
//! Entries are kept in their original order. Entries that are never written
//! stay as references into the source ZIP and are raw-copied on
//! serialization, so their compressed bytes, compression method and headers
//! come out exactly as they went in.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{EpubError, Result};

/// Content type of an EPUB container
pub const EPUB_MEDIA_TYPE: &str = "application/epub+zip";

/// Name of the entry that must come first, stored, in an EPUB container
pub const MIMETYPE_PATH: &str = "mimetype";

type SourceArchive = ZipArchive<Cursor<Arc<[u8]>>>;

#[derive(Debug, Clone)]
enum Content {
    /// Untouched entry at this index of the source archive
    Original { index: usize },
    /// Entry replaced or inserted since loading
    Written(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Entry {
    path: String,
    compression: CompressionMethod,
    is_dir: bool,
    content: Content,
}

/// Typed `path -> bytes` view over an EPUB container
#[derive(Debug, Clone)]
pub struct Archive {
    source: SourceArchive,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Archive {
    /// Load an archive from the raw container bytes
    pub fn load(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let cursor = Cursor::new(data.into());
        let mut source = ZipArchive::new(cursor)
            .map_err(|e| EpubError::InvalidArchive(format!("not a ZIP container: {}", e)))?;

        let mut entries = Vec::with_capacity(source.len());
        let mut index = HashMap::with_capacity(source.len());

        for i in 0..source.len() {
            let file = source
                .by_index_raw(i)
                .map_err(|e| EpubError::InvalidArchive(format!("unreadable entry #{}: {}", i, e)))?;
            let path = file.name().to_string();

            if index.contains_key(&path) {
                return Err(EpubError::InvalidArchive(format!(
                    "duplicate entry: {}",
                    path
                )));
            }

            index.insert(path.clone(), entries.len());
            entries.push(Entry {
                path,
                compression: file.compression(),
                is_dir: file.is_dir(),
                content: Content::Original { index: i },
            });
        }

        let archive = Self {
            source,
            entries,
            index,
        };

        if let Some(problem) = archive.layout_problem() {
            tracing::warn!("EPUB layout violation in input, passed through as-is: {}", problem);
        }

        Ok(archive)
    }

    /// Number of entries, directories included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry paths in archive order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// Whether a file entry exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.index
            .get(path)
            .map(|&i| !self.entries[i].is_dir)
            .unwrap_or(false)
    }

    /// Whether the entry at `path` has been written since loading
    pub fn is_modified(&self, path: &str) -> bool {
        self.index
            .get(path)
            .map(|&i| matches!(self.entries[i].content, Content::Written(_)))
            .unwrap_or(false)
    }

    /// Read the uncompressed content of a file entry
    ///
    /// Returns `Ok(None)` when no file entry exists at `path`.
    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(&i) = self.index.get(path) else {
            return Ok(None);
        };
        let entry = &self.entries[i];
        if entry.is_dir {
            return Ok(None);
        }

        match &entry.content {
            Content::Written(data) => Ok(Some(data.clone())),
            Content::Original { index } => {
                // Clones share the central directory and the source buffer
                let mut source = self.source.clone();
                let mut file = source.by_index(*index)?;
                let mut data = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut data)?;
                Ok(Some(data))
            }
        }
    }

    /// Read a file entry as UTF-8 text
    pub fn read_to_string(&self, path: &str) -> Result<Option<String>> {
        match self.read(path)? {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
                EpubError::InvalidArchive(format!("{} is not valid UTF-8: {}", path, e))
            }),
            None => Ok(None),
        }
    }

    /// Overwrite an entry, or append a new one
    ///
    /// A replaced entry keeps its position and compression method.
    pub fn write(&mut self, path: &str, data: Vec<u8>) {
        match self.index.get(path) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.is_dir = false;
                entry.content = Content::Written(data);
            }
            None => {
                self.index.insert(path.to_string(), self.entries.len());
                self.entries.push(Entry {
                    path: path.to_string(),
                    compression: CompressionMethod::Deflated,
                    is_dir: false,
                    content: Content::Written(data),
                });
            }
        }
    }

    /// Describe how the archive breaks the EPUB container layout, if it does
    ///
    /// EPUB readers identify the format from a first entry named `mimetype`,
    /// stored uncompressed, containing `application/epub+zip`.
    pub fn layout_problem(&self) -> Option<String> {
        let Some(first) = self.entries.first() else {
            return Some("archive is empty".to_string());
        };
        if first.path != MIMETYPE_PATH {
            return Some(format!("first entry is '{}', expected '{}'", first.path, MIMETYPE_PATH));
        }
        if first.compression != CompressionMethod::Stored {
            return Some(format!("'{}' entry is compressed", MIMETYPE_PATH));
        }
        match self.read(MIMETYPE_PATH) {
            Ok(Some(bytes))
                if std::str::from_utf8(&bytes).map(str::trim) == Ok(EPUB_MEDIA_TYPE) =>
            {
                None
            }
            Ok(_) => Some(format!("'{}' entry does not contain {}", MIMETYPE_PATH, EPUB_MEDIA_TYPE)),
            Err(e) => Some(format!("'{}' entry is unreadable: {}", MIMETYPE_PATH, e)),
        }
    }

    /// Write the archive back out as ZIP bytes
    pub fn serialize(mut self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            match &entry.content {
                Content::Original { index } => {
                    let file = self.source.by_index_raw(*index)?;
                    writer.raw_copy_file(file)?;
                }
                Content::Written(data) => {
                    let compression = match entry.compression {
                        CompressionMethod::Stored => CompressionMethod::Stored,
                        _ => CompressionMethod::Deflated,
                    };
                    let options = SimpleFileOptions::default().compression_method(compression);
                    writer.start_file(entry.path.as_str(), options)?;
                    writer.write_all(data)?;
                }
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}
