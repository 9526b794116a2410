//! Bionic EPUB
//!
//! Rewrites an EPUB so the leading half of every word in its content
//! documents is emphasized, then repackages it as a valid EPUB:
//! - `archive`: in-memory ZIP store with byte-exact pass-through
//! - `container`: `META-INF/container.xml` resolution
//! - `package`: package document manifest parsing
//! - `bionic`: the word-level text transform
//! - `dom`: arena markup tree and the XHTML codec
//! - `rewriter`: per-document tree walk
//! - `repackager` / `pipeline`: write-back and orchestration
//!
//! ```rust,ignore
//! let input = std::fs::read("book.epub")?;
//! let converted = bionic_epub::convert(input).await?;
//! std::fs::write("book-bionic.epub", converted.bytes)?;
//! ```

pub mod archive;
pub mod bionic;
pub mod config;
pub mod container;
pub mod dom;
pub mod error;
pub mod package;
pub mod pipeline;
pub mod repackager;
pub mod rewriter;

pub use archive::{Archive, EPUB_MEDIA_TYPE};
pub use bionic::{transform, Bionic};
pub use config::Config;
pub use dom::{Document, MarkupCodec, NodeId, XhtmlCodec};
pub use error::{DocumentError, EpubError, Result};
pub use package::ManifestItem;
pub use pipeline::{convert, CancelSignal, ConversionReport, ConvertedEpub, Converter};
pub use rewriter::{DocumentRewriter, RewriteStats};
