//! Conversion pipeline
//!
//! Load → resolve container → parse manifest → rewrite every content
//! document on its own task → repackage.
//!
//! Content documents are independent, so each one gets a task on a
//! [`JoinSet`], throttled by a [`Semaphore`]. Tasks only read the shared
//! archive; the rewritten bytes are written back by the repackager once every
//! task has been joined. A failing document is recorded and left untouched.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::archive::Archive;
use crate::bionic::Bionic;
use crate::config::Config;
use crate::container;
use crate::dom::{MarkupCodec, XhtmlCodec};
use crate::error::{DocumentError, EpubError, Result};
use crate::package::{self, ManifestItem};
use crate::repackager::{self, RewrittenEntry};
use crate::rewriter::{DocumentRewriter, RewriteStats};

/// Receiving side of a cancellation flag; `true` means stop starting documents
pub type CancelSignal = watch::Receiver<bool>;

/// A content document that was left unmodified
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedDocument {
    pub path: String,
    pub reason: String,
}

/// Summary of one conversion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReport {
    /// Archive path of the package document
    pub package_path: String,
    /// Content documents listed in the manifest
    pub documents: usize,
    /// Paths rewritten, in manifest order
    pub rewritten: Vec<String>,
    /// Documents that failed and were passed through
    pub skipped: Vec<SkippedDocument>,
    /// Manifest paths with no archive entry
    pub missing: Vec<String>,
    pub stats: RewriteStats,
    /// Stopped early; documents not yet started were passed through
    pub cancelled: bool,
}

/// Converted container and its report
#[derive(Debug, Clone)]
pub struct ConvertedEpub {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub report: ConversionReport,
}

#[derive(Debug)]
enum Outcome {
    Rewritten {
        path: String,
        markup: Vec<u8>,
        stats: RewriteStats,
    },
    Skipped {
        path: String,
        error: DocumentError,
    },
    Missing {
        path: String,
    },
}

/// EPUB to bionic EPUB converter
#[derive(Debug, Clone)]
pub struct Converter<C = XhtmlCodec> {
    rewriter: Arc<DocumentRewriter<C>>,
    max_concurrency: usize,
}

impl Default for Converter<XhtmlCodec> {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Converter<XhtmlCodec> {
    pub fn new(config: &Config) -> Self {
        let rewriter = DocumentRewriter::new(Bionic::new(config.emphasis_tag.clone()));
        Self::with_rewriter(rewriter, config.max_concurrency)
    }
}

impl<C: MarkupCodec + 'static> Converter<C> {
    pub fn with_rewriter(rewriter: DocumentRewriter<C>, max_concurrency: usize) -> Self {
        Self {
            rewriter: Arc::new(rewriter),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Convert an EPUB, running to completion
    pub async fn convert(&self, input: Vec<u8>) -> Result<ConvertedEpub> {
        self.run(input, None).await
    }

    /// Convert an EPUB, starting no new documents once `cancel` turns `true`
    ///
    /// A cancelled run still returns a valid container: documents already
    /// rewritten are included, the rest are passed through.
    pub async fn convert_with_cancel(
        &self,
        input: Vec<u8>,
        cancel: CancelSignal,
    ) -> Result<ConvertedEpub> {
        self.run(input, Some(cancel)).await
    }

    async fn run(&self, input: Vec<u8>, cancel: Option<CancelSignal>) -> Result<ConvertedEpub> {
        let archive = Archive::load(input)?;
        let package_path = container::resolve(&archive)?;
        let items = package::parse_manifest(&archive, &package_path)?;

        tracing::info!(
            "Converting EPUB: package {}, {} content documents, {} entries",
            package_path,
            items.len(),
            archive.len()
        );

        let mut report = ConversionReport {
            package_path,
            documents: items.len(),
            ..ConversionReport::default()
        };

        let archive = Arc::new(archive);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut started = Vec::new();

        for (index, item) in items.into_iter().enumerate() {
            if is_cancelled(&cancel) {
                report.cancelled = true;
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EpubError::Internal(e.to_string()))?;
            // Waiting for a permit may have outlasted the cancel
            if is_cancelled(&cancel) {
                report.cancelled = true;
                break;
            }

            started.push(item.path.clone());
            let archive = archive.clone();
            let rewriter = self.rewriter.clone();
            tasks.spawn(async move {
                let outcome = process_item(archive, rewriter, item).await;
                drop(permit);
                (index, outcome)
            });
        }

        if report.cancelled {
            tracing::warn!("Conversion cancelled, finishing documents already started");
        }

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!("Document task failed: {}", e);
                    failures.push(e.to_string());
                }
            }
        }
        record_lost_tasks(&started, &mut outcomes, failures);
        outcomes.sort_by_key(|(index, _)| *index);

        let mut rewrites = Vec::new();
        for (_, outcome) in outcomes {
            match outcome {
                Outcome::Rewritten {
                    path,
                    markup,
                    stats,
                } => {
                    report.stats += stats;
                    report.rewritten.push(path.clone());
                    rewrites.push(RewrittenEntry { path, markup });
                }
                Outcome::Skipped { path, error } => {
                    report.skipped.push(SkippedDocument {
                        path,
                        reason: error.to_string(),
                    });
                }
                Outcome::Missing { path } => report.missing.push(path),
            }
        }

        let archive = Arc::try_unwrap(archive)
            .map_err(|_| EpubError::Internal("archive still shared after join".to_string()))?;
        let packaged = repackager::apply(archive, rewrites)?;

        tracing::info!(
            "Converted EPUB: {} rewritten, {} skipped, {} missing, {} words emphasized",
            report.rewritten.len(),
            report.skipped.len(),
            report.missing.len(),
            report.stats.words
        );

        Ok(ConvertedEpub {
            bytes: packaged.bytes,
            content_type: packaged.content_type,
            report,
        })
    }
}

/// Report every started document whose task died without an outcome
fn record_lost_tasks(
    started: &[String],
    outcomes: &mut Vec<(usize, Outcome)>,
    failures: Vec<String>,
) {
    if failures.is_empty() {
        return;
    }
    let finished: HashSet<usize> = outcomes.iter().map(|(index, _)| *index).collect();
    let lost: Vec<(usize, String)> = started
        .iter()
        .enumerate()
        .filter(|(index, _)| !finished.contains(index))
        .map(|(index, path)| (index, path.clone()))
        .collect();

    // Join errors carry no index; pair them with lost documents in order
    for ((index, path), reason) in lost.into_iter().zip(failures) {
        outcomes.push((
            index,
            Outcome::Skipped {
                path,
                error: DocumentError::Task(reason),
            },
        ));
    }
}

fn is_cancelled(cancel: &Option<CancelSignal>) -> bool {
    cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
}

async fn process_item<C: MarkupCodec + 'static>(
    archive: Arc<Archive>,
    rewriter: Arc<DocumentRewriter<C>>,
    item: ManifestItem,
) -> Outcome {
    let Some(path) = item
        .candidate_paths()
        .into_iter()
        .find(|p| archive.contains(p))
    else {
        tracing::warn!("Manifest item {} has no entry in the archive", item.path);
        return Outcome::Missing { path: item.path };
    };

    let task_path = path.clone();
    let result = tokio::task::spawn_blocking(move || {
        let raw = archive
            .read(&task_path)
            .map_err(|e| DocumentError::Read(e.to_string()))?
            .ok_or_else(|| DocumentError::Read(format!("{} vanished", task_path)))?;
        rewriter.rewrite(&raw)
    })
    .await
    .unwrap_or_else(|e| Err(DocumentError::Task(e.to_string())));

    match result {
        Ok(rewritten) => {
            tracing::debug!(
                "Rewrote {}: {} text segments, {} words",
                path,
                rewritten.stats.segments,
                rewritten.stats.words
            );
            Outcome::Rewritten {
                path,
                markup: rewritten.markup,
                stats: rewritten.stats,
            }
        }
        Err(error) => {
            tracing::warn!("Skipping {} due to error: {}", path, error);
            Outcome::Skipped { path, error }
        }
    }
}

/// Convert an EPUB with the default configuration
pub async fn convert(input: Vec<u8>) -> Result<ConvertedEpub> {
    Converter::default().convert(input).await
}
