//! Structural extraction: snapshot directory in, [`CodeGraph`] out.
//!
//! Files are walked with `ignore` (hidden files and `.gitignore` honoured),
//! handed to the parser registered for their extension and the per-file
//! results are resolved into one graph. A file that fails to read or parse is
//! recorded on the graph's extraction report and skipped; extraction only
//! fails when no file at all could be parsed.

pub mod parser;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::graph::{CodeGraph, GraphBuilder};
use parser::ParserRegistry;

/// Extraction errors.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Not a single recognized source file could be parsed.
    #[error("No source file could be parsed ({failures} failed, {skipped} unrecognized)")]
    EmptyGraph { failures: usize, skipped: usize },

    /// The snapshot root could not be read.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

impl ExtractError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Walks a directory tree and builds its code graph.
pub struct Extractor {
    registry: ParserRegistry,
    config: ExtractionConfig,
}

impl Extractor {
    /// Create an extractor with all built-in parsers.
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            registry: ParserRegistry::new(),
            config,
        }
    }

    /// Extract on the blocking thread pool.
    pub async fn extract_async(self: Arc<Self>, root: PathBuf) -> Result<CodeGraph, ExtractError> {
        tokio::task::spawn_blocking(move || self.extract(&root))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))?
    }

    /// Parse every recognized file under `root` and resolve the results.
    pub fn extract(&self, root: &Path) -> Result<CodeGraph, ExtractError> {
        let metadata = std::fs::metadata(root).map_err(|e| ExtractError::io(root, e))?;
        if !metadata.is_dir() {
            return Err(ExtractError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "snapshot root is not a directory"),
            ));
        }

        debug!(root = %root.display(), languages = ?self.registry.languages(), "extracting");
        let mut builder = GraphBuilder::new();
        let mut skipped = 0usize;
        let mut failures = 0usize;

        for (path, relative) in self.source_files(root) {
            let Some(parser) = self.registry.parser_for_path(&relative) else {
                skipped += 1;
                continue;
            };

            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if size > self.config.max_file_size {
                debug!(file = %relative, size, "skipping oversized file");
                skipped += 1;
                continue;
            }

            let content = match std::fs::read(&path) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(content) => content,
                    Err(_) => {
                        failures += 1;
                        builder.add_failure(relative, "file is not valid UTF-8");
                        continue;
                    }
                },
                Err(e) => {
                    failures += 1;
                    builder.add_failure(relative, format!("read failed: {}", e));
                    continue;
                }
            };

            match parser.parse_file(&relative, &content) {
                Ok(result) => {
                    for warning in &result.warnings {
                        debug!(file = %relative, "{}", warning);
                    }
                    builder.add_file(result);
                }
                Err(reason) => {
                    warn!(file = %relative, %reason, "parse failed");
                    failures += 1;
                    builder.add_failure(relative, reason);
                }
            }
        }

        if builder.parsed_files() == 0 {
            return Err(ExtractError::EmptyGraph { failures, skipped });
        }

        let graph = builder.build();
        info!(
            files = graph.report().files_parsed,
            failed = failures,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "extraction complete"
        );
        Ok(graph)
    }

    /// Candidate files under `root` with their `/`-separated relative paths,
    /// sorted so the walk order never depends on the filesystem.
    fn source_files(&self, root: &Path) -> Vec<(PathBuf, String)> {
        let excluded = self.config.exclude_dirs.clone();
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir && entry.depth() > 0 && excluded.iter().any(|d| entry.file_name() == d.as_str()))
            })
            .build();

        let mut files: Vec<(PathBuf, String)> = walker
            .flatten()
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .filter_map(|entry| {
                let path = entry.into_path();
                let relative = path
                    .strip_prefix(root)
                    .ok()?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                Some((path, relative))
            })
            .collect();
        files.sort_by(|a, b| a.1.cmp(&b.1));
        files
    }
}
