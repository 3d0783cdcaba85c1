// Error types for package generation
//
// Every fatal condition aborts the whole generation; nothing here is retried.

use crate::transform::StylesheetId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("template `{name}` not found (searched: {})", display_paths(.searched))]
    TemplateNotFound { name: String, searched: Vec<PathBuf> },

    #[error("{stage} stage failed for `{part}`")]
    Transform {
        part: String,
        stage: String,
        #[source]
        source: TransformError,
    },

    #[error("failed to fetch image `{locator}` for `{entry}`")]
    ImageFetch {
        locator: String,
        entry: String,
        #[source]
        source: FetchError,
    },

    #[error("template archive is malformed at `{entry}`: {reason}")]
    ArchiveIntegrity { entry: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn archive(entry: impl Into<String>, reason: impl ToString) -> Self {
        Error::ArchiveIntegrity {
            entry: entry.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transform(part: impl Into<String>, stage: impl ToString, source: TransformError) -> Self {
        Error::Transform {
            part: part.into(),
            stage: stage.to_string(),
            source,
        }
    }
}

/// Failure inside a single stylesheet stage.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("stylesheet parameters must come in name/value pairs, got {0} values")]
    ParamCount(usize),

    #[error("stage `{0}` is not registered")]
    MissingStage(StylesheetId),

    #[error("stage `{stage}` produced {found} where {expected} was expected")]
    StageOrder {
        stage: StylesheetId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("empty pipeline")]
    EmptyPipeline,

    #[error("anchor `{0}` not found")]
    MissingAnchor(String),

    #[error("malformed xml: {0}")]
    Xml(String),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("remote fetch failed: {0}")]
    Remote(String),

    #[error("remote images are not enabled (build with the `remote-images` feature)")]
    RemoteDisabled,
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn xml_err<E: std::fmt::Display>(e: E) -> TransformError {
    TransformError::Xml(e.to_string())
}
