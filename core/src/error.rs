use thiserror::Error;

use crate::boolean::ParseError;
use crate::scoring::Stage;

/// Errors surfaced by the catalogue engine.
///
/// `Validation`, `BooleanParse` and `Scorer` are recovered inside the engine
/// and never reach callers of [`crate::SearchEngine::search`]; the rest are
/// real faults.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    Validation(String),

    #[error("failed to load dataset: {0}")]
    DataLoad(String),

    #[error("search engine not initialized: no documents loaded")]
    NotInitialized,

    #[error("boolean query rejected: {0}")]
    BooleanParse(#[from] ParseError),

    #[error("stage {stage} failed: {message}")]
    Scorer { stage: Stage, message: String },

    #[error("unknown facet: {0}")]
    UnknownFacet(String),

    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    pub fn data_load<S: Into<String>>(msg: S) -> Self {
        SearchError::DataLoad(msg.into())
    }

    pub fn scorer<S: Into<String>>(stage: Stage, msg: S) -> Self {
        SearchError::Scorer { stage, message: msg.into() }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
