//! Multi-stage relevance scoring.

pub mod combine;
pub mod query;
pub mod result;
pub mod signals;
pub mod stage;
pub mod stages;

pub use combine::{combine, diversify, present, Candidate};
pub use query::{detect_intent, DetectedIntent, Intent, ProcessedQuery, QueryProcessor};
pub use result::{Annotations, ScoreContribution, SearchResult, StageHit};
pub use signals::StaticScores;
pub use stage::{Stage, StageTable};
pub use stages::{Pipeline, StageContext, StageRun, StageScorer};
