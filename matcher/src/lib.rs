//! Keyword rotation and post classification.
//!
//! [`KeywordSet`] decides which keywords a tick searches for, and
//! [`Classifier`] decides what a fetched post is. Both are built once at
//! startup and are read-only afterwards.

pub mod classifier;
pub mod competitors;
pub mod keywords;
pub mod loader;
pub mod rules;

pub use classifier::Classifier;
pub use competitors::{normalize_community, CompetitorCatalogue};
pub use keywords::{KeywordSet, MatchTargets};
pub use loader::{load_keyword_file, KeywordEntry};
pub use rules::{GeoRules, SpamRules};
