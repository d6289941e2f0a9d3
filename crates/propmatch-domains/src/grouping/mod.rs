pub mod resolver;
pub mod scoring;
pub mod signature;
pub mod similarity;

pub use resolver::{resolve_listing, Resolution};
pub use scoring::{fuzzy_score, FuzzyScore};
pub use signature::build_signature;
pub use similarity::trigram_similarity;
