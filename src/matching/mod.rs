pub mod engine;

pub use engine::{MatchError, MatchOutcome, MatchingEngine};
