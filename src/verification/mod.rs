pub mod confidence;
pub mod decision;

pub use confidence::ConfidenceAggregator;
pub use decision::DecisionEngine;
