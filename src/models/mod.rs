pub mod config;
pub mod data;

pub use config::{FieldWeights, VerifierConfig};
pub use data::*;
