pub mod error;

pub use error::VerifierError;
