pub mod engine;
mod engine_error;

pub use engine::{EngineCommand, NegotiationEngine, Phase};
pub use engine_error::NegotiationError;
