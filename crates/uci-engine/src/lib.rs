//! UCI engine channel: strength limiting, continuous analysis and best-move
//! requests multiplexed over one long-lived engine process.

pub mod channel;
pub mod error;
pub mod protocol;
pub mod strength;

pub use channel::{EngineChannel, EngineSettings};
pub use error::EngineError;
pub use protocol::{EvaluationSample, Score};
pub use strength::skill_level;
