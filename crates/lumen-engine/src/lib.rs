pub mod client;
pub mod error;
pub mod mask;
pub mod normalize;
pub mod output;
pub mod payload;
pub mod vision;

pub use error::{EngineError, Result};
pub use normalize::NormalizedImage;
