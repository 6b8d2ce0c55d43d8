pub mod gemini;
pub mod media;

pub use gemini::{GeminiImageClient, GenerationError, ImageGenerator, InlineImage};
