pub mod gemini;

pub use gemini::{GeminiConfig, GeminiEmbedder, GeminiGenerator};
