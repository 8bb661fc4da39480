//! Completion provider backends.

mod openai;
pub mod sse;

pub use openai::{
    DEFAULT_AZURE_API_VERSION, OpenAiAuth, OpenAiBackend, OpenAiBackendBuilder, OpenAiEndpoint,
};
