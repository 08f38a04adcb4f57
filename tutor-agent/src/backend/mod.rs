//! LLM backend abstraction layer.
//!
//! - OpenAI-compatible HTTP APIs (OpenAI, vLLM, Ollama)
//! - Mock backend for tests and offline development

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockBackend;
pub use openai::OpenAiBackend;
pub use traits::{
    CompletionRequest, CompletionResponse, FinishReason, LlmBackend, LlmError, Message,
    MessageRole, ModelCapabilities, Moderation, Usage,
};
