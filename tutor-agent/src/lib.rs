//! Tutor agent - AI tutor chat for TutorUG students
//!
//! Wraps an OpenAI-compatible model behind moderation, tutoring prompts and
//! per-user chat sessions. Answered messages feed the reputation engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              TutorService                │
//! │   moderate ─▶ complete ─▶ moderate reply │
//! └──────┬───────────────┬───────────────┬───┘
//!        │               │               │
//!        ▼               ▼               ▼
//! ┌─────────────┐ ┌─────────────┐ ┌─────────────┐
//! │ LlmBackend  │ │SessionStore │ │ Reputation  │
//! │ (OpenAI,    │ │ (history,   │ │ Engine      │
//! │  mock)      │ │  tokens)    │ │ (optional)  │
//! └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! Every model call runs under the configured deadline. A timed-out or
//! refused exchange stores nothing and awards nothing.

pub mod backend;
pub mod error;
pub mod prompts;
pub mod service;
pub mod session;

pub use backend::{
    CompletionRequest, CompletionResponse, LlmBackend, LlmError, Message, MessageRole,
    MockBackend, ModelCapabilities, Moderation, OpenAiBackend,
};
pub use error::{ChatError, Result};
pub use prompts::{
    system_prompt, SessionKind, StudentContext, SubjectContext, TopicContext, TutorContext,
};
pub use service::{TutorConfig, TutorReply, TutorService, AI_CHAT_MESSAGE, FLAGGED_REPLY_FALLBACK};
pub use session::{ChatMessage, ChatSession, InMemorySessionStore, SessionStore, SessionSummary};
