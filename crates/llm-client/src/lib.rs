//! `llm-client`: chat-completions driver used by model-backed judges.
//!
//! Speaks the `/v1/chat/completions` shape shared by Mistral, Groq and
//! OpenAI: one request, one JSON response, no streaming.
//!
//! ```text
//! ChatRequest ──► ChatClient::complete ──► ChatResponse
//!                        │
//!                        └─► complete_json::<T>  (first choice decoded as T)
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use llm_client::{ChatClient, ChatMessage, ChatRequest};
//!
//! let client = ChatClient::new(
//!     "https://api.mistral.ai/v1/chat/completions",
//!     std::env::var("MISTRAL_API_KEY").ok(),
//!     std::time::Duration::from_secs(10),
//! )?;
//! let req = ChatRequest::new("mistral-small-latest", vec![ChatMessage::user("ping")]);
//! let reply = client.complete(&req).await?;
//! println!("{}", reply.first_text().unwrap_or(""));
//! ```

pub mod client;
pub mod error;
pub mod types;


pub use client::{parse_json_reply, ChatClient};
pub use error::LlmError;
pub use types::{ChatMessage, ChatRequest, ChatResponse, Choice, Role, Usage};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, LlmError>;
