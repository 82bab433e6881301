//! # llm
//!
//! Language model providers used to generate post content.
//!
//! This crate provides:
//! - The [`AIProvider`] trait and the message/response types shared by providers
//! - [`AnthropicProvider`] and [`OpenAIProvider`] implementations over `reqwest`
//! - A [`ProviderRegistry`] that picks a provider for a model name
//! - [`LlmError`], which tells callers whether a failure is worth retrying
//!
//! ## Example
//!
//! ```rust,ignore
//! use llm::{AIMessage, GenerateOptions, ProviderRegistry};
//!
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.require_for_model("claude-sonnet-4-20250514")?;
//! let response = provider
//!     .generate_text(
//!         "claude-sonnet-4-20250514",
//!         &[AIMessage::user("Give me one Rust tip")],
//!         &GenerateOptions::default(),
//!     )
//!     .await?;
//! ```

pub mod anthropic;
pub mod errors;
pub mod openai;
pub mod provider;
pub mod registry;

pub use anthropic::AnthropicProvider;
pub use errors::{LlmError, LlmResult};
pub use openai::OpenAIProvider;
pub use provider::{AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions, TokenUsage};
pub use registry::ProviderRegistry;
