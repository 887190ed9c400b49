//! Generation service clients.
//!
//! The pipeline talks to its LLM through the [`ChatProvider`] trait so the
//! orchestration logic can be exercised against stub providers in tests and
//! so additional backends can be added without touching the core.

mod openai;
mod provider;

pub use openai::{OpenAiConfig, OpenAiConfigBuilder, OpenAiProvider};
pub use provider::ChatProvider;
