//! The LLM-facing layer: prompt assembly, provider abstraction, and the
//! guardrail loop that turns raw model output into typed, validated steps.

pub mod guardrail;
pub mod prompt;
pub mod provider;

pub use guardrail::{Guarded, GuardrailError, GuardrailFailure, GuardrailLoop};
pub use prompt::PromptContext;
pub use provider::{ChatCompletionsProvider, LlmError, LlmProvider, LlmRequest, LlmResponse};
