//! Reasoner contract and the Anthropic implementation
//!
//! The orchestrator only sees [`Reasoner`]: give it the (trimmed) conversation and
//! the tool declarations, get back an assistant turn, tool calls and token usage.

pub mod anthropic;
pub mod reasoner;
pub mod types;

pub use anthropic::{ANTHROPIC_API_URL, AnthropicConfig, AnthropicReasoner};
pub use reasoner::{Reasoner, ReasonerError};
pub use types::{PlanRequest, PlanResponse, TokenUsage, ToolDefinition};
