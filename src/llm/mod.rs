//! Model routing and AI provider access.
//!
//! - [`selector`] maps a query to a provider/model/parameter tuple
//! - [`analysis`] labels queries for logging and previews
//! - [`openai_compat`] talks to Groq and Together
//! - [`failover`] moves a request to the other provider when one fails

pub mod analysis;
pub mod failover;
pub mod openai_compat;
pub mod provider;
pub mod selector;

pub use analysis::{QueryAnalysis, QueryClassifier, QueryFeatures};
pub use failover::{FailoverRouter, ProviderStats, RoutedCompletion};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ProviderKind,
    Role,
};
pub use selector::{ModelSelection, ModelSelector, SelectionDecision, SelectionHints};
