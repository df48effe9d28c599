use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// Failure at a specific stage of an LLM call, with the raw payload kept for logs.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    pub fn find(err: &anyhow::Error) -> Option<&Self> {
        err.chain().find_map(|e| e.downcast_ref::<Self>())
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}
