//! Mock provider implementation for testing.

use super::{Generation, GenerationParams, ProviderError, TextProvider};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock text provider that echoes the prompt and counts calls.
#[derive(Clone, Default)]
pub struct MockTextProvider {
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MockTextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<Generation, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::ApiError("mock provider failure".to_string()));
        }

        Ok(Generation {
            text: format!("Mock response for: {}", prompt),
            input_tokens: u32::try_from(prompt.len() / 4).unwrap_or(u32::MAX),
            output_tokens: 10,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
