//! Mock generation backend for deterministic testing.
//!
//! Returns a fixed response, or plays back a script of responses and errors
//! one call at a time. Clones share state, so a test can keep a handle for
//! assertions while the classifier owns another.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tally_core::{Error, GenerationBackend, Result};

/// Mock generation backend for testing.
#[derive(Clone)]
pub struct MockGenerationBackend {
    default_response: Arc<Mutex<String>>,
    script: Arc<Mutex<VecDeque<Result<String>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockGenerationBackend {
    /// Create a new mock backend answering "Other" by default.
    pub fn new() -> Self {
        Self {
            default_response: Arc::new(Mutex::new("Other".to_string())),
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the fixed response for every call.
    pub fn with_response(self, response: impl Into<String>) -> Self {
        *self.default_response.lock().unwrap() = response.into();
        self
    }

    /// Script the next calls, in order. Once the script runs out, calls fall
    /// back to the fixed response.
    pub fn with_script(self, script: Vec<Result<String>>) -> Self {
        *self.script.lock().unwrap() = script.into();
        self
    }

    /// Number of generate calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push(prompt.to_string());

        if let Some(scripted) = self.script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(self.default_response.lock().unwrap().clone())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

// Error isn't Clone, so scripted errors are rebuilt instead of cloned.
impl MockGenerationBackend {
    /// Convenience: script `n` rate-limit errors followed by a success.
    pub fn rate_limited_then(n: usize, response: impl Into<String>) -> Self {
        let mut script: Vec<Result<String>> = Vec::with_capacity(n + 1);
        for _ in 0..n {
            script.push(Err(Error::RateLimited { retry_after: None }));
        }
        script.push(Ok(response.into()));
        Self::new().with_script(script)
    }
}
