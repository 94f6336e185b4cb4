// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Provides a configurable mock implementation of the LlmProvider trait
//! that can be used in unit tests and offline replay without making real
//! API calls. Supports fragment chunking, injected inter-fragment delays
//! (for stall testing), scripted transport failures, and in-stream errors.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ApiError, ForgeError, Result};
use crate::llm::provider::{ChatRequest, EventStream, FinishReason, LlmProvider, StreamEvent};

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Scripted turns, consumed in order (the last one repeats)
    script: Arc<Mutex<Vec<MockTurn>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<ChatRequest>>>,
}

/// One scripted provider call
#[derive(Clone, Debug)]
pub enum MockTurn {
    /// Stream text split into fragments
    Text {
        text: String,
        /// Characters per fragment
        chunk_size: usize,
        /// Sleep this long before emitting the fragment at this index
        delay_before: Option<(usize, Duration)>,
        /// Finish signal embedded in the stream
        finish: Option<FinishReason>,
    },
    /// Fail the call before any fragment is produced
    TransportError(String),
    /// Emit text, then an in-stream error event
    StreamError {
        text: String,
        error_type: String,
        message: String,
    },
}

impl MockTurn {
    fn text(text: impl Into<String>) -> Self {
        MockTurn::Text {
            text: text.into(),
            chunk_size: 16,
            delay_before: None,
            finish: Some(FinishReason::EndTurn),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            script: Arc::new(Mutex::new(vec![MockTurn::text("Mock response.")])),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Create a mock provider with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut provider = Self::new();
        provider.name = name.into();
        provider
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, Vec<MockTurn>> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Mock provider script lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Set a single text response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        {
            let mut script = self.lock_script();
            script.clear();
            script.push(MockTurn::text(text));
        }
        self
    }

    /// Queue multiple text responses (returned in order, last repeats)
    pub fn with_responses(self, texts: Vec<String>) -> Self {
        {
            let mut script = self.lock_script();
            script.clear();
            for text in texts {
                script.push(MockTurn::text(text));
            }
        }
        self
    }

    /// Queue arbitrary scripted turns
    pub fn with_script(self, turns: Vec<MockTurn>) -> Self {
        {
            let mut script = self.lock_script();
            *script = turns;
        }
        self
    }

    /// Set a single response that pauses before the given fragment index
    pub fn with_stalling_response(
        self,
        text: impl Into<String>,
        stall_before_fragment: usize,
        stall_for: Duration,
    ) -> Self {
        {
            let mut script = self.lock_script();
            script.clear();
            script.push(MockTurn::Text {
                text: text.into(),
                chunk_size: 16,
                delay_before: Some((stall_before_fragment, stall_for)),
                finish: Some(FinishReason::EndTurn),
            });
        }
        self
    }

    /// Fail every call with a transport error message
    pub fn with_transport_error(self, message: impl Into<String>) -> Self {
        {
            let mut script = self.lock_script();
            script.clear();
            script.push(MockTurn::TransportError(message.into()));
        }
        self
    }

    /// Number of calls made to this provider
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests recorded across all calls
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        match self.recorded_requests.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn next_turn(&self) -> MockTurn {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);
        let script = self.lock_script();
        if script.is_empty() {
            return MockTurn::text("");
        }
        let index = call.min(script.len() - 1);
        script[index].clone()
    }
}

/// Split text into fragments of at most `chunk_size` characters,
/// respecting char boundaries.
fn fragment(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|c| c.iter().collect())
        .collect()
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        {
            let mut recorded = match self.recorded_requests.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            recorded.push(request);
        }

        match self.next_turn() {
            MockTurn::TransportError(message) => {
                Err(ForgeError::Api(ApiError::Network(message)))
            }
            MockTurn::Text {
                text,
                chunk_size,
                delay_before,
                finish,
            } => {
                let fragments = fragment(&text, chunk_size);
                let stream = async_stream::stream! {
                    for (index, frag) in fragments.into_iter().enumerate() {
                        if let Some((stall_index, stall_for)) = delay_before {
                            if index == stall_index {
                                tokio::time::sleep(stall_for).await;
                            }
                        }
                        yield Ok(StreamEvent::TextDelta(frag));
                    }
                    yield Ok(StreamEvent::MessageStop { reason: finish });
                };
                Ok(Box::pin(stream))
            }
            MockTurn::StreamError {
                text,
                error_type,
                message,
            } => {
                let fragments = fragment(&text, 16);
                let stream = async_stream::stream! {
                    for frag in fragments {
                        yield Ok(StreamEvent::TextDelta(frag));
                    }
                    yield Ok(StreamEvent::Error { error_type, message });
                };
                Ok(Box::pin(stream))
            }
        }
    }
}
