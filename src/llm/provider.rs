// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM Provider trait and related types
//!
//! Defines the abstraction layer for different LLM backends. The pipeline
//! only ever sees this boundary: a request goes in, a lazy stream of text
//! fragments comes back.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::llm::message::{Conversation, Message};

/// A boxed stream of provider events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Main trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "anthropic", "openrouter")
    fn name(&self) -> &str;

    /// Streaming chat completion
    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream>;
}

/// Request for a chat completion
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,

    /// System prompt
    pub system: Option<String>,

    /// Messages in the conversation
    pub messages: Vec<Message>,

    /// Sampling parameters
    pub sampling: SamplingParams,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages,
            sampling: SamplingParams::default(),
        }
    }

    /// Build a request from a conversation's history and system prompt.
    pub fn from_conversation(model: impl Into<String>, conversation: &Conversation) -> Self {
        Self {
            model: model.into(),
            system: conversation.system_prompt.clone(),
            messages: conversation.messages.clone(),
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }
}

/// Sampling parameters for a completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Maximum tokens in response
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Events from a streaming response
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A fragment of response text
    TextDelta(String),

    /// The provider signalled the end of the message
    MessageStop { reason: Option<FinishReason> },

    /// Ping (keep-alive)
    Ping,

    /// In-stream error reported by the provider
    Error { error_type: String, message: String },
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of message
    EndTurn,
    /// Hit max tokens
    MaxTokens,
    /// Stop sequence hit
    StopSequence,
}
