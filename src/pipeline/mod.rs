// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Response processing pipeline
//!
//! Orchestrates one user turn: provider call, stream accumulation,
//! completeness validation, the bounded retry loop, code extraction, and
//! sanitization. Emits the user-visible chat text and, when a payload was
//! found, a host-ready code artifact.

pub mod accumulator;
pub mod extractor;
pub mod markers;
pub mod retry;
pub mod sanitizer;
pub mod validator;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::llm::provider::{ChatRequest, LlmProvider};
pub use accumulator::{AccumulatedResponse, StreamAccumulator, StreamStats};
pub use extractor::{CodeExtractor, Confidence, ExtractionAttempt, StrategyId};
pub use retry::{classify_transport, RetryDecision, RetryPolicy, RetryState, TransportClass};
pub use sanitizer::{CodeSanitizer, Sanitized, SanitizerFix};
pub use validator::{IssueTag, ResponseValidator, ValidationVerdict};

/// Where a pipeline run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Requesting,
    Accumulating,
    Validating,
    Retrying,
    ExtractingCode,
    Sanitizing,
    Ready,
    Failed,
}

/// The terminal artifact of one user turn
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Identifier for this turn
    pub turn_id: Uuid,
    /// Chat text with control markers stripped
    pub user_visible_text: String,
    /// Host-ready code, when a payload was extracted
    pub extracted_code: Option<String>,
    /// Confidence tier of the winning extraction strategy
    pub confidence: Option<Confidence>,
    /// Whether the model asked the host to run the scene
    pub run_requested: bool,
}

/// Callbacks a turn emits toward the chat surface and the rendering host.
///
/// `on_code_ready` and `on_run_requested` fire at most once per turn, never
/// concurrently, and never on a failed turn.
pub trait TurnObserver {
    /// A streaming text fragment arrived (fires per fragment, on every
    /// attempt including retried ones).
    fn on_text_delta(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    /// The turn is about to be retried after `delay`.
    fn on_retry(&mut self, _delay: Duration, _attempt: u32, _max_retries: u32) -> Result<()> {
        Ok(())
    }

    /// The final chat text for display.
    fn on_user_visible_text(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    /// Sanitized code is ready for injection.
    fn on_code_ready(&mut self, _code: &str) -> Result<()> {
        Ok(())
    }

    /// The model requested the scene be run after injection.
    fn on_run_requested(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Observer that ignores every callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl TurnObserver for NullObserver {}

/// Drives one user turn through the processing stages.
///
/// A pipeline instance handles one turn at a time; callers hold new turns
/// until the previous one reaches `Ready` or `Failed`. Dropping the future
/// returned by [`ResponsePipeline::run_turn`] cancels the turn at its
/// current suspension point; all state is turn-local so nothing leaks and
/// no partial code reaches the host.
pub struct ResponsePipeline {
    provider: Arc<dyn LlmProvider>,
    settings: Settings,
    state: PipelineState,
}

impl ResponsePipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: Settings) -> Self {
        Self {
            provider,
            settings,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run one user turn to completion.
    pub async fn run_turn(
        &mut self,
        request: ChatRequest,
        observer: &mut dyn TurnObserver,
    ) -> Result<PipelineResult> {
        let turn_id = Uuid::new_v4();
        let policy = RetryPolicy::new(&self.settings.resilience);
        let validator = ResponseValidator::new(self.settings.pipeline.min_response_length);
        let stall_timeout = self.settings.pipeline.stall_timeout();
        let mut retry_state = policy.initial_state();
        let mut last_nonempty: Option<AccumulatedResponse> = None;

        tracing::info!(
            target: "sceneforge.pipeline",
            %turn_id,
            model = %request.model,
            provider = self.provider.name(),
            "turn started"
        );

        let response = loop {
            let attempt = policy.max_retries() - retry_state.attempts_remaining + 1;
            self.state = PipelineState::Requesting;

            let outcome = self
                .attempt_stream(&request, stall_timeout, observer)
                .await;

            let accumulated = match outcome {
                Ok(accumulated) => accumulated,
                Err(error) => {
                    let decision = policy.decide_transport(&error, retry_state);
                    if !decision.retry {
                        tracing::warn!(
                            target: "sceneforge.pipeline",
                            %turn_id,
                            attempt,
                            error = %error,
                            "turn failed on transport error"
                        );
                        self.state = PipelineState::Failed;
                        return Err(error);
                    }
                    retry_state =
                        self.enter_retry(decision, attempt, &policy, observer).await?;
                    continue;
                }
            };

            self.state = PipelineState::Validating;
            let verdict = validator.validate(&accumulated.text);
            tracing::debug!(
                target: "sceneforge.pipeline",
                %turn_id,
                attempt,
                complete = verdict.is_complete,
                issues = ?verdict.issues,
                "attempt validated"
            );

            if !accumulated.text.trim().is_empty() {
                last_nonempty = Some(accumulated.clone());
            }

            if verdict.should_retry {
                let decision = policy.decide_validation(&verdict, retry_state);
                if decision.retry {
                    retry_state =
                        self.enter_retry(decision, attempt, &policy, observer).await?;
                    continue;
                }
            }

            // Budget exhausted or verdict acceptable: surface what we have,
            // falling back to the best earlier attempt if this one is empty.
            if accumulated.text.trim().is_empty() {
                match last_nonempty.take() {
                    Some(previous) => break previous,
                    None => {
                        self.state = PipelineState::Failed;
                        return Err(PipelineError::EmptyResponse.into());
                    }
                }
            }
            break accumulated;
        };

        self.state = PipelineState::ExtractingCode;
        let attempt = CodeExtractor::extract(&response.text);
        let run_requested = response.text.contains(markers::RUN_SCENE);
        let user_visible_text = markers::strip_control_markers(&response.text)
            .trim()
            .to_string();

        let (extracted_code, confidence) = match attempt {
            Some(attempt) => {
                self.state = PipelineState::Sanitizing;
                let sanitized = CodeSanitizer::sanitize(&attempt.payload);
                if sanitized.code.is_empty() {
                    // Everything in the payload was host boilerplate.
                    (None, None)
                } else {
                    (Some(sanitized.code), Some(attempt.confidence))
                }
            }
            None => {
                tracing::debug!(
                    target: "sceneforge.pipeline",
                    %turn_id,
                    error = %PipelineError::ExtractionFailed,
                    "turn completes without a code artifact"
                );
                (None, None)
            }
        };

        observer.on_user_visible_text(&user_visible_text)?;
        if let Some(code) = &extracted_code {
            observer.on_code_ready(code)?;
            if run_requested {
                observer.on_run_requested()?;
            }
        }

        self.state = PipelineState::Ready;
        tracing::info!(
            target: "sceneforge.pipeline",
            %turn_id,
            code = extracted_code.is_some(),
            run_requested,
            fragments = response.stats.fragment_count,
            "turn ready"
        );

        Ok(PipelineResult {
            turn_id,
            user_visible_text,
            extracted_code,
            confidence,
            run_requested,
        })
    }

    /// One provider call: request the stream and accumulate it.
    async fn attempt_stream(
        &mut self,
        request: &ChatRequest,
        stall_timeout: Duration,
        observer: &mut dyn TurnObserver,
    ) -> Result<AccumulatedResponse> {
        let stream = self.provider.chat_stream(request.clone()).await?;
        self.state = PipelineState::Accumulating;
        StreamAccumulator::collect(stream, stall_timeout, |fragment| {
            observer.on_text_delta(fragment)
        })
        .await
    }

    /// Announce and sleep out a retry, returning the decremented state.
    async fn enter_retry(
        &mut self,
        decision: RetryDecision,
        attempt: u32,
        policy: &RetryPolicy,
        observer: &mut dyn TurnObserver,
    ) -> Result<RetryState> {
        self.state = PipelineState::Retrying;
        tracing::info!(
            target: "sceneforge.pipeline",
            attempt,
            max_retries = policy.max_retries(),
            delay_secs = decision.delay.as_secs_f64(),
            "retrying turn"
        );
        observer.on_retry(decision.delay, attempt, policy.max_retries())?;
        tokio::time::sleep(decision.delay).await;
        Ok(decision.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::Message;
    use crate::llm::mock_provider::MockProvider;

    fn settings_fast() -> Settings {
        let mut settings = Settings::default();
        settings.resilience.base_delay_secs = 0;
        settings
    }

    fn request() -> ChatRequest {
        ChatRequest::new("mock-model", vec![Message::user("make me a cube")])
    }

    fn pipeline_with(provider: MockProvider, settings: Settings) -> ResponsePipeline {
        ResponsePipeline::new(Arc::new(provider), settings)
    }

    #[tokio::test]
    async fn test_initial_state_idle() {
        let pipeline = pipeline_with(MockProvider::new(), settings_fast());
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_turn_reaches_ready() {
        let text = format!(
            "{}\n[INSERT_CODE]```javascript\nconst box = BABYLON.MeshBuilder.CreateBox(\"b\", {{}}, scene);\n```\n[/INSERT_CODE]",
            "Here is the cube scene you asked for, with default lighting. "
                .repeat(2)
        );
        let provider = MockProvider::new().with_response(text);
        let mut pipeline = pipeline_with(provider, settings_fast());

        let result = pipeline
            .run_turn(request(), &mut NullObserver)
            .await
            .unwrap();

        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert!(result.extracted_code.is_some());
        assert_eq!(result.confidence, Some(Confidence::Strict));
        assert!(!result.user_visible_text.contains("[INSERT_CODE]"));
    }

    #[tokio::test]
    async fn test_failed_state_on_client_error() {
        let provider = MockProvider::new().with_transport_error("401 unauthorized");
        let mut pipeline = pipeline_with(provider, settings_fast());

        let err = pipeline.run_turn(request(), &mut NullObserver).await;
        assert!(err.is_err());
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }
}
