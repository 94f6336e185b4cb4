// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Stream accumulation
//!
//! Consumes a provider's lazy fragment stream into one response string.
//! Terminates early on the provider's finish signal and fails with a stall
//! timeout when no fragment arrives inside the configured window. Content is
//! never inspected semantically here.

use std::time::Duration;

use futures::StreamExt;

use crate::error::{ApiError, PipelineError, Result};
use crate::llm::provider::{EventStream, FinishReason, StreamEvent};

/// The accumulated response for one provider call
#[derive(Debug, Clone)]
pub struct AccumulatedResponse {
    /// Concatenated response text
    pub text: String,
    /// Finish signal reported by the provider, if any
    pub finish: Option<FinishReason>,
    /// Stream statistics for diagnostics
    pub stats: StreamStats,
}

/// Statistics about a streaming response
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamStats {
    /// Number of text fragments received
    pub fragment_count: usize,
    /// Total characters received
    pub total_chars: usize,
}

/// Accumulator for streaming response fragments
pub struct StreamAccumulator;

impl StreamAccumulator {
    /// Drain `stream` into a single response string.
    ///
    /// `on_delta` is invoked for every text fragment as it arrives, so a
    /// caller can surface streaming output while accumulation runs. An error
    /// from the callback aborts the stream.
    pub async fn collect<F>(
        mut stream: EventStream,
        stall_timeout: Duration,
        mut on_delta: F,
    ) -> Result<AccumulatedResponse>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let mut text = String::new();
        let mut finish = None;
        let mut stats = StreamStats::default();

        loop {
            let event = match tokio::time::timeout(stall_timeout, stream.next()).await {
                Err(_elapsed) => {
                    tracing::warn!(
                        target: "sceneforge.pipeline.accumulator",
                        stall_secs = stall_timeout.as_secs(),
                        fragments = stats.fragment_count,
                        "stream stalled mid-response"
                    );
                    return Err(PipelineError::StallTimeout {
                        secs: stall_timeout.as_secs(),
                    }
                    .into());
                }
                Ok(None) => break,
                Ok(Some(event)) => event?,
            };

            match event {
                StreamEvent::TextDelta(fragment) => {
                    stats.fragment_count += 1;
                    stats.total_chars += fragment.chars().count();
                    on_delta(&fragment)?;
                    text.push_str(&fragment);
                }
                StreamEvent::MessageStop { reason } => {
                    finish = reason;
                    break;
                }
                StreamEvent::Ping => {}
                StreamEvent::Error {
                    error_type,
                    message,
                } => {
                    return Err(ApiError::StreamError(format!("{error_type}: {message}")).into());
                }
            }
        }

        tracing::debug!(
            target: "sceneforge.pipeline.accumulator",
            fragments = stats.fragment_count,
            chars = stats.total_chars,
            finish = ?finish,
            "stream accumulated"
        );

        Ok(AccumulatedResponse {
            text,
            finish,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForgeError;
    use crate::llm::mock_provider::{MockProvider, MockTurn};
    use crate::llm::message::Message;
    use crate::llm::provider::{ChatRequest, LlmProvider};

    fn request() -> ChatRequest {
        ChatRequest::new("mock-model", vec![Message::user("hi")])
    }

    async fn stream_for(provider: &MockProvider) -> EventStream {
        provider.chat_stream(request()).await.unwrap()
    }

    #[tokio::test]
    async fn test_collect_concatenates_fragments() {
        let provider = MockProvider::new().with_response("Here is a scene for you.");
        let stream = stream_for(&provider).await;

        let response = StreamAccumulator::collect(stream, Duration::from_secs(5), |_| Ok(()))
            .await
            .unwrap();

        assert_eq!(response.text, "Here is a scene for you.");
        assert_eq!(response.finish, Some(FinishReason::EndTurn));
        assert!(response.stats.fragment_count >= 1);
        assert_eq!(response.stats.total_chars, response.text.chars().count());
    }

    #[tokio::test]
    async fn test_collect_invokes_delta_callback() {
        let provider = MockProvider::new().with_response("streamed text");
        let stream = stream_for(&provider).await;

        let mut seen = String::new();
        StreamAccumulator::collect(stream, Duration::from_secs(5), |t| {
            seen.push_str(t);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(seen, "streamed text");
    }

    #[tokio::test]
    async fn test_collect_stall_timeout() {
        let provider = MockProvider::new().with_stalling_response(
            "this response stalls halfway through the stream",
            2,
            Duration::from_millis(200),
        );
        let stream = stream_for(&provider).await;

        let err = StreamAccumulator::collect(stream, Duration::from_millis(50), |_| Ok(()))
            .await
            .unwrap_err();

        match err {
            ForgeError::Pipeline(PipelineError::StallTimeout { .. }) => {}
            other => panic!("expected StallTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_collect_no_stall_when_fragments_keep_arriving() {
        // Total stream time exceeds the stall window, but each individual
        // gap stays under it.
        let provider = MockProvider::new().with_stalling_response(
            "slow but steady stream of fragments",
            1,
            Duration::from_millis(30),
        );
        let stream = stream_for(&provider).await;

        let response = StreamAccumulator::collect(stream, Duration::from_millis(100), |_| Ok(()))
            .await
            .unwrap();
        assert_eq!(response.text, "slow but steady stream of fragments");
    }

    #[tokio::test]
    async fn test_collect_surfaces_stream_error_event() {
        let provider = MockProvider::new().with_script(vec![MockTurn::StreamError {
            text: "partial".to_string(),
            error_type: "overloaded_error".to_string(),
            message: "server error".to_string(),
        }]);
        let stream = stream_for(&provider).await;

        let err = StreamAccumulator::collect(stream, Duration::from_secs(5), |_| Ok(()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("overloaded_error"));
    }

    #[tokio::test]
    async fn test_collect_callback_error_aborts() {
        let provider = MockProvider::new().with_response("some text");
        let stream = stream_for(&provider).await;

        let result = StreamAccumulator::collect(stream, Duration::from_secs(5), |_| {
            Err(ForgeError::InvalidInput("display failed".to_string()))
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_collect_empty_stream() {
        let provider = MockProvider::new().with_response("");
        let stream = stream_for(&provider).await;

        let response = StreamAccumulator::collect(stream, Duration::from_secs(5), |_| Ok(()))
            .await
            .unwrap();
        assert_eq!(response.text, "");
        assert_eq!(response.stats.fragment_count, 0);
    }
}
