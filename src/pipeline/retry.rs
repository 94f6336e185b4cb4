// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Retry decisions for model calls
//!
//! Two trigger paths: a validation verdict that recommends another attempt,
//! and a transport error from the provider. Both are bounded by the per-turn
//! attempt budget carried in `RetryState`. Client errors are never retried.

use std::time::Duration;

use crate::config::ResilienceConfig;
use crate::error::{ApiError, ForgeError, PipelineError};
use crate::pipeline::validator::{IssueTag, ValidationVerdict};

/// Per-turn retry budget. Created at turn start, discarded at turn end.
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    /// Attempts left after the current one
    pub attempts_remaining: u32,
    /// Delay used for the most recent retry, if any
    pub last_delay: Option<Duration>,
}

/// Outcome of a retry decision
#[derive(Debug, Clone, Copy)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
    pub state: RetryState,
}

/// Classification of a transport error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportClass {
    /// Caller-side problem, never retried
    Client,
    /// Transient network or server condition, retried while budget remains
    Retryable,
    /// Unrecognized, treated as fatal
    Unknown,
}

/// Substrings identifying caller-side errors
const CLIENT_ERROR_MARKERS: &[&str] = &[
    "400",
    "401",
    "403",
    "404",
    "invalid",
    "unauthorized",
    "forbidden",
];

/// Substrings identifying transient conditions
const RETRYABLE_ERROR_MARKERS: &[&str] = &[
    "timeout",
    "network",
    "connection failed",
    "server error",
    "temporarily unavailable",
    "rate limit",
];

/// Retry policy for one pipeline turn
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.base_delay_secs),
        }
    }

    /// Fresh budget for a new turn.
    pub fn initial_state(&self) -> RetryState {
        RetryState {
            attempts_remaining: self.max_retries,
            last_delay: None,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Linear backoff: base delay on the first retry, doubled-by-addition on
    /// each one after (2 s, 4 s, 6 s, ...).
    fn backoff_delay(&self, state: &RetryState) -> Duration {
        let used = self.max_retries.saturating_sub(state.attempts_remaining);
        self.base_delay * (used + 1)
    }

    /// Decide whether to re-issue the request after a validation verdict.
    ///
    /// Empty responses always use the fixed base delay; other incomplete
    /// verdicts follow the linear schedule.
    pub fn decide_validation(&self, verdict: &ValidationVerdict, state: RetryState) -> RetryDecision {
        if !verdict.should_retry || state.attempts_remaining == 0 {
            return RetryDecision {
                retry: false,
                delay: Duration::ZERO,
                state,
            };
        }

        let delay = if verdict.has(IssueTag::Empty) {
            self.base_delay
        } else {
            self.backoff_delay(&state)
        };

        RetryDecision {
            retry: true,
            delay,
            state: RetryState {
                attempts_remaining: state.attempts_remaining - 1,
                last_delay: Some(delay),
            },
        }
    }

    /// Decide whether to re-issue the request after a transport error.
    pub fn decide_transport(&self, error: &ForgeError, state: RetryState) -> RetryDecision {
        let class = classify_transport(error);
        let retry = class == TransportClass::Retryable && state.attempts_remaining > 0;

        if !retry {
            return RetryDecision {
                retry: false,
                delay: Duration::ZERO,
                state,
            };
        }

        let delay = self.backoff_delay(&state);
        RetryDecision {
            retry: true,
            delay,
            state: RetryState {
                attempts_remaining: state.attempts_remaining - 1,
                last_delay: Some(delay),
            },
        }
    }
}

/// Classify a transport error.
///
/// Stall and request timeouts are retryable by construction; everything
/// else is classified from the error message, client markers first so an
/// error mentioning both (e.g. "invalid ... network") is never retried.
pub fn classify_transport(error: &ForgeError) -> TransportClass {
    match error {
        ForgeError::Pipeline(PipelineError::StallTimeout { .. }) => return TransportClass::Retryable,
        ForgeError::Api(ApiError::Timeout) => return TransportClass::Retryable,
        _ => {}
    }

    let message = error.to_string().to_lowercase();
    if CLIENT_ERROR_MARKERS.iter().any(|m| message.contains(m)) {
        TransportClass::Client
    } else if RETRYABLE_ERROR_MARKERS.iter().any(|m| message.contains(m)) {
        TransportClass::Retryable
    } else {
        TransportClass::Unknown
    }
}
