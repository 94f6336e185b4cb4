// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Response completeness validation
//!
//! Inspects an accumulated response and classifies it as complete or
//! incomplete with a list of concrete issues. Rules live in an ordered
//! table; each fires independently and the verdict carries every tag that
//! matched. The retry policy decides what to do with the verdict.

use serde::Serialize;

use super::markers::{count_occurrences, FENCE, INSERT_CODE_CLOSE, INSERT_CODE_OPEN, LANGUAGE_FENCES};

/// A concrete completeness issue found in a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IssueTag {
    /// The response is empty (after trimming)
    Empty,
    /// The response is below the minimum acceptable length
    TooShort,
    /// No tag-block opener or fence opener anywhere in the text
    MissingDomainMarkers,
    /// Tag-block opener without its closer
    UnclosedTagBlock,
    /// More language-tagged fence openers than available closers
    UnbalancedFence,
    /// A truncation keyword or bare ellipsis appears in the text
    TruncationMarker,
    /// The text does not end like finished prose or code
    AbruptEnding,
}

/// The verdict for one response attempt
#[derive(Debug, Clone, Serialize)]
pub struct ValidationVerdict {
    pub is_complete: bool,
    pub should_retry: bool,
    pub issues: Vec<IssueTag>,
}

impl ValidationVerdict {
    fn from_issues(issues: Vec<IssueTag>) -> Self {
        let is_complete = issues.is_empty();
        Self {
            is_complete,
            should_retry: !is_complete,
            issues,
        }
    }

    pub fn has(&self, tag: IssueTag) -> bool {
        self.issues.contains(&tag)
    }
}

/// Keywords that mark a self-reported truncated response
const TRUNCATION_KEYWORDS: &[&str] = &["truncated", "incomplete", "cut off", "..."];

/// Characters an unabridged reply plausibly ends with
const ENDING_CHARS: &[char] = &['.', '!', '?', '}', ']'];

/// How many trailing characters the abrupt-ending rule inspects
const ENDING_WINDOW: usize = 10;

type RulePredicate = fn(&str, &ResponseValidator) -> bool;

/// Ordered rule table. `Empty` is handled before this table and
/// short-circuits; everything here runs on non-empty text.
const RULES: &[(IssueTag, RulePredicate)] = &[
    (IssueTag::TooShort, rule_too_short),
    (IssueTag::MissingDomainMarkers, rule_missing_domain_markers),
    (IssueTag::UnclosedTagBlock, rule_unclosed_tag_block),
    (IssueTag::UnbalancedFence, rule_unbalanced_fence),
    (IssueTag::TruncationMarker, rule_truncation_marker),
    (IssueTag::AbruptEnding, rule_abrupt_ending),
];

fn rule_too_short(text: &str, validator: &ResponseValidator) -> bool {
    text.chars().count() < validator.min_length
}

fn rule_missing_domain_markers(text: &str, _: &ResponseValidator) -> bool {
    !text.contains(INSERT_CODE_OPEN) && !text.contains(FENCE)
}

fn rule_unclosed_tag_block(text: &str, _: &ResponseValidator) -> bool {
    text.contains(INSERT_CODE_OPEN) && !text.contains(INSERT_CODE_CLOSE)
}

fn rule_unbalanced_fence(text: &str, _: &ResponseValidator) -> bool {
    let total = count_occurrences(text, FENCE);
    let lang_openers: usize = LANGUAGE_FENCES
        .iter()
        .map(|opener| count_occurrences(text, opener))
        .sum();
    lang_openers > total - lang_openers
}

fn rule_truncation_marker(text: &str, _: &ResponseValidator) -> bool {
    let lower = text.to_lowercase();
    TRUNCATION_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn rule_abrupt_ending(text: &str, _: &ResponseValidator) -> bool {
    let trimmed = text.trim_end();
    let tail: String = trimmed
        .chars()
        .rev()
        .take(ENDING_WINDOW)
        .collect();
    !tail.chars().any(|c| ENDING_CHARS.contains(&c))
}

/// Validates accumulated responses against the rule table
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    min_length: usize,
}

impl ResponseValidator {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// Classify `text` as complete or incomplete.
    pub fn validate(&self, text: &str) -> ValidationVerdict {
        if text.trim().is_empty() {
            return ValidationVerdict::from_issues(vec![IssueTag::Empty]);
        }

        let issues: Vec<IssueTag> = RULES
            .iter()
            .filter(|(_, predicate)| predicate(text, self))
            .map(|(tag, _)| *tag)
            .collect();

        if !issues.is_empty() {
            tracing::debug!(
                target: "sceneforge.pipeline.validator",
                issues = ?issues,
                len = text.len(),
                "response flagged incomplete"
            );
        }

        ValidationVerdict::from_issues(issues)
    }
}
