// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Multi-strategy code extraction
//!
//! Pulls the scene-code payload out of a model reply. Strategies live in a
//! fixed-priority table and the first match wins, so ordering is explicit
//! and each strategy is testable in isolation. Extraction never mutates the
//! source text; payloads are copies.

use serde::Serialize;

use super::markers::{find_fence_open, FENCE, INSERT_CODE_CLOSE, INSERT_CODE_OPEN};

/// How strict the matched strategy was. Diagnostics only; the pipeline
/// behaves the same at every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    Strict,
    Lenient,
    UltraPermissive,
}

/// Which strategy produced the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StrategyId {
    /// Tag block wrapping a properly closed fence
    TaggedFenced,
    /// Tag block whose fence never closes; the tag closer stands in
    TaggedOpenFence,
    /// First fenced block anywhere that looks like scene code
    GenericFenced,
    /// Any fenced block with generic code indicators
    UltraPermissive,
}

/// A successful extraction
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    pub strategy: StrategyId,
    pub payload: String,
    pub confidence: Confidence,
}

/// Identifiers that mark a fenced block as 3D-scene code
const SCENE_KEYWORDS: &[&str] = &["scene", "camera", "light", "mesh", "engine", "canvas"];

/// Explicit scene-constructor identifier, matched case-sensitively
const SCENE_CONSTRUCTOR: &str = "new BABYLON.Scene";

/// Generic code indicators for the last-resort strategy
const CODE_INDICATORS: &[&str] = &["const", "function", "var", "let", "=", "{", ";"];

type StrategyFn = fn(&str) -> Option<String>;

/// Fixed priority order; first success wins.
const STRATEGIES: &[(StrategyId, Confidence, StrategyFn)] = &[
    (StrategyId::TaggedFenced, Confidence::Strict, extract_tagged_fenced),
    (
        StrategyId::TaggedOpenFence,
        Confidence::Strict,
        extract_tagged_open_fence,
    ),
    (
        StrategyId::GenericFenced,
        Confidence::Lenient,
        extract_generic_fenced,
    ),
    (
        StrategyId::UltraPermissive,
        Confidence::UltraPermissive,
        extract_ultra_permissive,
    ),
];

/// The tag block bounds, if both markers are present in order.
fn tag_block(text: &str) -> Option<&str> {
    let open = text.find(INSERT_CODE_OPEN)?;
    let content_start = open + INSERT_CODE_OPEN.len();
    let close_rel = text[content_start..].find(INSERT_CODE_CLOSE)?;
    Some(&text[content_start..content_start + close_rel])
}

/// Strategy 1: tag block wrapping a fence that closes before the tag does.
fn extract_tagged_fenced(text: &str) -> Option<String> {
    let block = tag_block(text)?;
    let open = find_fence_open(block, 0)?;
    let close_rel = block.get(open.content_start..)?.find(FENCE)?;
    let payload = &block[open.content_start..open.content_start + close_rel];
    Some(payload.trim().to_string())
}

/// Strategy 2: fence opened inside the tag block but never closed. A known
/// model quirk omits the closing fence; the tag closer substitutes for it.
fn extract_tagged_open_fence(text: &str) -> Option<String> {
    let block = tag_block(text)?;
    let open = find_fence_open(block, 0)?;
    if block[open.content_start..].contains(FENCE) {
        return None;
    }
    Some(block[open.content_start..].trim().to_string())
}

/// Every fenced payload in the text, in order. A final unclosed fence
/// yields the remainder of the text.
fn fenced_payloads(text: &str) -> Vec<&str> {
    let mut payloads = Vec::new();
    let mut cursor = 0;
    while let Some(open) = find_fence_open(text, cursor) {
        match text.get(open.content_start..).and_then(|rest| rest.find(FENCE)) {
            Some(close_rel) => {
                payloads.push(&text[open.content_start..open.content_start + close_rel]);
                cursor = open.content_start + close_rel + FENCE.len();
            }
            None => {
                payloads.push(&text[open.content_start..]);
                break;
            }
        }
    }
    payloads
}

fn looks_like_scene_code(payload: &str) -> bool {
    if payload.contains(SCENE_CONSTRUCTOR) {
        return true;
    }
    let lower = payload.to_lowercase();
    SCENE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn looks_like_any_code(payload: &str) -> bool {
    CODE_INDICATORS.iter().any(|ind| payload.contains(ind))
}

/// Strategy 3: first fenced block anywhere that passes the scene heuristic.
fn extract_generic_fenced(text: &str) -> Option<String> {
    fenced_payloads(text)
        .into_iter()
        .find(|p| looks_like_scene_code(p))
        .map(|p| p.trim().to_string())
}

/// Strategy 4: any fenced block with generic code indicators. Reserved for
/// providers that omit conventional structure entirely.
fn extract_ultra_permissive(text: &str) -> Option<String> {
    fenced_payloads(text)
        .into_iter()
        .find(|p| looks_like_any_code(p))
        .map(|p| p.trim().to_string())
}

/// Applies the strategy table to validated response text
pub struct CodeExtractor;

impl CodeExtractor {
    /// Try every strategy in priority order; first non-empty payload wins.
    pub fn extract(text: &str) -> Option<ExtractionAttempt> {
        for (strategy, confidence, extract) in STRATEGIES {
            if let Some(payload) = extract(text) {
                if payload.is_empty() {
                    continue;
                }
                tracing::debug!(
                    target: "sceneforge.pipeline.extractor",
                    strategy = ?strategy,
                    confidence = ?confidence,
                    payload_len = payload.len(),
                    "extraction strategy matched"
                );
                return Some(ExtractionAttempt {
                    strategy: *strategy,
                    payload,
                    confidence: *confidence,
                });
            }
        }
        tracing::debug!(
            target: "sceneforge.pipeline.extractor",
            "no extraction strategy matched"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_fenced_block() {
        let text = "Here you go!\n[INSERT_CODE]```javascript\nconst scene = new BABYLON.Scene(engine);\n```\n[/INSERT_CODE]\n[RUN_SCENE]";
        let attempt = CodeExtractor::extract(text).unwrap();
        assert_eq!(attempt.strategy, StrategyId::TaggedFenced);
        assert_eq!(attempt.confidence, Confidence::Strict);
        assert_eq!(attempt.payload, "const scene = new BABYLON.Scene(engine);");
    }

    #[test]
    fn test_tagged_open_fence_block() {
        let text = "[INSERT_CODE]```javascript\nconst scene = new BABYLON.Scene(engine);\nscene.clearColor = color;\n[/INSERT_CODE]";
        let attempt = CodeExtractor::extract(text).unwrap();
        assert_eq!(attempt.strategy, StrategyId::TaggedOpenFence);
        assert_eq!(attempt.confidence, Confidence::Strict);
        assert!(attempt.payload.contains("clearColor"));
        assert!(!attempt.payload.contains("[/INSERT_CODE]"));
    }

    #[test]
    fn test_generic_fenced_block_with_scene_keyword() {
        let text = "No tags here, just a block:\n```js\nconst camera = new BABYLON.ArcRotateCamera(\"c\", 0, 0, 10, target, scene);\n```";
        let attempt = CodeExtractor::extract(text).unwrap();
        assert_eq!(attempt.strategy, StrategyId::GenericFenced);
        assert_eq!(attempt.confidence, Confidence::Lenient);
        assert!(attempt.payload.contains("ArcRotateCamera"));
    }

    #[test]
    fn test_generic_fenced_skips_non_scene_blocks() {
        let text = "Usage:\n```\nnpm install babylon-runtime-helper-kit\n```\nThen:\n```js\nconst box = BABYLON.MeshBuilder.CreateBox(\"b\", {}, scene);\n```";
        let attempt = CodeExtractor::extract(text).unwrap();
        assert_eq!(attempt.strategy, StrategyId::GenericFenced);
        assert!(attempt.payload.contains("CreateBox"));
    }

    #[test]
    fn test_ultra_permissive_fallback() {
        let text = "Some code:\n```\nconst answer = 42;\n```";
        let attempt = CodeExtractor::extract(text).unwrap();
        assert_eq!(attempt.strategy, StrategyId::UltraPermissive);
        assert_eq!(attempt.confidence, Confidence::UltraPermissive);
        assert_eq!(attempt.payload, "const answer = 42;");
    }

    #[test]
    fn test_strategy_order_is_deterministic() {
        // Text matching both strategy 1 and strategy 3: strategy 1 wins.
        let text = "```js\nconst distraction = new BABYLON.Scene(engine);\n```\n[INSERT_CODE]```javascript\nconst scene = new BABYLON.Scene(engine);\n```\n[/INSERT_CODE]";
        let attempt = CodeExtractor::extract(text).unwrap();
        assert_eq!(attempt.strategy, StrategyId::TaggedFenced);
        assert!(attempt.payload.contains("const scene"));
    }

    #[test]
    fn test_no_code_returns_none() {
        let text = "I would be happy to help, but could you describe the shape first?";
        assert!(CodeExtractor::extract(text).is_none());
    }

    #[test]
    fn test_fence_without_code_indicators_returns_none() {
        let text = "```\njust prose inside a block\n```";
        assert!(CodeExtractor::extract(text).is_none());
    }

    #[test]
    fn test_unclosed_generic_fence_yields_remainder() {
        let text = "Truncated reply:\n```javascript\nconst light = new BABYLON.HemisphericLight(\"h\", up, scene);";
        let attempt = CodeExtractor::extract(text).unwrap();
        assert_eq!(attempt.strategy, StrategyId::GenericFenced);
        assert!(attempt.payload.contains("HemisphericLight"));
    }

    #[test]
    fn test_tag_block_without_fence_falls_through() {
        // No fence inside the tags, but a scene block elsewhere.
        let text = "[INSERT_CODE]plain text[/INSERT_CODE]\n```js\nconst mesh = BABYLON.MeshBuilder.CreateSphere(\"s\", {}, scene);\n```";
        let attempt = CodeExtractor::extract(text).unwrap();
        assert_eq!(attempt.strategy, StrategyId::GenericFenced);
    }

    #[test]
    fn test_extraction_does_not_mutate_input() {
        let text = "[INSERT_CODE]```js\nconst scene = new BABYLON.Scene(engine);\n```\n[/INSERT_CODE]";
        let before = text.to_string();
        CodeExtractor::extract(text);
        assert_eq!(text, before);
    }

    #[test]
    fn test_fenced_payloads_multiple_blocks() {
        let text = "```\none\n```\nmiddle\n```\ntwo\n```";
        let payloads = fenced_payloads(text);
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].trim(), "one");
        assert_eq!(payloads[1].trim(), "two");
    }

    #[test]
    fn test_scene_constructor_matches_case_sensitively() {
        assert!(looks_like_scene_code("x = new BABYLON.Scene(e)"));
        assert!(!looks_like_scene_code("nothing relevant"));
    }
}
