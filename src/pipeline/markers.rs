// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Control markers and fence literals
//!
//! The exact tokens the validator, extractor, and sanitizer key on. The
//! model is prompted to wrap scene code in the tag block and append the run
//! marker when the scene should start immediately.

/// Opens a tagged code payload in the model's reply
pub const INSERT_CODE_OPEN: &str = "[INSERT_CODE]";

/// Closes a tagged code payload
pub const INSERT_CODE_CLOSE: &str = "[/INSERT_CODE]";

/// Requests that the host run the scene after injection
pub const RUN_SCENE: &str = "[RUN_SCENE]";

/// Bare fence delimiter
pub const FENCE: &str = "```";

/// Language-tagged fence openers, longest-prefix first so that replacing
/// "```javascript" never leaves a dangling "```js" behind
pub const LANGUAGE_FENCES: &[&str] = &["```javascript", "```typescript", "```js", "```ts"];

/// All control markers that must never survive sanitization
pub const CONTROL_MARKERS: &[&str] = &[INSERT_CODE_OPEN, INSERT_CODE_CLOSE, RUN_SCENE];

/// Count non-overlapping occurrences of `needle` in `text`.
pub fn count_occurrences(text: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    text.match_indices(needle).count()
}

/// Remove all control markers from `text` (fences are left alone; chat
/// surfaces render fenced code themselves).
pub fn strip_control_markers(text: &str) -> String {
    let mut out = text.to_string();
    for marker in CONTROL_MARKERS {
        out = out.replace(marker, "");
    }
    out
}

/// A fence opener located in text: where the opener starts and where the
/// payload after the language hint begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceOpen {
    /// Byte offset of the fence delimiter
    pub start: usize,
    /// Byte offset where the fenced content begins (after the language hint
    /// line, or directly after the delimiter when no newline follows)
    pub content_start: usize,
}

/// Find the first fence opener at or after `from`. The rest of the opener's
/// line is treated as a language hint and skipped.
pub fn find_fence_open(text: &str, from: usize) -> Option<FenceOpen> {
    let rel = text.get(from..)?.find(FENCE)?;
    let start = from + rel;
    let after_delim = start + FENCE.len();
    let content_start = match text[after_delim..].find('\n') {
        Some(nl) => after_delim + nl + 1,
        None => text.len(),
    };
    Some(FenceOpen {
        start,
        content_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_occurrences() {
        assert_eq!(count_occurrences("``` a ``` b ```", "```"), 3);
        assert_eq!(count_occurrences("no fences here", "```"), 0);
        assert_eq!(count_occurrences("abc", ""), 0);
    }

    #[test]
    fn test_strip_control_markers() {
        let text = "[INSERT_CODE]code[/INSERT_CODE]\n[RUN_SCENE]";
        assert_eq!(strip_control_markers(text), "code\n");
    }

    #[test]
    fn test_strip_control_markers_no_markers() {
        assert_eq!(strip_control_markers("plain text"), "plain text");
    }

    #[test]
    fn test_find_fence_open_with_language() {
        let text = "intro\n```javascript\nconst a = 1;\n```";
        let open = find_fence_open(text, 0).unwrap();
        assert_eq!(open.start, 6);
        assert_eq!(&text[open.content_start..open.content_start + 5], "const");
    }

    #[test]
    fn test_find_fence_open_bare() {
        let text = "```\ncode\n```";
        let open = find_fence_open(text, 0).unwrap();
        assert_eq!(open.start, 0);
        assert_eq!(&text[open.content_start..open.content_start + 4], "code");
    }

    #[test]
    fn test_find_fence_open_from_offset_skips_earlier_fence() {
        let text = "```\na\n```\ntail ```js\nb\n```";
        let first = find_fence_open(text, 0).unwrap();
        let second = find_fence_open(text, first.content_start).unwrap();
        assert!(second.start > first.start);
    }

    #[test]
    fn test_find_fence_open_none() {
        assert_eq!(find_fence_open("no fences", 0), None);
    }

    #[test]
    fn test_find_fence_open_at_end_of_text() {
        let open = find_fence_open("abc```", 0).unwrap();
        assert_eq!(open.content_start, 6);
    }

    #[test]
    fn test_language_fence_order_prevents_partial_strip() {
        // "```javascript" must sort before "```js" so sequential replacement
        // never turns the former into a stray suffix.
        let js_full = LANGUAGE_FENCES.iter().position(|f| *f == "```javascript");
        let js_short = LANGUAGE_FENCES.iter().position(|f| *f == "```js");
        assert!(js_full < js_short);
    }
}
