// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Code sanitization and auto-repair
//!
//! Normalizes an extracted payload before it is handed to the rendering
//! host: strips control markers and fence delimiters, rewrites known-wrong
//! API names, removes boilerplate the host runtime already supplies, and
//! balances the trailing edge. The transformation is total and idempotent;
//! fired corrections are reported for diagnostics only.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use super::markers::{CONTROL_MARKERS, FENCE, LANGUAGE_FENCES};

/// A correction the sanitizer applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SanitizerFix {
    StrippedControlMarkers,
    StrippedFenceDelimiters,
    ApiCorrection {
        from: &'static str,
        to: &'static str,
    },
    RemovedCanvasSetup,
    RemovedEngineConstruction,
    RemovedRenderLoop,
    RemovedResizeHook,
    CollapsedBlankLines,
    TrimmedTrailingClosers(usize),
}

/// Sanitized code plus the corrections that fired
#[derive(Debug, Clone)]
pub struct Sanitized {
    pub code: String,
    pub fixes: Vec<SanitizerFix>,
}

/// Identifiers models get wrong often enough to hard-code the repair.
/// Every right-hand side must be free of left-hand patterns so repeated
/// application is a no-op.
const API_CORRECTIONS: &[(&str, &str)] = &[
    ("Mesh-Builder", "MeshBuilder"),
    ("Scene-Loader", "SceneLoader"),
    ("Hemispheric-Light", "HemisphericLight"),
    ("Arc-Rotate-Camera", "ArcRotateCamera"),
    ("Standard-Material", "StandardMaterial"),
    ("CreateCube", "CreateBox"),
    ("CreateSquare", "CreatePlane"),
];

/// Canvas lookup/creation lines; the host supplies the canvas
static CANVAS_SETUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[^\n]*document\.(?:createElement|getElementById)\(\s*["'](?:canvas|renderCanvas)["']\s*\)[^\n]*\n?"#,
    )
    .unwrap()
});

/// Engine construction lines; the host supplies `engine`
static ENGINE_CONSTRUCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^\n]*new\s+(?:BABYLON\.)?Engine\s*\([^\n]*\n?").unwrap()
});

/// Render loop registration; the host drives the loop
static RENDER_LOOP_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][\w$]*\.runRenderLoop\s*\(").unwrap());

/// Window resize hook; the host owns resizing
static RESIZE_HOOK_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"window\.addEventListener\(\s*["']resize["']"#).unwrap());

/// Three or more consecutive newlines collapse to one blank line
static EXCESS_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Remove whole statements starting at `pattern` through the balanced
/// closing parenthesis plus a trailing semicolon. The statement's line is
/// removed from its start so no indentation is left behind.
fn remove_call_statements(code: &str, pattern: &Regex) -> (String, usize) {
    let mut result = code.to_string();
    let mut removed = 0;

    loop {
        let Some((match_start, match_end)) = pattern.find(&result).map(|m| (m.start(), m.end()))
        else {
            break;
        };

        let line_start = result[..match_start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let mut depth = result[match_start..match_end].matches('(').count() as i32
            - result[match_start..match_end].matches(')').count() as i32;

        let mut end = match_end;
        {
            let bytes = result.as_bytes();
            while end < bytes.len() && depth > 0 {
                match bytes[end] {
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
                end += 1;
            }
            while end < bytes.len() && matches!(bytes[end], b';' | b' ' | b'\t') {
                end += 1;
            }
            if end < bytes.len() && bytes[end] == b'\n' {
                end += 1;
            }
        }

        result.replace_range(line_start..end, "");
        removed += 1;
    }

    (result, removed)
}

/// Drop trailing closers whose matching-open count is short.
fn trim_orphan_closers(code: &str) -> (String, usize) {
    let mut result = code.trim_end().to_string();
    let mut removed = 0;

    loop {
        let Some(last) = result.chars().last() else {
            break;
        };
        let open = match last {
            ')' => '(',
            ']' => '[',
            '}' => '{',
            _ => break,
        };
        let opens = result.matches(open).count();
        let closes = result.matches(last).count();
        if closes <= opens {
            break;
        }
        result.pop();
        let trimmed_len = result.trim_end().len();
        result.truncate(trimmed_len);
        removed += 1;
    }

    (result, removed)
}

/// Normalizes extracted payloads for host injection
pub struct CodeSanitizer;

impl CodeSanitizer {
    /// Sanitize `payload`. Total: never fails, returns at worst an empty
    /// string.
    pub fn sanitize(payload: &str) -> Sanitized {
        let mut fixes = Vec::new();
        let mut code = payload.to_string();

        // 1. Control markers, then fence delimiters (language-tagged first
        // so "```javascript" never degrades to a stray "```js"). Runs to a
        // fixpoint: removing one token can reassemble another from split
        // pieces, and no marker may survive.
        let mut stripped_markers = false;
        let mut stripped_fences = false;
        loop {
            let before = code.len();
            for marker in CONTROL_MARKERS {
                code = code.replace(marker, "");
            }
            if code.len() != before {
                stripped_markers = true;
            }

            let before_fences = code.len();
            for fence in LANGUAGE_FENCES {
                code = code.replace(fence, "");
            }
            code = code.replace(FENCE, "");
            if code.len() != before_fences {
                stripped_fences = true;
            }

            if code.len() == before {
                break;
            }
        }
        if stripped_markers {
            fixes.push(SanitizerFix::StrippedControlMarkers);
        }
        if stripped_fences {
            fixes.push(SanitizerFix::StrippedFenceDelimiters);
        }

        // 2. API-name repairs.
        for &(from, to) in API_CORRECTIONS {
            if code.contains(from) {
                code = code.replace(from, to);
                fixes.push(SanitizerFix::ApiCorrection { from, to });
            }
        }

        // 3. Host-conflicting boilerplate.
        if CANVAS_SETUP.is_match(&code) {
            code = CANVAS_SETUP.replace_all(&code, "").into_owned();
            fixes.push(SanitizerFix::RemovedCanvasSetup);
        }
        if ENGINE_CONSTRUCTION.is_match(&code) {
            code = ENGINE_CONSTRUCTION.replace_all(&code, "").into_owned();
            fixes.push(SanitizerFix::RemovedEngineConstruction);
        }
        let (next, removed) = remove_call_statements(&code, &RENDER_LOOP_CALL);
        if removed > 0 {
            code = next;
            fixes.push(SanitizerFix::RemovedRenderLoop);
        }
        let (next, removed) = remove_call_statements(&code, &RESIZE_HOOK_CALL);
        if removed > 0 {
            code = next;
            fixes.push(SanitizerFix::RemovedResizeHook);
        }

        // 4. Blank-line collapse.
        if EXCESS_BLANK_LINES.is_match(&code) {
            code = EXCESS_BLANK_LINES.replace_all(&code, "\n\n").into_owned();
            fixes.push(SanitizerFix::CollapsedBlankLines);
        }

        // 5. Trailing orphaned closers.
        let (next, removed) = trim_orphan_closers(&code);
        code = next;
        if removed > 0 {
            fixes.push(SanitizerFix::TrimmedTrailingClosers(removed));
        }

        let code = code.trim().to_string();

        if !fixes.is_empty() {
            tracing::debug!(
                target: "sceneforge.pipeline.sanitizer",
                fixes = ?fixes,
                out_len = code.len(),
                "sanitizer corrections applied"
            );
        }

        Sanitized { code, fixes }
    }
}
