// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! SceneForge CLI
//!
//! Replays captured model replies through the response pipeline. This is
//! the operational debugging surface: feed it a transcript of what a
//! provider actually sent and see what the validator, extractor, and
//! sanitizer make of it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use sceneforge::config::Settings;
use sceneforge::error::Result;
use sceneforge::llm::message::{Conversation, Message};
use sceneforge::llm::mock_provider::MockProvider;
use sceneforge::llm::provider::ChatRequest;
use sceneforge::pipeline::{
    CodeExtractor, CodeSanitizer, ResponsePipeline, ResponseValidator, TurnObserver,
};

/// SceneForge - response pipeline for LLM-generated 3D scenes
#[derive(Parser, Debug)]
#[command(name = "sceneforge")]
#[command(version, about = "Inspect and replay LLM scene-code responses")]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON instead of a report
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a captured reply for completeness
    Validate { file: PathBuf },

    /// Run the extraction strategies over a captured reply
    Extract { file: PathBuf },

    /// Sanitize a raw code payload
    Sanitize { file: PathBuf },

    /// Replay a captured reply through the full pipeline
    Replay { file: PathBuf },
}

/// Observer that prints pipeline output to stdout
struct StdoutObserver;

impl TurnObserver for StdoutObserver {
    fn on_retry(&mut self, delay: Duration, attempt: u32, max_retries: u32) -> Result<()> {
        eprintln!(
            "retrying (attempt {attempt}/{max_retries}) in {:.1}s",
            delay.as_secs_f64()
        );
        Ok(())
    }

    fn on_user_visible_text(&mut self, text: &str) -> Result<()> {
        println!("--- chat text ---\n{text}");
        Ok(())
    }

    fn on_code_ready(&mut self, code: &str) -> Result<()> {
        println!("--- code ---\n{code}");
        Ok(())
    }

    fn on_run_requested(&mut self) -> Result<()> {
        println!("--- run requested ---");
        Ok(())
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

fn cmd_validate(settings: &Settings, text: &str, json: bool) -> Result<()> {
    let validator = ResponseValidator::new(settings.pipeline.min_response_length);
    let verdict = validator.validate(text);
    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        println!("complete:     {}", verdict.is_complete);
        println!("should_retry: {}", verdict.should_retry);
        println!("issues:       {:?}", verdict.issues);
    }
    Ok(())
}

fn cmd_extract(text: &str, json: bool) -> Result<()> {
    match CodeExtractor::extract(text) {
        Some(attempt) => {
            if json {
                let report = serde_json::json!({
                    "strategy": attempt.strategy,
                    "confidence": attempt.confidence,
                    "payload": attempt.payload,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("strategy:   {:?}", attempt.strategy);
                println!("confidence: {:?}", attempt.confidence);
                println!("--- payload ---\n{}", attempt.payload);
            }
        }
        None => {
            if json {
                println!("null");
            } else {
                println!("no extraction strategy matched");
            }
        }
    }
    Ok(())
}

fn cmd_sanitize(payload: &str, json: bool) -> Result<()> {
    let sanitized = CodeSanitizer::sanitize(payload);
    if json {
        let report = serde_json::json!({
            "code": sanitized.code,
            "fixes": sanitized.fixes,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if !sanitized.fixes.is_empty() {
            eprintln!("fixes: {:?}", sanitized.fixes);
        }
        println!("{}", sanitized.code);
    }
    Ok(())
}

async fn cmd_replay(settings: Settings, text: String, json: bool) -> Result<()> {
    let provider = MockProvider::with_name("replay").with_response(text);
    let mut pipeline = ResponsePipeline::new(Arc::new(provider), settings);

    let mut conversation = Conversation::new();
    conversation.push(Message::user("(captured transcript)"));
    let request = ChatRequest::from_conversation("replay", &conversation);

    let mut observer = StdoutObserver;
    let result = pipeline.run_turn(request, &mut observer).await?;

    if json {
        let report = serde_json::json!({
            "turn_id": result.turn_id,
            "user_visible_text": result.user_visible_text,
            "extracted_code": result.extracted_code,
            "confidence": result.confidence,
            "run_requested": result.run_requested,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("{}", error.user_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;

    match &cli.command {
        Commands::Validate { file } => {
            let text = std::fs::read_to_string(file)?;
            cmd_validate(&settings, &text, cli.json)
        }
        Commands::Extract { file } => {
            let text = std::fs::read_to_string(file)?;
            cmd_extract(&text, cli.json)
        }
        Commands::Sanitize { file } => {
            let payload = std::fs::read_to_string(file)?;
            cmd_sanitize(&payload, cli.json)
        }
        Commands::Replay { file } => {
            let text = std::fs::read_to_string(file)?;
            cmd_replay(settings, text, cli.json).await
        }
    }
}
