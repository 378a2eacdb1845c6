//! Console shell for the spoken-dialog agent.
//!
//! Reads user utterances line by line, runs each through the
//! supervisor, and plays the reply while printing it. The thinnest
//! possible front end: capture, VAD, and speech recognition are
//! expected to live in front of this in a real deployment.
//!
//! Exit codes: 0 normal, 1 configuration error, 2 unrecoverable
//! synthesizer/chat failure, 130 user interrupt.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use brio::audio::SpeakerPlayer;
use brio::config::Config;
use brio::error::AgentError;
use brio::llm::OpenAiChatClient;
use brio::session::Supervisor;
use brio::synth::build_synthesizer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("fatal: {e:#}");
            2
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "brio.toml".to_owned());
    let config = match Config::load(Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return Ok(1);
        }
    };
    if let Err(e) = config.validate() {
        error!("{e}");
        return Ok(1);
    }

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("building HTTP client")?;

    let chat = Arc::new(OpenAiChatClient::new(config.chat.clone(), client.clone()));
    let synthesizer = match build_synthesizer(&config.tts, client) {
        Ok(synthesizer) => synthesizer,
        Err(e @ AgentError::Config(_)) => {
            error!("{e}");
            return Ok(1);
        }
        Err(e) => {
            error!("{e}");
            return Ok(2);
        }
    };
    let player = match SpeakerPlayer::new() {
        Ok(player) => Arc::new(player),
        Err(e) => {
            error!("{e}");
            return Ok(2);
        }
    };

    let mut supervisor = match Supervisor::start(config, chat, synthesizer, player).await {
        Ok(supervisor) => supervisor,
        Err(e @ AgentError::Config(_)) => {
            error!("{e}");
            return Ok(1);
        }
        Err(e) => {
            error!("{e}");
            return Ok(2);
        }
    };

    println!("brio ready. Type a message, or /quit to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                supervisor.shutdown().await?;
                return Ok(130);
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text == "/quit" {
                    break;
                }
                let summary = supervisor.run_turn(text).await;
                if !summary.assistant_text.is_empty() {
                    println!("{}", summary.assistant_text.trim());
                }
                if summary.session_ended {
                    break;
                }
            }
        }
    }

    supervisor.shutdown().await?;
    Ok(0)
}
