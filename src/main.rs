use anyhow::{Context, Result};
use clap::Parser;
use loqa_agent::packet::{UserAudio, UserText};
use loqa_agent::{
    AudioFile, Collaborators, Config, ConversationSession, NatsClient, NatsLlmExecutor,
    NatsNotifier, NatsSpeechToText, SessionConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Replay a caller through a live conversation session
#[derive(Parser, Debug)]
#[command(name = "loqa-agent", version)]
struct Args {
    /// Config file, without extension
    #[arg(long, default_value = "config/loqa-agent")]
    config: String,

    /// 16-bit PCM WAV file played as caller audio
    #[arg(long)]
    input: Option<PathBuf>,

    /// Typed caller lines, sent in order after the audio
    #[arg(long)]
    text: Vec<String>,

    /// Session id; generated when omitted
    #[arg(long)]
    session: Option<String>,

    /// Seconds to wait for the agent after the last input
    #[arg(long, default_value_t = 5)]
    settle_secs: u64,
}

/// Caller audio is replayed in real time in frames of this length
const FRAME_MS: u64 = 20;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Loqa Agent v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let session_id = args
        .session
        .clone()
        .unwrap_or_else(|| format!("call-{}", uuid::Uuid::new_v4()));
    let session_config = SessionConfig::from_config(&cfg, session_id.clone());
    let user_audio = session_config.user_audio.unwrap_or_default();

    let nats = Arc::new(NatsClient::connect(&cfg.service.nats_url, session_id).await?);
    let stt = Arc::new(NatsSpeechToText::new(Arc::clone(&nats), user_audio));
    let llm = Arc::new(NatsLlmExecutor::new(Arc::clone(&nats)));
    let collaborators = Collaborators::new(llm.clone(), Arc::new(NatsNotifier::new(Arc::clone(&nats))))
        .with_speech_to_text(stt.clone());

    let session = ConversationSession::new(session_config, collaborators);
    let listeners = CancellationToken::new();
    let transcripts = stt.listen(session.sender(), listeners.clone()).await?;
    let generations = llm.listen(session.sender(), listeners.clone()).await?;

    session.start().await?;

    if let Some(path) = &args.input {
        let audio = AudioFile::open(path).context("Failed to load caller audio")?;
        if audio.config() != user_audio {
            anyhow::bail!(
                "Caller audio is {}Hz {}ch, session expects {}Hz {}ch",
                audio.sample_rate,
                audio.channels,
                user_audio.sample_rate,
                user_audio.channels
            );
        }

        info!("Replaying {:.1}s of caller audio", audio.duration_seconds);
        let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_MS));
        for frame in audio.frames(FRAME_MS) {
            ticker.tick().await;
            session.dispatch(UserAudio {
                context_id: session.messaging().turn_id(),
                audio: frame,
                noise_reduced: false,
            });
        }
    }

    for line in &args.text {
        session.dispatch(UserText {
            context_id: session.messaging().turn_id(),
            text: line.clone(),
        });
    }

    tokio::time::sleep(Duration::from_secs(args.settle_secs)).await;

    let stats = session.stop().await?;
    listeners.cancel();
    tokio::join!(
        join_listener("Transcript", transcripts),
        join_listener("Generation", generations)
    );
    nats.close().await?;

    info!("Session stats: {}", serde_json::to_string(&stats)?);

    Ok(())
}

/// Wait for a NATS listener to finish; false if it panicked
async fn join_listener(name: &str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!("{} listener panicked: {}", name, e);
            false
        }
    }
}
