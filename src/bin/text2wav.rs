use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use qwentts::config::{Cli, Config};
use qwentts::entity::{QwenTtsEntity, DEFAULT_LANGUAGE};
use qwentts::setup::check_health;
use qwentts::synthesis::{QwenTtsClient, TtsOptions};
use qwentts::version;
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, error, info, level_filters::LevelFilter};

/// Convert text to a WAV file using a Qwen voice-cloning TTS server
#[derive(Parser, Debug)]
#[command(
    author,
    version = version::get_short_version(),
    long_version = version::get_version_info(),
    about,
    long_about = None
)]
struct Args {
    /// Input text to convert to speech
    #[arg(value_name = "TEXT", required_unless_present_any = ["check_health", "list_voices"])]
    input_text: Option<String>,

    /// Path to output WAV file
    #[arg(value_name = "OUTPUT", default_value = "output.wav")]
    output_file: PathBuf,

    /// Language tag passed to the server
    #[arg(short = 'L', long, default_value = DEFAULT_LANGUAGE)]
    language: String,

    /// Only probe /health and exit
    #[arg(long)]
    check_health: bool,

    /// Print the voices saved on the server and exit
    #[arg(long)]
    list_voices: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    cli: Cli,
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();
    dotenv().ok();
    let args = Args::parse();

    let mut config = match args.cli.conf.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_cli(&args.cli);

    let mut log_fmt = tracing_subscriber::fmt();
    if args.verbose {
        log_fmt = log_fmt.with_max_level(LevelFilter::DEBUG);
    } else if let Some(ref level) = config.log_level {
        if let Ok(lv) = level.as_str().parse::<LevelFilter>() {
            log_fmt = log_fmt.with_max_level(lv);
        }
    }
    let _guard = if let Some(ref log_file) = config.log_file {
        let file = File::create(log_file)
            .with_context(|| format!("Failed to create log file {}", log_file))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        log_fmt.with_writer(non_blocking).try_init().ok();
        Some(guard)
    } else {
        log_fmt.try_init().ok();
        None
    };

    let http = reqwest::Client::builder()
        .user_agent(version::get_useragent())
        .build()
        .context("Failed to build HTTP client")?;
    let timeouts = config.timeouts();

    if args.check_health {
        let healthy = check_health(&http, &config.tts.base_url, timeouts.health).await;
        println!(
            "{}: {}",
            config.tts.base_url,
            if healthy { "ok" } else { "unavailable" }
        );
        if !healthy {
            return Err(anyhow::anyhow!("TTS server is not healthy"));
        }
        return Ok(());
    }

    let client = QwenTtsClient::new(config.tts, http)
        .context("Invalid TTS configuration")?
        .with_timeouts(timeouts);
    debug!(?timeouts, "created TTS client");

    if args.list_voices {
        for voice in client.list_voices().await? {
            println!(
                "{}\t{}",
                voice.voice_id.unwrap_or_default(),
                voice.name.unwrap_or_default()
            );
        }
        return Ok(());
    }

    let text = args.input_text.unwrap_or_default();
    info!("Converting text to speech: '{}'", text);
    info!("Output file: {}", args.output_file.display());

    let entity = QwenTtsEntity::from_qwen(client);
    let audio = match entity
        .get_tts_audio(&text, &args.language, &TtsOptions::new())
        .await
    {
        Ok(audio) => audio,
        Err(e) => {
            error!("Failed to synthesize text: {}", e);
            return Err(anyhow::anyhow!("Failed to synthesize text: {}", e));
        }
    };

    tokio::fs::write(&args.output_file, &audio.data)
        .await
        .with_context(|| {
            format!(
                "Failed to write output file: {}",
                args.output_file.display()
            )
        })?;
    info!(
        "Wrote {} bytes of {} audio to {}",
        audio.data.len(),
        audio.format.as_str(),
        args.output_file.display()
    );
    Ok(())
}
