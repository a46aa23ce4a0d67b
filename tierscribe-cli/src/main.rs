use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tierscribe::{EngineConfig, ProgressEvent, Resolution, ResolutionEngine, TranscriptOptions};

#[derive(Parser)]
#[command(name = "tierscribe", about = "Get a transcript for a YouTube video, whatever it takes")]
struct Cli {
    /// YouTube URL or 11-character video ID.
    input: String,

    /// Do not ask for speaker labels.
    #[arg(long)]
    no_speaker_labels: bool,

    /// Expected number of speakers (1-10).
    #[arg(long)]
    speakers: Option<u8>,

    /// Language code of the audio (e.g. "en", "de"). Detected when omitted.
    #[arg(short, long)]
    language: Option<String>,

    /// Skip published captions when speaker labels are wanted.
    #[arg(long)]
    prefer_diarization: bool,

    /// Print every progress event as a JSON line.
    #[arg(long)]
    stream: bool,

    /// Output format.
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Write output to file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match "tierscribe=info".parse() {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(_) => tracing_subscriber::EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut options = TranscriptOptions::new()
        .speaker_labels(!cli.no_speaker_labels)
        .prefer_diarization(cli.prefer_diarization);
    if let Some(n) = cli.speakers {
        options = options.expected_speakers(n).unwrap_or_else(|e| fail(e));
    }
    if let Some(lang) = &cli.language {
        options = options.language(lang);
    }

    let config = EngineConfig::from_env().unwrap_or_else(|e| fail(e));
    let api_key = std::env::var("ASSEMBLYAI_API_KEY")
        .unwrap_or_else(|_| fail("ASSEMBLYAI_API_KEY is not set"));
    let engine = ResolutionEngine::standard(config, api_key).unwrap_or_else(|e| fail(e));

    let mut events = engine.resolve_input_progressive(&cli.input, options);

    let spinner = (!cli.stream).then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {elapsed} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(format!("resolving {}", cli.input));
        pb
    });

    let mut resolution = None;
    while let Some(event) = events.recv().await {
        if cli.stream {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => fail(e),
            }
        }
        match event {
            ProgressEvent::Metadata(meta) => {
                if let Some(pb) = &spinner {
                    pb.set_message(format!("{} ({})", meta.title, meta.author));
                }
            }
            ProgressEvent::Partial { audio_duration, .. } => {
                if let Some(pb) = &spinner {
                    pb.set_message(format!(
                        "first {audio_duration}s transcribed, waiting for the rest"
                    ));
                }
            }
            ProgressEvent::Complete(done) => resolution = Some(*done),
            ProgressEvent::Error { error, .. } => {
                if let Some(pb) = &spinner {
                    pb.finish_and_clear();
                }
                if cli.stream {
                    std::process::exit(1);
                }
                fail(error);
            }
        }
    }
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    if cli.stream {
        return;
    }

    let Some(resolution) = resolution else {
        fail("resolution ended without a result");
    };

    eprintln!(
        "Transcript via {}: {} of audio, {} speaker(s)",
        resolution.method(),
        resolution
            .audio_duration()
            .map(|d| format!("{d}s"))
            .unwrap_or_else(|| "unknown length".into()),
        resolution.transcript.speakers.len(),
    );

    let output_text = render(&resolution, &cli.format);

    match cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &output_text) {
                fail(format!("writing to {}: {e}", path.display()));
            }
            eprintln!("Written to {}", path.display());
        }
        None => println!("{output_text}"),
    }
}

fn render(resolution: &Resolution, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Text => resolution.transcript.render_text(),
        OutputFormat::Json => resolution.to_json_pretty().unwrap_or_else(|e| fail(e)),
    }
}
