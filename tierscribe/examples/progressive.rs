//! Stream progress for a video: metadata, a preview of the first minute, then the result.
//!
//! Usage: ASSEMBLYAI_API_KEY=... cargo run --example progressive -- <youtube-url-or-id>

use tierscribe::{EngineConfig, ProgressEvent, ResolutionEngine, TranscriptOptions};

#[tokio::main]
async fn main() -> tierscribe::Result<()> {
    let input = std::env::args()
        .nth(1)
        .expect("usage: progressive <youtube-url-or-id>");
    let key = std::env::var("ASSEMBLYAI_API_KEY").expect("ASSEMBLYAI_API_KEY must be set");

    let engine = ResolutionEngine::standard(EngineConfig::from_env()?, key)?;
    let options = TranscriptOptions::new().expected_speakers(2)?;

    let mut events = engine.resolve_input_progressive(&input, options);
    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::Metadata(meta) => println!("# {} by {}", meta.title, meta.author),
            ProgressEvent::Partial { text, audio_duration } => {
                println!("-- first {audio_duration}s --\n{text}\n");
            }
            ProgressEvent::Complete(resolution) => {
                println!("-- full transcript via {} --", resolution.method());
                println!("{}", resolution.transcript.render_text());
            }
            ProgressEvent::Error { error, phase } => eprintln!("failed during {phase:?}: {error}"),
        }
    }
    Ok(())
}
