//! `aural` — offline rendering front end for the audio graph engine.
//!
//! Loads a JSON graph description, optionally registers WAV sample
//! buffers, and drives the engine quantum by quantum into a WAV file.

mod render;
mod settings;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use aural_registry::ResourceRegistry;

use crate::render::BufferArg;
use crate::settings::RenderSettings;

#[derive(Parser)]
#[command(name = "aural", about = "Offline audio graph renderer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a graph description to a WAV file.
    Render {
        /// Graph description (JSON).
        graph: PathBuf,
        /// Output WAV path.
        #[arg(short, long, default_value = "out.wav")]
        output: PathBuf,
        /// Render settings (TOML); defaults apply when omitted.
        #[arg(short, long)]
        settings: Option<PathBuf>,
        /// Override the render duration in seconds.
        #[arg(short, long)]
        duration: Option<f64>,
        /// Register a WAV file as a sample buffer: `--buffer 1=loop.wav`.
        #[arg(short, long)]
        buffer: Vec<BufferArg>,
    },
    /// Compile a graph description and print a summary.
    Inspect {
        /// Graph description (JSON).
        graph: PathBuf,
        /// Render settings (TOML); defaults apply when omitted.
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
}

fn load_settings(path: Option<&PathBuf>, duration: Option<f64>) -> Result<RenderSettings> {
    let mut settings = match path {
        Some(path) => RenderSettings::load(path)?,
        None => RenderSettings::default(),
    };
    if let Some(duration) = duration {
        settings.duration_secs = duration;
        settings.validate()?;
    }
    Ok(settings)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Render {
            graph,
            output,
            settings,
            duration,
            buffer,
        } => {
            let settings = load_settings(settings.as_ref(), duration)?;
            let description = render::load_description(&graph)?;

            let mut registry = ResourceRegistry::new();
            for arg in buffer {
                let loaded = render::load_wav_buffer(&arg.path)?;
                tracing::debug!(
                    "registered buffer {} ({} frames, {} channels)",
                    arg.id,
                    loaded.frames(),
                    loaded.channel_count()
                );
                registry.insert_buffer_with_id(arg.id, loaded);
            }

            render::render_to_wav(description, &registry, &settings, &output)
        }
        Command::Inspect { graph, settings } => {
            let settings = load_settings(settings.as_ref(), None)?;
            let description = render::load_description(&graph)?;
            render::inspect(&description, &settings)
        }
    }
}
