//! FaceMask terminal demo.
//!
//! Renders the face mask in the terminal from a synthetic head or a recorded
//! session. Logs go to a file so they do not tear the alternate screen.
//! Controls:
//!   - b: background, c / 1-6: mask colour, t: texture, l: landmarks
//!   - f: camera follow, m: shading mode
//!   - e: export OBJ, r: record session
//!   - q / Esc: quit
//!
//! `--write-config <path>` saves the effective configuration as YAML.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use mask_core::synthetic::SwayingHead;
use mask_core::{Config, MaskSession};
use mask_terminal::{FrameSource, TerminalApp};
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mask mesh (OBJ), overrides the configuration
    #[arg(short, long)]
    mesh: Option<PathBuf>,

    /// Replay a recorded session instead of the synthetic head
    #[arg(short, long)]
    replay: Option<PathBuf>,

    /// Still image shown behind the mask
    #[arg(short, long)]
    background: Option<PathBuf>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Log file
    #[arg(long, default_value = "mask-terminal.log")]
    log_file: PathBuf,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_file = File::create(&args.log_file)
        .with_context(|| format!("cannot create log file {}", args.log_file.display()))?;
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or(level))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    info!("FaceMask terminal renderer");

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path).with_context(|| format!("invalid configuration {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(mesh) = args.mesh {
        config.mesh.path = mesh;
    }
    if let Some(path) = &args.write_config {
        config.validate()?;
        config
            .to_file(path)
            .with_context(|| format!("cannot write configuration {}", path.display()))?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    let background = match &args.background {
        Some(path) => Some(
            image::open(path)
                .with_context(|| format!("cannot load background {}", path.display()))?
                .to_rgb8(),
        ),
        None => None,
    };

    let session = MaskSession::new(config.clone())?;
    let source = match &args.replay {
        Some(path) => FrameSource::replay(path)?,
        None => FrameSource::Synthetic(SwayingHead::new(session.mesh(), &config)),
    };

    let mut app = TerminalApp::new(session, source, background)?;
    app.run()?;

    println!("Log written to {}", args.log_file.display());
    Ok(())
}
