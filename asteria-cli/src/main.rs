//! Asteria station CLI (§6): parses flags, loads configuration, and hands
//! off to the acquisition pipeline. The camera backend itself is a
//! collaborator the core does not implement (§6), so `--camera` currently
//! always resolves to "unsupported camera" until a concrete `FrameSource`
//! is linked in.

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

const EXIT_SUCCESS: u8 = 0;
const EXIT_INVALID_ARGS: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_UNSUPPORTED_CAMERA: u8 = 3;
const EXIT_GUI_UNAVAILABLE: u8 = 4;

/// All-sky meteor camera acquisition, detection, and calibration station.
#[derive(Debug, Parser)]
#[command(name = "asteria", author, version, about)]
struct Cli {
    /// List supported frame sources and exit.
    #[arg(short = 'a', long = "cameras")]
    cameras: bool,

    /// Run without the GUI shell.
    #[arg(long = "headless", conflicts_with = "gui")]
    headless: bool,

    /// Run with the GUI shell (out of scope for this build).
    #[arg(long = "gui", conflicts_with = "headless")]
    gui: bool,

    /// Camera device path.
    #[arg(short = 'b', long = "camera", value_name = "PATH")]
    camera: Option<PathBuf>,

    /// Configuration file path.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let _guard = logging::init();
    let cli = Cli::parse();

    if cli.cameras {
        list_cameras();
        return ExitCode::from(EXIT_SUCCESS);
    }

    if cli.gui {
        error!("GUI shell is out of scope for this build");
        return ExitCode::from(EXIT_GUI_UNAVAILABLE);
    }

    if !cli.headless {
        error!("no run mode selected; pass --headless or --gui");
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let (camera, config_path) = match (cli.camera, cli.config) {
        (Some(camera), Some(config_path)) => (camera, config_path),
        _ => {
            error!("--headless requires both --camera and --config");
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    let config = match asteria_config::Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    info!(clip_root = %config.clip_root, "configuration loaded");
    error!(camera = %camera.display(), "no camera backend is compiled into this build");
    ExitCode::from(EXIT_UNSUPPORTED_CAMERA)
}

fn list_cameras() {
    info!("no camera backends are compiled into this build");
    println!("(none)");
}
