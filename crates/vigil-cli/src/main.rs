use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vigil_core::{EuclideanComparator, FaceModels, PipelineError, Verification, VerificationReport, Verifier};

mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "vigil",
    version,
    about = "Verify that a video shows a live person matching a profile picture"
)]
struct Cli {
    /// TOML file with verification thresholds
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory containing det_10g.onnx, 1k3d68.onnx and w600k_r50.onnx
    #[arg(long, value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// Video to verify: an animated GIF, a directory of frames, or a video
    /// file when built with the `video` feature
    video_path: PathBuf,

    /// Profile picture of the expected person
    profile_image_path: PathBuf,
}

fn main() -> ExitCode {
    // stdout carries only the verdict and the JSON report
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    match run(&cli) {
        Ok(verification) => print_verdict(&verification),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Verification> {
    let config = Config::load(cli.config.as_deref(), cli.model_dir.clone()).context("loading configuration")?;

    let models = FaceModels::load(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;

    let max_bytes = config.liveness.max_video_bytes;
    let mut verifier = Verifier::new(config.liveness, models, Box::new(EuclideanComparator));

    tracing::info!(
        video = %cli.video_path.display(),
        profile = %cli.profile_image_path.display(),
        "verifying"
    );

    let outcome = vigil_media::open_video(&cli.video_path, max_bytes)
        .map_err(PipelineError::from)
        .and_then(|mut source| verifier.process_video(source.as_mut(), &cli.profile_image_path));

    Ok(outcome.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "video could not be processed");
        Verification {
            success: false,
            report: VerificationReport::rejected(e.to_string()),
        }
    }))
}

fn print_verdict(verification: &Verification) -> ExitCode {
    let json = match verification.report.to_json() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: cannot encode report: {e}");
            return ExitCode::FAILURE;
        }
    };

    if verification.success {
        println!("VERIFICATION_SUCCESS");
        println!("{json}");
        ExitCode::SUCCESS
    } else {
        println!("VERIFICATION_FAILED");
        println!("{json}");
        ExitCode::FAILURE
    }
}
