//! Headless Dream runner
//!
//! Loads a project from disk, constructs its startup scene and runs frames
//! until the scene stops or the configured frame limit is reached.
//!
//! ```text
//! dream_runner <project directory> <project uuid> [max frames]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use dream_engine::foundation::logging;
use dream_engine::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
enum RunnerError {
    #[error("usage: dream_runner <project directory> <project uuid> [max frames]")]
    Usage,

    #[error("invalid frame limit '{0}'")]
    FrameLimit(String),

    #[error(transparent)]
    Config(#[from] dream_engine::config::ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

struct Arguments {
    root: PathBuf,
    project: Uuid,
    max_frames: Option<u64>,
}

fn parse_arguments(mut args: impl Iterator<Item = String>) -> Result<Arguments, RunnerError> {
    let root = args.next().ok_or(RunnerError::Usage)?;
    let project = args.next().ok_or(RunnerError::Usage)?;
    let max_frames = args
        .next()
        .map(|frames| frames.parse().map_err(|_| RunnerError::FrameLimit(frames)))
        .transpose()?;
    if args.next().is_some() {
        return Err(RunnerError::Usage);
    }

    Ok(Arguments {
        root: PathBuf::from(root),
        project: Uuid::new(project),
        max_frames,
    })
}

fn run(arguments: Arguments) -> Result<(), RunnerError> {
    let mut config = EngineConfig::load_for_project(&arguments.root)?;
    if let Some(frames) = arguments.max_frames {
        config.max_frames = frames;
    }
    logging::init_with_level(logging::parse_level(&config.log_level));

    log::info!("Starting Dream runner for project {} in {}", arguments.project, arguments.root.display());
    let mut project = ProjectRuntime::load(&arguments.root, &arguments.project, config, Collaborators::headless())?;
    project.run()?;
    Ok(())
}

fn main() -> ExitCode {
    let result = parse_arguments(std::env::args().skip(1)).and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The logger may not be installed yet
            eprintln!("dream_runner: {e}");
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
