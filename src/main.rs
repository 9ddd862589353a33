mod app;
mod automation;
mod calibration;
mod core;
mod environment;
mod error;
mod prompts;
mod settings;
mod tools;

#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use app::BatchApp;
use automation::context::secs_to_duration;
use crate::core::desktop::open_desktop;
use crate::core::ocr::{OcrsRecognizer, TextRecognizer};
use environment::browser::SystemBrowser;
use environment::geo::HttpGeoProbe;
use environment::vpn::NordVpnSwitcher;
use environment::RegionSwitcher;
use settings::AppSettings;
use tools::batch::{BatchRequest, BatchRunner, Collaborators};

/// Run a range of prompts from a file through the image generation page.
#[derive(Parser, Debug)]
#[command(name = "whiskbatch", version, about)]
struct Args {
    /// Prompt file, one prompt per line; blank lines are skipped
    #[arg(required_unless_present = "write_settings")]
    prompt_file: Option<PathBuf>,

    /// First prompt to run (1-based)
    #[arg(short, long, default_value_t = 1)]
    start: usize,

    /// Last prompt to run, inclusive; defaults to the end of the file
    #[arg(short, long)]
    end: Option<usize>,

    /// Settings file
    #[arg(long, default_value = AppSettings::SETTINGS_FILE)]
    settings: PathBuf,

    /// Do not switch the egress region before the run
    #[arg(long)]
    skip_region: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Write the effective settings to the settings file
    #[arg(long)]
    write_settings: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_runner(settings: AppSettings, request: BatchRequest, skip_region: bool) -> Result<BatchRunner, String> {
    let probe = HttpGeoProbe::new(
        settings.region.geo_endpoints.clone(),
        secs_to_duration(settings.region.geo_timeout_secs).max(Duration::from_secs(1)),
    )
    .map_err(|e| e.to_string())?;

    let switcher: Option<Box<dyn RegionSwitcher>> = if settings.region.enabled && !skip_region {
        Some(Box::new(NordVpnSwitcher::new(settings.region.clone(), probe.clone())))
    } else {
        tracing::info!("region switch disabled");
        None
    };

    let collaborators = Collaborators {
        probe: Box::new(probe),
        browser: Box::new(SystemBrowser::new(settings.browsers.preferred.clone())),
        switcher,
    };

    let detection = PathBuf::from(&settings.ocr.detection_model_path);
    let recognition = PathBuf::from(&settings.ocr.recognition_model_path);
    let scale = settings.ocr.scale_factor;

    Ok(BatchRunner::new(
        settings,
        request,
        collaborators,
        Box::new(open_desktop),
        Box::new(move || {
            OcrsRecognizer::from_files(&detection, &recognition, scale)
                .map(|r| Box::new(r) as Box<dyn TextRecognizer>)
        }),
    ))
}

fn write_settings(settings: &AppSettings, path: &Path) -> bool {
    match settings.save(path) {
        Ok(()) => {
            println!("Settings written to {}", path.display());
            true
        }
        Err(e) => {
            eprintln!("Could not write settings to {}: {}", path.display(), e);
            false
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = AppSettings::load(&args.settings);
    if args.write_settings && !write_settings(&settings, &args.settings) {
        return ExitCode::FAILURE;
    }
    let Some(prompt_file) = args.prompt_file else {
        return ExitCode::SUCCESS;
    };

    let request = BatchRequest {
        prompt_file,
        start: args.start,
        end: args.end.unwrap_or(usize::MAX),
    };
    let hotkeys = settings.hotkeys.clone();
    let runner = match build_runner(settings, request, args.skip_region) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("Setup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut app = BatchApp::new();
    app.attach_inputs(&hotkeys);
    if let Err(e) = app.start(runner) {
        eprintln!("Could not start: {}", e);
        return ExitCode::FAILURE;
    }
    app.run_until_finished();
    ExitCode::SUCCESS
}
