//! `mobilint` finds security, performance, memory and battery defects in
//! mobile app repositories.
//!
//! The mobilint binary is a wrapper around mobilint-lib, which provides
//! convenience functions for calling mobilint from the command-line.
//!
//! Analyze a repository on GitHub:
//! ```sh
//! mobilint https://github.com/android/sunflower
//! ```
//!
//! Analyze a local checkout with the local detectors only:
//! ```sh
//! mobilint --mode local ./my-app
//! ```
//!
//! Only look for security and battery defects and write a Markdown report:
//! ```sh
//! mobilint --kinds security,battery --format markdown -o report.md ./my-app
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Error, Result, bail};
use clap::{Parser, crate_version};
use log::{error, info, warn};
use mobilint_lib::fetch::{Fetcher, GitHubFetcher, LocalFetcher};
use mobilint_lib::{BackendRegistry, OrchestratorBuilder, ReportStatus};
use tokio_util::sync::CancellationToken;

mod formatters;
mod options;
mod verbosity;

use crate::formatters::backend_stats::backend_stats_table;
use crate::formatters::get_report_formatter;
use crate::formatters::log::init_logging;
use crate::options::{Config, MOBILINT_CONFIG_FILE, MobilintOptions};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    AnalysisFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    // See: https://doc.rust-lang.org/stable/std/process/fn.exit.html
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file, command-line- and environment variables
fn load_config() -> Result<MobilintOptions> {
    let mut opts = MobilintOptions::parse();

    init_logging(&opts.config.verbose);

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // If no config file was explicitly provided, we try to load the default
        // config file from the current directory if the file exits. This will
        // raise an error if the file is invalid, just like the explicit provided
        // config file.
        let default_config = PathBuf::from(MOBILINT_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    if opts.config.lane_concurrency == 0 {
        warn!("`lane_concurrency` must be at least 1. Using 1.");
        opts.config.lane_concurrency = 1;
    }
    if opts.config.drain_interval.is_zero() {
        warn!("`drain_interval` is 0. Deferred requests are only replayed once all lanes are done.");
    }

    Ok(opts)
}

/// Set up runtime and call mobilint entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!(
                "Error while loading config: {}\n\
                See: https://github.com/mobilint/mobilint/blob/mobilint-v{}/mobilint.example.toml",
                e,
                crate_version!()
            );
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;

    match runtime.block_on(run(&opts)) {
        Err(e) if Some(ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res,
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
/// This is helpful for troubleshooting the root cause of an error.
/// Code is taken from the anyhow documentation.
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Build the registry of remote backends.
///
/// In local mode no backend is contacted, so none is registered and no
/// API key has to be present.
fn registry(config: &Config) -> Result<BackendRegistry> {
    if config.mode.is_local_only() {
        return Ok(BackendRegistry::new());
    }
    BackendRegistry::from_configs(&config.lanes, config.backend_configs.clone())
        .context("Cannot set up remote backends")
}

/// Cancel the analysis on Ctrl-C.
///
/// A second Ctrl-C is not intercepted and terminates the process.
fn cancel_on_ctrl_c(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C. Cancelling the analysis...");
            cancel.cancel();
        }
    });
}

/// Write the formatted report to the output file or stdout
fn write_report(formatted: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => write_to_file(path, formatted),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{formatted}")?;
            Ok(())
        }
    }
}

fn write_to_file(path: &Path, formatted: &str) -> Result<()> {
    fs::write(path, formatted)
        .with_context(|| format!("Cannot write report to `{}`", path.display()))
}

/// Run mobilint on the given source
async fn run(opts: &MobilintOptions) -> Result<i32> {
    let config = &opts.config;

    let fetcher = Fetcher::new(
        GitHubFetcher::new(config.github_token.as_ref())?,
        // be aware that "no ignore" means do *not* ignore files
        LocalFetcher::new(!config.no_ignore),
    );

    let orchestrator = OrchestratorBuilder::builder()
        .registry(registry(config)?)
        .fetcher(Arc::new(fetcher))
        .lanes(config.lanes.clone())
        .politeness_delay(config.politeness_delay)
        .lane_concurrency(config.lane_concurrency)
        .drain_interval(config.drain_interval)
        .drain(config.drain)
        .build()
        .orchestrator()?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    info!("Analyzing {}", opts.source);
    let report = orchestrator
        .analyze_repository(&opts.source, config.analysis_options(), cancel)
        .await;
    let report = report.read().clone();

    let formatter = get_report_formatter(config.format);
    let formatted = formatter.format(&report)?;
    write_report(&formatted, config.output.as_ref())?;

    if config.backend_stats {
        if let Some(table) = backend_stats_table(&orchestrator.backend_stats()) {
            eprintln!("\n{table}");
        }
    }

    let pending = orchestrator.deferred().len();
    if pending > 0 {
        warn!("{pending} deferred request(s) were dropped without a remote analysis");
    }

    if report.status() == ReportStatus::Failed {
        if let Some(error) = report.error() {
            error!("{}", error.message);
        }
        return Ok(ExitCode::AnalysisFailure as i32);
    }
    Ok(ExitCode::Success as i32)
}
