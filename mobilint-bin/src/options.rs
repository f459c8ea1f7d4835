use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::Parser;
use clap::builder::{PossibleValuesParser, TypedValueParser};
use const_format::{concatcp, formatcp};
use mobilint_lib::backend::BackendConfigs;
use mobilint_lib::orchestrator::{
    DEFAULT_DRAIN_INTERVAL, DEFAULT_LANE_CONCURRENCY, DEFAULT_POLITENESS_DELAY,
};
use mobilint_lib::{
    AnalysisKind, AnalysisMode, AnalysisOptions, Backend, DEFAULT_MAX_FILES, DrainConfig,
};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{fs, str::FromStr, time::Duration};
use strum::{Display, EnumIter, VariantNames};

pub(crate) const MOBILINT_CONFIG_FILE: &str = "mobilint.toml";

const DEFAULT_KINDS: &str = "security,performance,memory,battery";
const DEFAULT_LANES: &str = "openai,deepseek,llama";
const DEFAULT_POLITENESS_DELAY_STR: &str = "1s";
const DEFAULT_DRAIN_INTERVAL_STR: &str = "3s";

// this exists because clap requires `&str` type values for defaults
// whereas serde expects owned `String` types
const MAX_FILES_STR: &str = concatcp!(DEFAULT_MAX_FILES);
const LANE_CONCURRENCY_STR: &str = concatcp!(DEFAULT_LANE_CONCURRENCY);
// We use a custom help message here because we want to show the default
// value of the config file, but also be able to check if the user has
// provided a custom value. If they didn't, we won't throw an error if
// the file doesn't exist.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    MOBILINT_CONFIG_FILE,
);

/// The format to use for the final report
#[derive(Debug, Deserialize, Default, Clone, Copy, Display, EnumIter, VariantNames, PartialEq)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum ReportFormat {
    #[default]
    Compact,
    Json,
    Markdown,
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "compact" | "string" => Ok(ReportFormat::Compact),
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            _ => Err(anyhow!("Unknown format {format}")),
        }
    }
}

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    kinds: Vec<AnalysisKind> = AnalysisKind::ALL.to_vec();
    lanes: Vec<Backend> = Backend::LANES.to_vec();
    max_files: usize = DEFAULT_MAX_FILES;
    lane_concurrency: usize = DEFAULT_LANE_CONCURRENCY;
    politeness_delay: Duration = DEFAULT_POLITENESS_DELAY;
    drain_interval: Duration = DEFAULT_DRAIN_INTERVAL;
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// mobilint finds security, performance, memory and battery defects in
/// mobile app repositories.
///
/// Local pattern detectors check every file. Remote analysis backends may
/// augment their results, each within its own request quota.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct MobilintOptions {
    /// The repository to analyze: a GitHub URL or a local directory
    #[arg(
        name = "source",
        long_help = "The repository to analyze. This can be a GitHub repository URL
(e.g. `https://github.com/android/sunflower`) or the path of a local
directory (e.g. `./my-app`)."
    )]
    pub(crate) source: String,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

/// The main configuration for mobilint
#[derive(Parser, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Analysis kinds to run on every file
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_value = DEFAULT_KINDS,
        value_name = "KINDS"
    )]
    #[serde(default = "kinds")]
    pub(crate) kinds: Vec<AnalysisKind>,

    /// Whether remote backends may augment local results
    #[arg(short, long, default_value = "local+remote", value_parser = PossibleValuesParser::new(["local", "local+remote", "hybrid"]).map(|s| s.parse::<AnalysisMode>().unwrap()))]
    #[serde(default)]
    pub(crate) mode: AnalysisMode,

    /// Maximum number of files fetched from the repository
    #[arg(long, default_value = MAX_FILES_STR)]
    #[serde(default = "max_files")]
    pub(crate) max_files: usize,

    /// Backend to send every request to first, regardless of its lane
    #[arg(long, value_name = "BACKEND")]
    #[serde(default)]
    pub(crate) prefer: Option<Backend>,

    /// Backends to distribute files over, in priority order
    #[arg(
        long = "backends",
        value_delimiter = ',',
        default_value = DEFAULT_LANES,
        value_name = "BACKENDS"
    )]
    #[serde(default = "lanes")]
    pub(crate) lanes: Vec<Backend>,

    /// GitHub API token used to fetch repositories, to avoid rate limiting
    #[arg(long = "token", env = "GITHUB_TOKEN", hide_env_values = true)]
    #[serde(default)]
    pub(crate) github_token: Option<SecretString>,

    /// Number of lanes analyzed at the same time
    #[arg(long, default_value = LANE_CONCURRENCY_STR)]
    #[serde(default = "lane_concurrency")]
    pub(crate) lane_concurrency: usize,

    /// Pause between two analyses on the same lane, e.g. `500ms` or `2s`
    #[arg(long, default_value = DEFAULT_POLITENESS_DELAY_STR, value_parser = humantime::parse_duration)]
    #[serde(default = "politeness_delay", with = "humantime_serde")]
    pub(crate) politeness_delay: Duration,

    /// How often deferred requests are retried while files are analyzed
    #[arg(long, default_value = DEFAULT_DRAIN_INTERVAL_STR, value_parser = humantime::parse_duration)]
    #[serde(default = "drain_interval", with = "humantime_serde")]
    pub(crate) drain_interval: Duration,

    /// Do not skip files that would otherwise be ignored by
    /// '.gitignore', '.ignore', or the global ignore file.
    #[arg(long)]
    #[serde(default)]
    pub(crate) no_ignore: bool,

    /// Output format of the final report
    #[arg(short, long, default_value = "compact", value_parser = PossibleValuesParser::new(ReportFormat::VARIANTS).map(|s| s.parse::<ReportFormat>().unwrap()))]
    #[serde(default)]
    pub(crate) format: ReportFormat,

    /// Output file of the report
    #[arg(short, long, value_parser)]
    #[serde(default)]
    pub(crate) output: Option<PathBuf>,

    /// Show per-backend statistics at the end of the run
    #[arg(long)]
    #[serde(default)]
    pub(crate) backend_stats: bool,

    /// Quota, model and endpoint overrides per backend from the config file
    #[arg(skip)]
    #[serde(default, rename = "backends")]
    pub(crate) backend_configs: BackendConfigs,

    /// Pacing and retry policy of the deferred queue from the config file
    #[arg(skip)]
    #[serde(default)]
    pub(crate) drain: DrainConfig,
}

impl Config {
    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        // Read configuration file
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Options of a single analysis run
    pub(crate) fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            analysis_kinds: self.kinds.clone(),
            analysis_mode: self.mode,
            max_files_per_repo: self.max_files,
            preferred_backend_hint: self.prefer,
            ..AnalysisOptions::default()
        }
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        // If the config file has a value for the GitHub token, but the CLI
        // doesn't, use the token from the config file.
        // This is outside of fold_in! because SecretBox doesn't implement Eq.
        if self.github_token.is_none() && toml.github_token.is_some() {
            self.github_token = toml.github_token;
        }

        // Backend and drain settings are only available in TOML
        self.backend_configs = toml.backend_configs;
        self.drain = toml.drain;

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..github_token,
                ..backend_configs,
                ..drain,

                // Keys with defaults to assign
                verbose: Verbosity::default(),
                kinds: AnalysisKind::ALL.to_vec(),
                mode: AnalysisMode::default(),
                max_files: DEFAULT_MAX_FILES,
                prefer: None,
                lanes: Backend::LANES.to_vec(),
                lane_concurrency: DEFAULT_LANE_CONCURRENCY,
                politeness_delay: DEFAULT_POLITENESS_DELAY,
                drain_interval: DEFAULT_DRAIN_INTERVAL,
                no_ignore: false,
                format: ReportFormat::default(),
                output: None,
                backend_stats: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> MobilintOptions {
        MobilintOptions::parse_from(["mobilint"].iter().chain(args))
    }

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        MobilintOptions::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let opts = parse(&["./app"]);
        let config = opts.config;
        assert_eq!(opts.source, "./app");
        assert_eq!(config.kinds, AnalysisKind::ALL.to_vec());
        assert_eq!(config.mode, AnalysisMode::LocalRemote);
        assert_eq!(config.max_files, DEFAULT_MAX_FILES);
        assert_eq!(config.lanes, Backend::LANES.to_vec());
        assert_eq!(config.politeness_delay, DEFAULT_POLITENESS_DELAY);
        assert_eq!(config.drain_interval, DEFAULT_DRAIN_INTERVAL);
        assert_eq!(config.format, ReportFormat::Compact);
    }

    #[test]
    fn test_cli_values() {
        let config = parse(&[
            "--kinds",
            "memory,Battery",
            "--mode",
            "local",
            "--backends",
            "gemini,llama",
            "--prefer",
            "gemini",
            "--politeness-delay",
            "250ms",
            "-f",
            "markdown",
            "./app",
        ])
        .config;
        assert_eq!(config.kinds, vec![AnalysisKind::Memory, AnalysisKind::Battery]);
        assert_eq!(config.mode, AnalysisMode::Local);
        assert_eq!(config.lanes, vec![Backend::Gemini, Backend::Llama]);
        assert_eq!(config.prefer, Some(Backend::Gemini));
        assert_eq!(config.politeness_delay, Duration::from_millis(250));
        assert_eq!(config.format, ReportFormat::Markdown);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(MobilintOptions::try_parse_from(["mobilint", "-k", "style", "./app"]).is_err());
    }

    #[test]
    fn test_load_toml() {
        let config: Config = toml::from_str(
            r#"
            kinds = ["security"]
            mode = "local"
            lanes = ["llama"]
            politeness_delay = "2s"

            [backends.llama]
            capacity = 2
            window = "30s"

            [drain]
            max_passes = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.kinds, vec![AnalysisKind::Security]);
        assert_eq!(config.mode, AnalysisMode::Local);
        assert_eq!(config.lanes, vec![Backend::Llama]);
        assert_eq!(config.politeness_delay, Duration::from_secs(2));
        assert_eq!(config.backend_configs[&Backend::Llama].capacity, Some(2));
        assert_eq!(config.drain.max_passes, 5);
        assert_eq!(config.max_files, DEFAULT_MAX_FILES);
    }

    #[test]
    fn test_unknown_toml_keys_are_rejected() {
        assert!(toml::from_str::<Config>("colour = true").is_err());
    }

    #[test]
    fn test_merge_cli_wins_over_toml() {
        let toml: Config = toml::from_str(
            r#"
            max_files = 10
            lane_concurrency = 2
            format = "json"
            "#,
        )
        .unwrap();
        let mut cli = parse(&["--format", "markdown", "./app"]).config;
        cli.merge(toml);

        assert_eq!(cli.max_files, 10);
        assert_eq!(cli.lane_concurrency, 2);
        assert_eq!(cli.format, ReportFormat::Markdown);
    }

    #[test]
    fn test_analysis_options() {
        let config = parse(&["--max-files", "7", "--prefer", "llama", "./app"]).config;
        let options = config.analysis_options();
        assert_eq!(options.max_files_per_repo, 7);
        assert_eq!(options.preferred_backend_hint, Some(Backend::Llama));
        assert_eq!(options.analysis_kinds, AnalysisKind::ALL.to_vec());
    }
}
