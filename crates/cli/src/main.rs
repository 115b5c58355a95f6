// voxcheck CLI - verify claims about volumetric datasets against ground truth

mod exit_codes;
mod input;
mod verify;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use voxcheck_verify::{VerifyConfig, VerifyError};

use exit_codes::{verify_exit_code, EXIT_ERROR, EXIT_INPUT_PARSE, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "vcheck")]
#[command(about = "Verify claims about volumetric datasets against metadata and raw samples")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Verification tables (TOML). Defaults to <config dir>/voxcheck/verify.toml,
    /// then to the built-in tables
    #[arg(long, global = true, env = "VCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Log resolver and auditor steps to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Print exactly one JSON value to stdout instead of a human summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a batch of claims and score the result
    #[command(after_help = "\
Claims file: a JSON object of field name to claimed value. Nested objects
are flattened, so {\"location\": {\"inline\": 425}} claims location.inline.

Exit codes: 0 PASS or MOSTLY_VALID, 3 PARTIALLY_VALID, 4 FAIL.

Examples:
  vcheck reconcile --metadata f3.json --claims claims.json
  vcheck reconcile --metadata f3.json --claims claims.json --samples window.csv --json
  vcheck reconcile --metadata f3.json --claims claims.json --ranges ranges.json")]
    Reconcile {
        /// Metadata document (JSON, `-` for stdin)
        #[arg(long, short = 'm')]
        metadata: PathBuf,

        /// Claims (JSON object)
        #[arg(long, short = 'c')]
        claims: PathBuf,

        /// Raw samples (JSON array or CSV)
        #[arg(long, short = 's')]
        samples: Option<PathBuf>,

        /// CSV column holding the samples (default: every numeric cell)
        #[arg(long, requires = "samples")]
        column: Option<String>,

        /// Valid index ranges (JSON object of axis to [min, max])
        #[arg(long, short = 'r')]
        ranges: Option<PathBuf>,
    },

    /// List every field reachable in a metadata document
    #[command(after_help = "\
Examples:
  vcheck discover --metadata f3.json
  vcheck discover --metadata f3.json --json | jq '.resolved'")]
    Discover {
        /// Metadata document (JSON, `-` for stdin)
        #[arg(long, short = 'm')]
        metadata: PathBuf,
    },

    /// Resolve one field name against a metadata document
    #[command(after_help = "\
Examples:
  vcheck resolve epsg --metadata f3.json
  vcheck resolve 'Geodetic Datum' --metadata f3.json --json")]
    Resolve {
        /// Field name, alias or near spelling
        field: String,

        /// Metadata document (JSON, `-` for stdin)
        #[arg(long, short = 'm')]
        metadata: PathBuf,
    },

    /// Recompute statistics from raw samples, optionally auditing claims
    #[command(after_help = "\
Examples:
  vcheck stats --samples window.json
  vcheck stats --samples window.csv --column amplitude --claims stats.json
  vcheck stats --samples window.json --claims stats.json --tolerance 0.01 --json")]
    Stats {
        /// Raw samples (JSON array or CSV, `-` for stdin as JSON)
        #[arg(long, short = 's')]
        samples: PathBuf,

        /// CSV column holding the samples
        #[arg(long)]
        column: Option<String>,

        /// Claimed statistics (JSON object of statistic name to value)
        #[arg(long, short = 'c')]
        claims: Option<PathBuf>,

        /// Relative tolerance for every statistic (default: configured per statistic)
        #[arg(long, requires = "claims")]
        tolerance: Option<f64>,
    },

    /// Check claimed spatial indices against valid ranges
    #[command(after_help = "\
Examples:
  vcheck coords --ranges ranges.json --claims location.json")]
    Coords {
        /// Valid index ranges (JSON object of axis to [min, max])
        #[arg(long, short = 'r')]
        ranges: PathBuf,

        /// Claimed location (JSON object of axis to index)
        #[arg(long, short = 'c')]
        claims: PathBuf,
    },

    /// Fingerprint data shown to a client, or re-check a fingerprint
    #[command(subcommand)]
    Provenance(ProvenanceCommands),

    /// Inspect the verification tables
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ProvenanceCommands {
    /// Record a content fingerprint for samples or a metadata document
    #[command(after_help = "\
Examples:
  vcheck provenance record --samples window.json --param inline=425 --param window=32
  vcheck provenance record --metadata f3.json --output f3.provenance.json")]
    Record {
        /// Raw samples (JSON array or CSV)
        #[arg(long, short = 's', conflicts_with = "metadata", required_unless_present = "metadata")]
        samples: Option<PathBuf>,

        /// Metadata document (JSON)
        #[arg(long, short = 'm')]
        metadata: Option<PathBuf>,

        /// CSV column holding the samples
        #[arg(long, requires = "samples")]
        column: Option<String>,

        /// Extraction parameter as KEY=VALUE (VALUE is JSON if it parses, text otherwise)
        #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Write the record to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Re-check data against a stored record (exit 8 on mismatch)
    #[command(after_help = "\
Examples:
  vcheck provenance verify --record f3.provenance.json --metadata f3.json")]
    Verify {
        /// Stored provenance record (JSON)
        #[arg(long)]
        record: PathBuf,

        /// Raw samples (JSON array or CSV)
        #[arg(long, short = 's', conflicts_with = "metadata", required_unless_present = "metadata")]
        samples: Option<PathBuf>,

        /// Metadata document (JSON)
        #[arg(long, short = 'm')]
        metadata: Option<PathBuf>,

        /// CSV column holding the samples
        #[arg(long, requires = "samples")]
        column: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Parse and validate a tables file (default: the active one)
    Validate {
        /// Tables file to check instead of the active config
        path: Option<PathBuf>,
    },

    /// Print the active tables
    Show,
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  voxcheck-verify ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  voxcheck-verify ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: vcheck <command> [options]");
            eprintln!("       vcheck --help for more information");
            Ok(())
        }
        Some(command) => run(command, cli.config.as_deref(), cli.json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn run(command: Commands, config_path: Option<&Path>, json: bool) -> Result<(), CliError> {
    // `config validate <path>` must report a broken file itself, not fail loading it
    if let Commands::Config(ConfigCommands::Validate { path: Some(path) }) = &command {
        return verify::cmd_config_validate(path, json);
    }

    let (config, source) = load_config(config_path)?;
    log::debug!("verification tables '{}' from {}", config.name, source);

    match command {
        Commands::Reconcile { metadata, claims, samples, column, ranges } => verify::cmd_reconcile(
            config,
            &metadata,
            &claims,
            samples.as_deref(),
            column.as_deref(),
            ranges.as_deref(),
            json,
        ),
        Commands::Discover { metadata } => verify::cmd_discover(config, &metadata, json),
        Commands::Resolve { field, metadata } => verify::cmd_resolve(config, &field, &metadata, json),
        Commands::Stats { samples, column, claims, tolerance } => verify::cmd_stats(
            config,
            &samples,
            column.as_deref(),
            claims.as_deref(),
            tolerance,
            json,
        ),
        Commands::Coords { ranges, claims } => verify::cmd_coords(config, &ranges, &claims, json),
        Commands::Provenance(ProvenanceCommands::Record { samples, metadata, column, params, output }) => {
            verify::cmd_provenance_record(
                config,
                samples.as_deref(),
                metadata.as_deref(),
                column.as_deref(),
                &params,
                output.as_deref(),
                json,
            )
        }
        Commands::Provenance(ProvenanceCommands::Verify { record, samples, metadata, column }) => {
            verify::cmd_provenance_verify(
                config,
                &record,
                samples.as_deref(),
                metadata.as_deref(),
                column.as_deref(),
                json,
            )
        }
        Commands::Config(ConfigCommands::Validate { .. }) => {
            verify::cmd_config_report(&config, &source, json)
        }
        Commands::Config(ConfigCommands::Show) => verify::cmd_config_show(&config, &source, json),
    }
}

/// Stderr logging. `RUST_LOG` wins over the default level; `-v` wins over both.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // try_init also bridges the engine's `log` records
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

/// User-level tables file, used when neither --config nor VCHECK_CONFIG is set.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("voxcheck").join("verify.toml"))
}

fn load_config(explicit: Option<&Path>) -> Result<(VerifyConfig, String), CliError> {
    if let Some(path) = explicit {
        let config = VerifyConfig::load(path).map_err(|e| {
            CliError::verify(e).with_hint(format!(
                "check {} with `vcheck config validate {}`",
                path.display(),
                path.display()
            ))
        })?;
        return Ok((config, path.display().to_string()));
    }
    if let Some(path) = default_config_path().filter(|p| p.is_file()) {
        let config = VerifyConfig::load(&path).map_err(|e| {
            CliError::verify(e).with_hint(format!(
                "fix or remove {} to use the built-in tables",
                path.display()
            ))
        })?;
        return Ok((config, path.display().to_string()));
    }
    Ok((VerifyConfig::builtin(), "builtin".to_string()))
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INPUT_PARSE, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Non-zero exit with nothing further to print (the verdict was already shown).
    pub fn exit(code: u8) -> Self {
        Self { code, message: String::new(), hint: None }
    }

    /// Create error from an engine error with the registry's exit code.
    pub fn verify(err: VerifyError) -> Self {
        let code = verify_exit_code(&err);
        let hint = match &err {
            VerifyError::EmptyClaims => {
                Some("run `vcheck discover` to list the fields you can claim".to_string())
            }
            VerifyError::MissingValidRanges { .. } => {
                Some("pass --ranges with a JSON object of axis to [min, max]".to_string())
            }
            VerifyError::NoFiniteSamples { .. } => {
                Some("every sample is NaN or infinite; check the extraction window".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
