//! Command-line interface for the concord utility
//!
//! Runs happy-eyeballs, lock and keyed observer scenarios so their ordering
//! behavior can be inspected from a shell.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::report::{render_happy_eyes, render_lock, render_observe};
use crate::scenario::{run_happy_eyes, run_lock, run_observe, Scenario};
use concord::core::logging::init_logging;

/// Concord - run async coordination scenarios
#[derive(Parser)]
#[command(name = "concord")]
#[command(about = "Run cancellation, happy-eyeballs, lock and observer scenarios")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Set log level (trace|debug|info|warn|error)
    #[arg(long, value_enum, global = true, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Set log format (compact|pretty|json)
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// When to use colors in output
    #[arg(long, value_enum, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,
}

/// Log level options
#[derive(Copy, Clone, Debug, clap::ValueEnum, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format options
#[derive(Copy, Clone, Debug, clap::ValueEnum, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Race staggered candidates from a JSON scenario
    HappyEyes {
        /// Scenario file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file for the report (use - for stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the scenario's stagger delay
        #[arg(long)]
        stagger_ms: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Contend for an async lock and print the grant order
    Lock {
        /// Number of contending tasks
        #[arg(long, default_value_t = 3)]
        tasks: usize,

        /// How long each task holds the lock
        #[arg(long, default_value_t = 10)]
        hold_ms: u64,

        /// Output file for the report (use - for stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reconcile key sets, one whitespace-separated set per input line
    Observe {
        /// Key set file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file for the report (use - for stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// When to colorize output
#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Use colors if output is a terminal and NO_COLOR is not set
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Main CLI application
pub struct ConcordApp {
    runtime: tokio::runtime::Runtime,
}

impl ConcordApp {
    /// Create a new application instance with its own async runtime
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        Ok(Self { runtime })
    }

    /// Run the application with the given CLI arguments
    pub fn run(&self, cli: Cli) -> Result<()> {
        // Environment variables take precedence over CLI flags
        let log_level_str = std::env::var("CONCORD_LOG_LEVEL")
            .ok()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .or_else(|| Some(cli.log_level.as_str().to_string()));

        let log_format_str = std::env::var("CONCORD_LOG_FORMAT")
            .ok()
            .or_else(|| Some(cli.log_format.as_str().to_string()));

        if let Err(e) = init_logging(log_level_str.as_deref(), log_format_str.as_deref()) {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        if cli.verbose {
            eprintln!("Concord v{}", env!("CARGO_PKG_VERSION"));
        }

        match cli.command {
            Commands::HappyEyes {
                input,
                output,
                stagger_ms,
                json,
            } => self.happy_eyes_command(input, output, stagger_ms, json, cli.color, cli.verbose),
            Commands::Lock {
                tasks,
                hold_ms,
                output,
                json,
            } => self.lock_command(tasks, hold_ms, output, json, cli.color, cli.verbose),
            Commands::Observe {
                input,
                output,
                json,
            } => self.observe_command(input, output, json, cli.color, cli.verbose),
        }
    }

    /// Handle the happy-eyes command
    fn happy_eyes_command(
        &self,
        input: Option<PathBuf>,
        output: Option<PathBuf>,
        stagger_ms: Option<u64>,
        json: bool,
        color: ColorChoice,
        verbose: bool,
    ) -> Result<()> {
        let content = self.read_input(input)?;
        let mut scenario = Scenario::parse(&content)?;
        if stagger_ms.is_some() {
            scenario.stagger_ms = stagger_ms;
        }

        if verbose {
            eprintln!(
                "Racing {} candidates with a {}ms stagger",
                scenario.candidates.len(),
                scenario.config().stagger.as_millis()
            );
        }

        let report = self.runtime.block_on(run_happy_eyes(&scenario, None));
        let rendered = if json {
            to_json(&report)?
        } else {
            render_happy_eyes(&report, self.should_colorize(&output, color))
        };
        self.write_output(output, &rendered)?;

        match report.error {
            Some(error) if report.winner.is_none() => Err(anyhow!(error)),
            _ => Ok(()),
        }
    }

    /// Handle the lock command
    fn lock_command(
        &self,
        tasks: usize,
        hold_ms: u64,
        output: Option<PathBuf>,
        json: bool,
        color: ColorChoice,
        verbose: bool,
    ) -> Result<()> {
        if verbose {
            eprintln!("Queueing {} tasks, each holding the lock for {}ms", tasks, hold_ms);
        }

        let grants = self
            .runtime
            .block_on(run_lock(tasks, Duration::from_millis(hold_ms)))?;
        let rendered = if json {
            to_json(&grants)?
        } else {
            render_lock(&grants, self.should_colorize(&output, color))
        };
        self.write_output(output, &rendered)
    }

    /// Handle the observe command
    fn observe_command(
        &self,
        input: Option<PathBuf>,
        output: Option<PathBuf>,
        json: bool,
        color: ColorChoice,
        verbose: bool,
    ) -> Result<()> {
        let content = self.read_input(input)?;

        if verbose {
            eprintln!("Read {} bytes of input", content.len());
        }

        let steps = run_observe(&content);
        let rendered = if json {
            to_json(&steps)?
        } else {
            render_observe(&steps, self.should_colorize(&output, color))
        };
        self.write_output(output, &rendered)
    }

    /// Determine if we should colorize the output based on color choice and output destination
    fn should_colorize(&self, output: &Option<PathBuf>, color: ColorChoice) -> bool {
        match color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => {
                if std::env::var("NO_COLOR").is_ok() {
                    return false;
                }
                match output {
                    None => crossterm::tty::IsTty::is_tty(&std::io::stdout()),
                    Some(ref p) if p.to_str() == Some("-") => {
                        crossterm::tty::IsTty::is_tty(&std::io::stdout())
                    }
                    Some(_) => false, // Writing to file, no colors
                }
            }
        }
    }

    /// Read input from file or stdin
    pub fn read_input(&self, input: Option<PathBuf>) -> Result<String> {
        match input {
            Some(path) if path.to_string_lossy() != "-" => fs::read_to_string(&path)
                .map_err(|e| anyhow!("Failed to read input file '{}': {}", path.display(), e)),
            _ => {
                let mut content = String::new();
                io::stdin().read_to_string(&mut content)?;
                Ok(content)
            }
        }
    }

    /// Write output to file or stdout
    pub fn write_output(&self, output: Option<PathBuf>, content: &str) -> Result<()> {
        let stdout_content = if content.is_empty() || content.ends_with('\n') {
            content.to_string()
        } else {
            format!("{}\n", content)
        };

        match output {
            Some(path) if path.to_string_lossy() != "-" => {
                fs::write(&path, content).map_err(|e| {
                    anyhow!("Failed to write output file '{}': {}", path.display(), e)
                })?;
            }
            _ => {
                print!("{}", stdout_content);
                io::stdout().flush()?;
            }
        }
        Ok(())
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::tempdir;

    const SCENARIO: &str = r#"{
        "stagger_ms": 20,
        "candidates": [
            {"name": "v6", "latency_ms": 2, "outcome": "failure"},
            {"name": "v4", "latency_ms": 2}
        ]
    }"#;

    #[test]
    fn test_cli_parsing_happy_eyes_command() {
        let args = vec![
            "concord",
            "happy-eyes",
            "--input",
            "scenario.json",
            "--stagger-ms",
            "100",
            "--json",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::HappyEyes {
                input,
                output,
                stagger_ms,
                json,
            } => {
                assert_eq!(input.unwrap().to_string_lossy(), "scenario.json");
                assert!(output.is_none());
                assert_eq!(stagger_ms, Some(100));
                assert!(json);
            }
            _ => panic!("Expected HappyEyes command"),
        }
        assert_eq!(cli.color, ColorChoice::Auto); // default
    }

    #[test]
    fn test_cli_parsing_lock_defaults() {
        let cli = Cli::try_parse_from(vec!["concord", "lock"]).unwrap();

        match cli.command {
            Commands::Lock {
                tasks,
                hold_ms,
                json,
                ..
            } => {
                assert_eq!(tasks, 3);
                assert_eq!(hold_ms, 10);
                assert!(!json);
            }
            _ => panic!("Expected Lock command"),
        }
    }

    #[test]
    fn test_cli_parsing_observe_command() {
        let cli = Cli::try_parse_from(vec!["concord", "observe", "-i", "-"]).unwrap();

        match cli.command {
            Commands::Observe { input, .. } => {
                assert_eq!(input.unwrap().to_string_lossy(), "-");
            }
            _ => panic!("Expected Observe command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = vec![
            "concord",
            "lock",
            "--verbose",
            "--color",
            "never",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.color, ColorChoice::Never);
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_read_input_from_file() {
        let app = ConcordApp::new().unwrap();
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("scenario.json");
        fs::write(&file_path, SCENARIO).unwrap();

        let content = app.read_input(Some(file_path)).unwrap();
        assert_eq!(content, SCENARIO);
    }

    #[test]
    fn test_read_input_missing_file() {
        let app = ConcordApp::new().unwrap();
        let dir = tempdir().unwrap();
        let error = app
            .read_input(Some(dir.path().join("missing.json")))
            .unwrap_err();
        assert!(error.to_string().contains("Failed to read input file"));
    }

    #[test]
    fn test_write_output_to_file() {
        let app = ConcordApp::new().unwrap();
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("report.txt");

        app.write_output(Some(file_path.clone()), "Test output").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "Test output");
    }

    #[test]
    fn test_happy_eyes_command_writes_json_report() {
        let app = ConcordApp::new().unwrap();
        let dir = tempdir().unwrap();
        let input = dir.path().join("scenario.json");
        let output = dir.path().join("report.json");
        fs::write(&input, SCENARIO).unwrap();

        app.happy_eyes_command(
            Some(input),
            Some(output.clone()),
            None,
            true,
            ColorChoice::Never,
            false,
        )
        .unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report["winner"], "v4");
        assert_eq!(report["stagger_ms"], 20);
        assert_eq!(report["starts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_happy_eyes_command_fails_on_exhaustion() {
        let app = ConcordApp::new().unwrap();
        let dir = tempdir().unwrap();
        let input = dir.path().join("scenario.json");
        let output = dir.path().join("report.txt");
        fs::write(
            &input,
            r#"{"candidates": [{"name": "v6", "latency_ms": 1, "outcome": "failure"}]}"#,
        )
        .unwrap();

        let error = app
            .happy_eyes_command(
                Some(input),
                Some(output.clone()),
                None,
                false,
                ColorChoice::Never,
                false,
            )
            .unwrap_err();

        assert!(error.to_string().contains("No variants left"));
        assert!(fs::read_to_string(&output).unwrap().contains("v6 refused"));
    }

    #[test]
    fn test_lock_command_report() {
        let app = ConcordApp::new().unwrap();
        let dir = tempdir().unwrap();
        let output = dir.path().join("grants.txt");

        app.lock_command(3, 1, Some(output.clone()), false, ColorChoice::Never, false)
            .unwrap();

        let content = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("task 0 granted ticket 1"));
        assert!(lines[2].starts_with("task 2 granted ticket 3"));
    }

    #[test]
    fn test_observe_command_report() {
        let app = ConcordApp::new().unwrap();
        let dir = tempdir().unwrap();
        let input = dir.path().join("keys.txt");
        let output = dir.path().join("events.txt");
        fs::write(&input, "k1 k2\nk2 k3\n").unwrap();

        app.observe_command(Some(input), Some(output.clone()), false, ColorChoice::Never, false)
            .unwrap();

        let content = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "line 1: +k1 +k2");
        assert_eq!(lines[1], "line 2: -k1 +k3");
        // Teardown order follows the observer's map, not input order
        assert!(lines[2].starts_with("stop: "));
        assert!(lines[2].contains("-k2") && lines[2].contains("-k3"));
    }

    #[test]
    fn test_should_colorize_respects_choice() {
        let app = ConcordApp::new().unwrap();
        assert!(app.should_colorize(&None, ColorChoice::Always));
        assert!(!app.should_colorize(&None, ColorChoice::Never));
        assert!(!app.should_colorize(&Some(PathBuf::from("out.txt")), ColorChoice::Auto));
    }
}
