//! cellcfg: offline checker for partition cell descriptors.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "cellcfg", version, about = "Check and inspect partition cell descriptors")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse, validate and dry-run register descriptors; the first file is the root cell
    Check {
        /// Descriptor files, in admission order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Platform preset or .platform.toml path
        #[arg(long, default_value = "generic-arm64")]
        platform: String,
        /// Report every problem in a file instead of the first one
        #[arg(long)]
        all: bool,
    },
    /// Print the contents of a descriptor
    Inspect {
        /// Descriptor file
        file: PathBuf,
        /// Output format (text, json)
        #[arg(long)]
        format: Option<String>,
    },
    /// Manage platform definitions
    Platform {
        #[command(subcommand)]
        action: PlatformAction,
    },
    /// Write the J7200 root and Linux demo descriptors
    Sample {
        /// Output directory
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum PlatformAction {
    /// List built-in presets and platform files
    List {
        /// Directory to search for .platform.toml files
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show a platform definition
    Show {
        /// Preset name or .platform.toml path
        name: String,
        /// Output format (default: human-readable, "toml" for TOML)
        #[arg(long)]
        format: Option<String>,
    },
    /// Create a .platform.toml template
    New {
        /// Platform name
        name: String,
        /// Directory to write the file into
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Check a platform definition for consistency
    Validate {
        /// Preset name or .platform.toml path
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

/// `RUST_LOG` overrides the level picked by `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Check {
            files,
            platform,
            all,
        } => commands::check::run(&files, &platform, all),

        Commands::Inspect { file, format } => commands::inspect::run(&file, format.as_deref()),

        Commands::Platform { action } => match action {
            PlatformAction::List { dir } => commands::platform::list(dir.as_deref()),
            PlatformAction::Show { name, format } => {
                commands::platform::show(&name, format.as_deref())
            }
            PlatformAction::New { name, dir } => commands::platform::new(&name, &dir),
            PlatformAction::Validate { name } => commands::platform::validate(&name),
        },

        Commands::Sample { out_dir } => commands::sample::run(&out_dir),
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// sample → check → inspect on the written files.
    #[test]
    fn sample_check_inspect_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let written = commands::sample::write_samples(dir.path()).unwrap();
        assert_eq!(written.len(), 2);

        let platform = cellcfg_platform::Platform::k3_j7200();
        let registry = commands::check::check_files(&written, &platform, false).unwrap();
        assert_eq!(registry.len(), 2);

        let json = commands::inspect::render(&written[1], "json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "k3-j7200-evm-linux-demo");
    }

    #[test]
    fn platform_file_drives_check() {
        let dir = tempfile::tempdir().unwrap();
        let platform_path = commands::platform::write_template("tiny", dir.path()).unwrap();
        let written = commands::sample::write_samples(dir.path()).unwrap();

        commands::check::run(&written, platform_path.to_str().unwrap(), false).unwrap();
    }

    #[test]
    fn cli_parses() {
        let cli = Cli::try_parse_from(["cellcfg", "-vv", "check", "a.cell", "b.cell"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Check { ref files, .. } if files.len() == 2));

        assert!(Cli::try_parse_from(["cellcfg", "check"]).is_err());
    }
}
