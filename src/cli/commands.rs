//! CLI argument definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Packages serverless function sources into deployable archives
#[derive(Parser, Debug)]
#[command(
    name = "fnpack",
    about = "Packages serverless function sources into deployable archives",
    version,
    long_about = "fnpack discovers function sources (Node/TypeScript, Go, Rust) in the \
                  given directories, computes each function's runtime file closure, and \
                  packages it into a deployable archive with routes, schedules and \
                  native-module metadata."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Verbose output")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Package functions from the given directories",
        long_about = "Discovers, builds and packages every function found in the given \
                      source directories.\n\n\
                      Examples:\n  \
                      fnpack pack ./functions --out ./dist\n  \
                      fnpack pack ./functions ./more-functions --out ./dist --format none\n  \
                      fnpack pack ./functions --out ./dist --config fnpack.json --manifest manifest.json"
    )]
    Pack(PackArgs),

    #[command(
        about = "List discovered functions without building",
        long_about = "Runs discovery and classification only.\n\n\
                      Examples:\n  \
                      fnpack list ./functions\n  \
                      fnpack list ./functions --format json"
    )]
    List(ListArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct PackArgs {
    #[arg(value_name = "DIRS", required = true, help = "Function source directories")]
    pub dirs: Vec<PathBuf>,

    #[arg(short = 'o', long, value_name = "DIR", help = "Destination directory")]
    pub out: PathBuf,

    #[arg(
        long,
        value_enum,
        default_value = "zip",
        help = "Archive format for produced functions"
    )]
    pub format: ArchiveFormatArg,

    #[arg(long, value_name = "FILE", help = "Per-function configuration file (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Write a run manifest to this file")]
    pub manifest: Option<PathBuf>,

    #[arg(long, help = "Keep every match when a name is claimed by several runtimes")]
    pub no_dedupe: bool,

    #[arg(long, value_name = "N", help = "Worker pool size")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Force the dependency-trace bundler for all Node functions")]
    pub trace: bool,

    #[arg(
        short = 'f',
        long = "output",
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub output: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    #[arg(value_name = "DIRS", required = true, help = "Function source directories")]
    pub dirs: Vec<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Per-function configuration file (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Keep every match when a name is claimed by several runtimes")]
    pub no_dedupe: bool,

    #[arg(
        short = 'f',
        long = "output",
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub output: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormatArg {
    Zip,
    None,
}

impl From<ArchiveFormatArg> for crate::archive::ArchiveFormat {
    fn from(arg: ArchiveFormatArg) -> Self {
        match arg {
            ArchiveFormatArg::Zip => crate::archive::ArchiveFormat::Zip,
            ArchiveFormatArg::None => crate::archive::ArchiveFormat::None,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Human,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_args_parse() {
        let args = CliArgs::try_parse_from([
            "fnpack", "pack", "./functions", "--out", "./dist", "--format", "none", "--trace",
        ])
        .unwrap();
        match args.command {
            Commands::Pack(pack) => {
                assert_eq!(pack.dirs, vec![PathBuf::from("./functions")]);
                assert_eq!(pack.out, PathBuf::from("./dist"));
                assert_eq!(pack.format, ArchiveFormatArg::None);
                assert!(pack.trace);
                assert!(!pack.no_dedupe);
            }
            other => panic!("expected pack, got {:?}", other),
        }
    }

    #[test]
    fn test_pack_requires_dirs() {
        assert!(CliArgs::try_parse_from(["fnpack", "pack", "--out", "./dist"]).is_err());
    }

    #[test]
    fn test_list_args_parse() {
        let args =
            CliArgs::try_parse_from(["fnpack", "list", "./functions", "--output", "json"]).unwrap();
        match args.command {
            Commands::List(list) => {
                assert_eq!(list.output, OutputFormatArg::Json);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }
}
