//! flywheel cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file
    ///
    /// Defaults to $HOME/.flywheel.yaml when it exists.
    #[clap(long = "config", global(true))]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rewrite an nginx configuration using redis keys as the value provider
    Redis(RedisCommand),

    /// Rewrite an nginx configuration using a local values file as the value provider
    File(FileCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct RedisCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Redis endpoint, e.g. redis://127.0.0.1:6379
    ///
    /// Can be specified multiple times, the first reachable endpoint is used.
    #[clap(short = 'e', long = "endpoint")]
    pub endpoints: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct FileCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// YAML or JSON file mapping keys to a value or a list of values
    #[clap(long = "values")]
    pub values: PathBuf,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Path of the root nginx configuration file
    ///
    /// A file ending in .json is read as a pre-parsed (crossplane) payload.
    #[clap(short = 's', long = "source")]
    pub source: PathBuf,

    /// Do not follow include directives
    #[clap(long = "single-file")]
    pub single_file: bool,

    /// Prefix to strip from file paths to produce lookup keys
    #[clap(long = "strip-prefix")]
    pub strip_prefix: Option<String>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    /// Directory to write the rewritten configuration to
    ///
    /// Files keep their location relative to the source file. Without a destination the source
    /// files are replaced. Warning: existing files are truncated.
    #[clap(short = 'd', long = "destination")]
    pub destination: Option<PathBuf>,

    #[arg(short = 'm', long = "mode", default_value_t)]
    pub mode: WriteMode,

    /// Directory to create the staging directory in
    ///
    /// Must be on the same filesystem as the output. Defaults to the output directory.
    #[clap(long = "staging-dir")]
    pub staging_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Default, Debug, PartialEq)]
pub enum WriteMode {
    /// Render all files first, replace them only if every file rendered
    #[default]
    Staged,
    /// Overwrite each file directly
    InPlace,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Staged => f.write_str("staged"),
            WriteMode::InPlace => f.write_str("in-place"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Print the parsed payload
    Parse {
        #[arg(short = 'F', long = "output-format", default_value_t)]
        format: OutputFormat,
    },
    /// Print the lookup key of every directive
    Keys,
    /// Print directives that a provider would add to each file
    NewDirectives {
        #[clap(short = 'e', long = "endpoint")]
        endpoints: Vec<String>,

        #[clap(long = "values", conflicts_with("endpoints"))]
        values: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
