use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pvcs_format::DescriptorType;

#[derive(Parser)]
#[command(
    name = "pvcs",
    about = "Portable VCS descriptor encoder and checker",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with a `[decode]` table
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write one descriptor in canonical form
    Encode(EncodeArgs),
    /// Print every descriptor in a stream
    Decode(DecodeArgs),
    /// Verify that a stream holds only valid descriptors
    Check(CheckArgs),
}

#[derive(Args)]
pub struct EncodeArgs {
    /// Object name of the referenced content
    #[arg(long)]
    pub object: String,
    /// `file` or `folder`
    #[arg(long = "type", default_value = "file")]
    pub kind: DescriptorType,
    /// File or folder name
    #[arg(long)]
    pub name: String,
    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct DecodeLimits {
    /// Reject text fields longer than this many bytes
    #[arg(long)]
    pub max_field_len: Option<usize>,
    /// Replace invalid UTF-8 instead of rejecting it
    #[arg(long)]
    pub lossy: bool,
}

#[derive(Args)]
pub struct DecodeArgs {
    /// Input file (stdin if omitted)
    pub input: Option<PathBuf>,
    #[command(flatten)]
    pub limits: DecodeLimits,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Input file (stdin if omitted)
    pub input: Option<PathBuf>,
    #[command(flatten)]
    pub limits: DecodeLimits,
}
