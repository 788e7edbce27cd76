use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::cycle::CycleOptions;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (defaults to <config dir>/paperless-push/config.json).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// API key, overriding the settings file.
    #[arg(long, env = "PAPERLESS_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Paper to upload to, overriding the settings file.
    #[arg(long, env = "PAPERLESS_PAPER_ID", global = true)]
    pub paper_id: Option<String>,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pick a picture and upload it once.
    Upload(UploadArgs),
    /// Upload a fresh picture on a fixed interval until interrupted.
    Run(RunArgs),
    /// Forget which pictures were shown recently.
    ResetRecent,
    /// Print the outcome of the last cycle as JSON.
    Status,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Upload this file from the input directory instead of picking one.
    #[arg(long, value_name = "NAME")]
    pub force_file: Option<String>,

    /// Pick (and publish) without uploading.
    #[arg(long)]
    pub dry_run: bool,

    /// Publish a copy even if the settings disable it.
    #[arg(long, conflicts_with = "no_publish")]
    pub publish: bool,

    /// Skip the published copy for this run.
    #[arg(long = "no-publish")]
    pub no_publish: bool,
}

impl UploadArgs {
    fn publish_override(&self) -> Option<bool> {
        match (self.publish, self.no_publish) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

impl From<&UploadArgs> for CycleOptions {
    fn from(args: &UploadArgs) -> Self {
        CycleOptions {
            force_file: args.force_file.clone(),
            dry_run: args.dry_run,
            publish: args.publish_override(),
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Seconds between cycles (defaults to scan_interval_secs from the settings).
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}
