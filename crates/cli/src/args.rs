// crates/cli/src/args.rs
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stemsmith", version, about = "Submit WAV files for stem separation and track the jobs")]
pub struct Cli {
    /// Service endpoint. Falls back to STEMSMITH_ENDPOINT, then the last one used.
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,
    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    /// Log JSON lines to stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
    /// Also write logs to a daily file in the cache directory.
    #[arg(long, global = true)]
    pub log_file: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Upload a WAV file and start a separation job.
    Submit(SubmitArgs),
    /// Show a job's status.
    Status(StatusArgs),
    /// Ask the service to cancel a job.
    Cancel(JobIdArgs),
    /// Download a completed job's stems.
    Download(DownloadArgs),
    /// Check that the service is reachable.
    Health(HealthArgs),
    /// Show or change the saved service endpoint.
    Endpoint(EndpointArgs),
    /// List model profiles and the stems they produce.
    Profiles,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// WAV file to separate.
    pub file: PathBuf,
    /// Model profile key.
    #[arg(long, value_name = "KEY")]
    pub model: Option<String>,
    /// Stem to produce (repeatable). Omit for every stem of the profile.
    #[arg(long = "stem", value_name = "NAME", action = ArgAction::Append)]
    pub stems: Vec<String>,
    /// Follow the job until it settles.
    #[arg(long)]
    pub watch: bool,
    /// Download the stems here once the job completes. Implies --watch.
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
    /// While watching, Ctrl-C cancels the job instead of detaching.
    #[arg(long)]
    pub cancel_on_interrupt: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    pub job_id: String,
    /// Follow the job until it settles.
    #[arg(long)]
    pub watch: bool,
    /// Print the job view as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct JobIdArgs {
    pub job_id: String,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    pub job_id: String,
    /// Target directory. Defaults to the user's download directory.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Keep probing and print each change.
    #[arg(long)]
    pub watch: bool,
}

#[derive(Args, Debug)]
pub struct EndpointArgs {
    #[command(subcommand)]
    pub cmd: Option<EndpointCmd>,
}

#[derive(Subcommand, Debug)]
pub enum EndpointCmd {
    /// Print the endpoint in use.
    Show,
    /// Validate and save a new endpoint.
    Set { url: String },
}
