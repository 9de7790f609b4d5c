use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "teleshell",
    version,
    about = "Summarize Telegram channels with an LLM, resuming from per-channel checkpoints"
)]
pub struct Cli {
    /// Emit the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    /// Debug-level diagnostics on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Summarize channels within a time window.
    Summarize(SummarizeArgs),
    /// Manage the tracked channel list.
    #[command(subcommand)]
    Channels(ChannelsCommand),
    /// Show resolved paths, summarizer settings and checkpoints.
    Status,
}

#[derive(Debug, Args)]
struct SummarizeArgs {
    /// Channels to summarize (comma separated); defaults to the tracked list.
    #[arg(short = 'c', long = "channels", value_delimiter = ',', allow_hyphen_values = true)]
    channels: Vec<String>,
    /// since_last_run, today, yesterday, <N>h or <N>d.
    #[arg(short = 't', long = "time-window", default_value = "since_last_run")]
    time_window: String,
}

#[derive(Debug, Subcommand)]
enum ChannelsCommand {
    /// List tracked channels with titles and checkpoints.
    List,
    /// Track a channel.
    Add {
        #[arg(allow_hyphen_values = true)]
        channel: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Stop tracking a channel and forget its checkpoint.
    Remove {
        #[arg(allow_hyphen_values = true)]
        channel: String,
    },
    /// Pick tracked channels from the dialogs visible to the account.
    Manage,
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report).context("failed to encode report")?;
        println!("{out}");
        return Ok(());
    }

    let state = if report.ok { "ok" } else { "failed" };
    println!("{}: {state}", report.command);
    for line in &report.details {
        println!("  {line}");
    }
    for line in &report.issues {
        eprintln!("  issue: {line}");
    }
    Ok(())
}

pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    tracing::debug!(command = ?cli.command, "starting");

    let report = match cli.command {
        Command::Summarize(args) => commands::summarize::run(&commands::summarize::SummarizeOptions {
            channels: args.channels,
            window: args.time_window,
            json: cli.json,
        })?,
        Command::Channels(ChannelsCommand::List) => commands::channels::list()?,
        Command::Channels(ChannelsCommand::Add { channel, title }) => {
            commands::channels::add(&channel, title.as_deref())?
        }
        Command::Channels(ChannelsCommand::Remove { channel }) => {
            commands::channels::remove(&channel)?
        }
        Command::Channels(ChannelsCommand::Manage) => commands::channels::manage()?,
        Command::Status => commands::status::run()?,
    };

    render(&report, cli.json)?;
    Ok(report.exit_code())
}
