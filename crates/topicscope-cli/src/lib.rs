//! `tsv`: browse, search, and prune topic data from the terminal.
//!
//! Every command drives the same [`PageController`] the data view uses, with
//! history persisted to a JSON file so consecutive runs pick up where the last
//! one left off.

#![forbid(unsafe_code)]

pub mod output;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use topicscope_client::{HttpSearchTransport, HttpTopicApi, SearchTransport, TopicApi};
use topicscope_core::{
    Config, Filter, MessageRecord, PartitionSelector, RawRecord, SortOrder, timestamps,
};
use topicscope_session::{
    FileHistory, HistorySync, Location, Notice, PageController, PageEvent, PageFetcher,
};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("exit code {0}")]
    ExitCode(i32),
    #[error(transparent)]
    Core(#[from] topicscope_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "tsv", version, about = "Browse and search Kafka topic data")]
pub struct Cli {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Log at debug level (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Write records as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

/// Which backend and topic to talk to. Unset values come from the environment.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    #[arg(long, global = true, env = "TOPICSCOPE_CLUSTER")]
    pub cluster: Option<String>,
    #[arg(long, global = true, env = "TOPICSCOPE_TOPIC")]
    pub topic: Option<String>,
    /// Backend base URL (scheme, host, port).
    #[arg(long, global = true, env = "TOPICSCOPE_API_URL")]
    pub api_url: Option<String>,
    #[arg(long, global = true, env = "TOPICSCOPE_HISTORY_FILE")]
    pub history_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch pages of records for the current filter.
    Browse {
        #[command(flatten)]
        filter: FilterArgs,
        /// Number of pages to load.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        pages: u32,
    },
    /// Stream matching records until the backend finishes or Ctrl-C.
    Search {
        term: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Tombstone one record key.
    Delete {
        #[arg(long)]
        key: String,
        #[arg(long)]
        partition: u32,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// Walk or inspect the saved filter history of a topic.
    History {
        #[command(subcommand)]
        action: HistoryCommand,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCommand {
    Show,
    Back,
    Forward,
}

/// Filter fields to change before loading. Anything unset keeps the value
/// restored from history.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(long)]
    pub sort: Option<SortOrder>,
    /// `All` or a partition index.
    #[arg(long)]
    pub partition: Option<PartitionSelector>,
    /// Only records at or after this instant (RFC 3339 or `YYYY-MM-DD`).
    #[arg(long = "since", alias = "timestamp", value_parser = parse_timestamp)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Resume cursor such as `0-100_2-55`; `-` clears it.
    #[arg(long)]
    pub after: Option<String>,
    /// Start from the default filter instead of the one in history.
    #[arg(long)]
    pub reset: bool,
}

impl FilterArgs {
    /// `base` with every flag that was given applied on top.
    #[must_use]
    pub fn apply(&self, base: Filter) -> Filter {
        let mut filter = if self.reset { Filter::default() } else { base };
        if let Some(sort) = self.sort {
            filter.sort = sort;
        }
        if let Some(partition) = self.partition {
            filter.partition = partition;
        }
        if self.timestamp.is_some() {
            filter.set_timestamp(self.timestamp);
        }
        if let Some(after) = &self.after {
            let after = after.trim();
            filter.set_after((!after.is_empty() && after != "-").then(|| after.to_string()));
        }
        filter
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    timestamps::parse_instant(raw)
        .ok_or_else(|| format!("expected RFC 3339 or YYYY-MM-DD, got {raw:?}"))
}

#[must_use]
pub fn run() -> i32 {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match execute(cli) {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            err_exit_code(&err)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

const fn err_exit_code(err: &CliError) -> i32 {
    match err {
        CliError::ExitCode(code) => *code,
        CliError::InvalidArgument(_) => 2,
        _ => 1,
    }
}

fn emit_error(err: &CliError) {
    if matches!(err, CliError::ExitCode(_)) {
        return;
    }
    eprintln!("error: {err}");
}

fn execute(cli: Cli) -> CliResult<()> {
    let target = resolve_target(&cli.target)?;
    if let Commands::History { action } = cli.command {
        return handle_history(&target, action, cli.json);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        match cli.command {
            Commands::Browse { filter, pages } => {
                handle_browse(&target, &filter, pages, cli.json).await
            }
            Commands::Search { term, filter } => {
                handle_search(&target, term, &filter, cli.json).await
            }
            Commands::Delete {
                key,
                partition,
                yes,
            } => handle_delete(&target, key, partition, yes).await,
            Commands::History { .. } => Ok(()),
        }
    })
}

// ──────────────────────────────────────────────────────────────────────
// Target resolution
// ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Target {
    config: Config,
    cluster: String,
    topic: String,
}

impl Target {
    fn location(&self) -> Location {
        Location::topic_data(&self.cluster, &self.topic)
    }
}

fn resolve_target(args: &TargetArgs) -> CliResult<Target> {
    let mut config = Config::from_env()?;
    if let Some(url) = &args.api_url {
        config.api_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(file) = &args.history_file {
        config.history_file.clone_from(file);
    }
    let cluster = args
        .cluster
        .clone()
        .or_else(|| config.default_cluster.clone())
        .ok_or_else(|| {
            CliError::InvalidArgument("no cluster: pass --cluster or set TOPICSCOPE_CLUSTER".into())
        })?;
    let topic = args
        .topic
        .clone()
        .or_else(|| config.default_topic.clone())
        .ok_or_else(|| {
            CliError::InvalidArgument("no topic: pass --topic or set TOPICSCOPE_TOPIC".into())
        })?;
    debug!(cluster = %cluster, topic = %topic, api = %config.api_base(), "resolved target");
    Ok(Target {
        config,
        cluster,
        topic,
    })
}

/// Build a controller for `target`, applying `filter` to the restored query.
fn open_controller(
    target: &Target,
    filter: Option<&FilterArgs>,
) -> CliResult<PageController<FileHistory>> {
    let config = &target.config;
    let api: Arc<dyn TopicApi> = Arc::new(HttpTopicApi::new(config)?);
    let transport: Arc<dyn SearchTransport> = Arc::new(HttpSearchTransport::new(config)?);
    let mut history = FileHistory::open(&config.history_file, target.location())?;

    if let Some(args) = filter {
        let restored = history.restore();
        let query = args.apply(Filter::parse(&restored)).build();
        if query != restored {
            history.push(&query)?;
        }
    }

    let fetcher = PageFetcher::new(api, &target.cluster, &target.topic, config.capabilities);
    Ok(PageController::new(fetcher, transport, history)
        .with_search_max_duration(config.search_max_duration))
}

/// Print notices to stderr; returns whether any was an error.
fn report(notices: &[Notice]) -> bool {
    let mut failed = false;
    for notice in notices {
        if notice.is_error() {
            failed = true;
            eprintln!("error: {notice}");
        } else {
            eprintln!("{notice}");
        }
    }
    failed
}

// ──────────────────────────────────────────────────────────────────────
// Commands
// ──────────────────────────────────────────────────────────────────────

async fn handle_browse(
    target: &Target,
    filter: &FilterArgs,
    pages: u32,
    json: bool,
) -> CliResult<()> {
    let mut ctrl = open_controller(target, Some(filter))?;
    let mut failed = report(&ctrl.mount());
    failed |= report(&ctrl.settle().await);

    for _ in 1..pages {
        if failed || ctrl.state().is_last_page() {
            break;
        }
        failed |= report(&ctrl.dispatch(PageEvent::NextPage));
        failed |= report(&ctrl.settle().await);
    }

    let state = ctrl.state();
    output::write_records(&mut io::stdout().lock(), state, &state.page().records, json)?;
    output::write_page_summary(&mut io::stderr().lock(), state)?;
    ctrl.unmount();

    if failed {
        Err(CliError::ExitCode(1))
    } else {
        Ok(())
    }
}

async fn handle_search(
    target: &Target,
    term: String,
    filter: &FilterArgs,
    json: bool,
) -> CliResult<()> {
    let mut ctrl = open_controller(target, Some(filter))?;
    let mut failed = report(&ctrl.mount());
    failed |= report(&ctrl.dispatch(PageEvent::SearchSubmitted(term)));

    let mut shown = 0;
    let mut last_percent = None;
    loop {
        tokio::select! {
            batch = ctrl.step() => {
                let Some(notices) = batch else { break };
                failed |= report(&notices);
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "could not listen for Ctrl-C");
                }
                failed |= report(&ctrl.dispatch(PageEvent::StopSearch));
            }
        }

        let state = ctrl.state();
        let records = &state.page().records;
        if records.len() < shown {
            shown = 0;
        }
        output::write_records(&mut io::stdout().lock(), state, &records[shown..], json)?;
        shown = records.len();

        let search = state.search();
        if search.is_running() && last_percent != Some(search.percent()) {
            last_percent = Some(search.percent());
            eprintln!("searching: {:.2}%", search.percent());
        }
    }

    ctrl.unmount();
    if failed {
        Err(CliError::ExitCode(1))
    } else {
        Ok(())
    }
}

async fn handle_delete(target: &Target, key: String, partition: u32, yes: bool) -> CliResult<()> {
    let mut ctrl = open_controller(target, None)?;
    let mut failed = report(&ctrl.mount());
    failed |= report(&ctrl.settle().await);
    if failed {
        return Err(CliError::ExitCode(1));
    }

    let record = MessageRecord::from(RawRecord {
        key: Some(key),
        partition,
        ..RawRecord::default()
    });
    if report(&ctrl.dispatch(PageEvent::DeleteRequested(record))) {
        return Err(CliError::ExitCode(1));
    }
    let Some(prompt) = ctrl.state().delete_prompt() else {
        return Err(CliError::ExitCode(1));
    };
    if !yes && !confirm(&prompt)? {
        ctrl.dispatch(PageEvent::DeleteCancelled);
        eprintln!("cancelled");
        return Ok(());
    }

    let mut failed = report(&ctrl.dispatch(PageEvent::DeleteConfirmed));
    failed |= report(&ctrl.settle().await);
    ctrl.unmount();
    if failed {
        Err(CliError::ExitCode(1))
    } else {
        Ok(())
    }
}

fn confirm(prompt: &str) -> CliResult<bool> {
    let mut stderr = io::stderr().lock();
    write!(stderr, "{prompt} [y/N] ")?;
    stderr.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn handle_history(target: &Target, action: HistoryCommand, json: bool) -> CliResult<()> {
    let mut history = FileHistory::open(&target.config.history_file, target.location())?;
    let location = target.location();
    let restored = match action {
        HistoryCommand::Show => {
            let stack = history.stack();
            output::write_history(&mut io::stdout().lock(), &location.path, &stack, json)?;
            return Ok(());
        }
        HistoryCommand::Back => history.back()?,
        HistoryCommand::Forward => history.forward()?,
    };
    match restored {
        Some(query) => {
            println!("{}", Location { query, ..location }.href());
            Ok(())
        }
        None => {
            eprintln!("no further history in that direction");
            Err(CliError::ExitCode(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn browse_parses_filter_flags() {
        let cli = Cli::try_parse_from([
            "tsv", "--cluster", "local", "--topic", "orders", "browse", "--sort", "newest",
            "--partition", "2", "--pages", "3",
        ])
        .unwrap();
        assert_eq!(cli.target.cluster.as_deref(), Some("local"));
        let Commands::Browse { filter, pages } = cli.command else {
            panic!("expected browse");
        };
        assert_eq!(pages, 3);
        assert_eq!(filter.sort, Some(SortOrder::Newest));
        assert_eq!(filter.partition, Some(PartitionSelector::Partition(2)));
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "tsv", "search", "timeout", "--topic", "orders", "-v", "--json",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.json);
        assert_eq!(cli.target.topic.as_deref(), Some("orders"));
        assert!(matches!(cli.command, Commands::Search { ref term, .. } if term == "timeout"));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Cli::try_parse_from(["tsv", "browse", "--sort", "sideways"]).is_err());
        assert!(Cli::try_parse_from(["tsv", "browse", "--pages", "0"]).is_err());
        assert!(Cli::try_parse_from(["tsv", "browse", "--since", "yesterday"]).is_err());
        assert!(Cli::try_parse_from(["tsv", "delete", "--key", "some-key"]).is_err());
    }

    #[test]
    fn delete_and_history_parse() {
        let cli = Cli::try_parse_from([
            "tsv", "delete", "--key", "order-1", "--partition", "4", "-y",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Delete { ref key, partition: 4, yes: true } if key == "order-1"
        ));
        let cli = Cli::try_parse_from(["tsv", "history", "back"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::History {
                action: HistoryCommand::Back
            }
        ));
    }

    #[test]
    fn filter_args_override_restored_filter() {
        let base = Filter::parse("sort=Newest&partition=1&after=1-40&search=err");
        let args = FilterArgs {
            partition: Some(PartitionSelector::All),
            timestamp: parse_timestamp("2023-01-01").ok(),
            ..FilterArgs::default()
        };
        assert_eq!(
            args.apply(base.clone()).build(),
            "sort=Newest&after=1-40&timestamp=2023-01-01T00:00:00.000Z&search=err"
        );

        let clear = FilterArgs {
            after: Some("-".into()),
            ..FilterArgs::default()
        };
        assert_eq!(clear.apply(base.clone()).after, None);

        let reset = FilterArgs {
            reset: true,
            sort: Some(SortOrder::Newest),
            ..FilterArgs::default()
        };
        assert_eq!(reset.apply(base).build(), "sort=Newest");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(err_exit_code(&CliError::ExitCode(3)), 3);
        assert_eq!(err_exit_code(&CliError::InvalidArgument("x".into())), 2);
        assert_eq!(
            err_exit_code(&CliError::Core(topicscope_core::Error::Config("x".into()))),
            1
        );
    }
}
