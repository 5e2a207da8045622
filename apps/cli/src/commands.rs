//! CLI command definitions, routing, and tracing setup.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use euclid_client::ApiClient;
use euclid_core::{DirectorySink, Notification, NotificationLevel, Orchestrator};
use euclid_shared::{
    AppConfig, DatasetPreview, EuclidError, ExportFormat, PipelineStatus, Stage, StageState,
    init_config, load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Width of the text column in preview tables.
const TEXT_PREVIEW_WIDTH: usize = 60;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Euclid: build labelled datasets from the web.
#[derive(Parser)]
#[command(
    name = "euclid",
    version,
    about = "Crawl, label, score and export datasets through the Euclid pipeline service.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Pipeline service address (overrides config and environment).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run crawl, label and score in sequence.
    Run {
        /// Search query describing the data to collect.
        query: String,

        /// Seed URL to crawl (can be specified multiple times).
        #[arg(short, long = "url")]
        urls: Vec<String>,

        /// Export in this format once the pipeline completes.
        #[arg(short, long)]
        export: Option<ExportFormat>,

        /// Directory to save the export into.
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Trigger only the crawl stage.
    Crawl {
        /// Search query describing the data to collect.
        query: String,

        /// Seed URL to crawl (can be specified multiple times).
        #[arg(short, long = "url")]
        urls: Vec<String>,
    },

    /// Trigger only the labeling stage.
    Label,

    /// Trigger only the scoring stage.
    Score,

    /// Download the processed dataset.
    Export {
        /// Export format: csv or jsonl.
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Directory to save the export into.
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Show a page of dataset rows with summary stats.
    Preview {
        /// Rows per page.
        #[arg(short, long)]
        limit: Option<u32>,

        /// Rows to skip.
        #[arg(long, default_value = "0")]
        offset: u32,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Print the analytics payload.
    Analytics,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "euclid=warn",
        1 => "euclid=info",
        2 => "euclid=debug",
        _ => "euclid=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let api_url = cli.api_url.as_deref();

    match cli.command {
        Command::Run {
            query,
            urls,
            export,
            out,
        } => cmd_run(api_url, &query, urls, export, out.as_deref()).await,
        Command::Crawl { query, urls } => cmd_crawl(api_url, &query, urls).await,
        Command::Label => cmd_stage(api_url, Stage::Label).await,
        Command::Score => cmd_stage(api_url, Stage::Score).await,
        Command::Export { format, out } => cmd_export(api_url, format, out.as_deref()).await,
        Command::Preview {
            limit,
            offset,
            json,
        } => cmd_preview(api_url, limit, offset, json).await,
        Command::Analytics => cmd_analytics(api_url).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(api_url).await,
        },
    }
}

/// Loaded config plus the orchestrator built from it.
struct Session {
    config: AppConfig,
    orchestrator: Orchestrator,
}

impl Session {
    fn open(api_url: Option<&str>, out: Option<&str>) -> Result<Self> {
        let config = load_config()?;
        let base_url = api_url
            .map(String::from)
            .unwrap_or_else(|| config.api_base_url());

        let client = ApiClient::new(&base_url)?;
        let out_dir = PathBuf::from(out.unwrap_or(&config.export.output_dir));
        let sink = Arc::new(DirectorySink::new(out_dir));

        info!(%base_url, "connected to pipeline service");

        Ok(Self {
            config,
            orchestrator: Orchestrator::new(client, sink),
        })
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    api_url: Option<&str>,
    query: &str,
    urls: Vec<String>,
    export: Option<ExportFormat>,
    out: Option<&str>,
) -> Result<()> {
    let query = validate_query(query)?;
    let urls = clean_urls(urls);
    let session = Session::open(api_url, out)?;
    let orch = &session.orchestrator;

    info!(
        query,
        seed_urls = urls.as_ref().map_or(0, Vec::len),
        "running pipeline"
    );

    with_progress(orch, orch.run_pipeline(query, urls.as_deref())).await;

    let status = orch.status();
    print_stages(&status);

    if let Some(err) = halted(&status) {
        return Err(err);
    }

    if let Some(format) = export {
        if !status.export_ready() {
            return Err(eyre!("dataset is not ready for export (step: {})", status.step()));
        }
        let artifact = with_progress(orch, orch.export_dataset(format)).await?;
        println!("  Saved:  {} ({} bytes)", artifact.path.display(), artifact.bytes);
    }

    Ok(())
}

async fn cmd_crawl(api_url: Option<&str>, query: &str, urls: Vec<String>) -> Result<()> {
    let query = validate_query(query)?;
    let urls = clean_urls(urls);
    let session = Session::open(api_url, None)?;
    let orch = &session.orchestrator;

    let response = with_progress(orch, orch.start_crawl(query, urls.as_deref())).await?;
    print_stage_result(&orch.status(), &response)
}

async fn cmd_stage(api_url: Option<&str>, stage: Stage) -> Result<()> {
    let session = Session::open(api_url, None)?;
    let orch = &session.orchestrator;

    let response = match stage {
        Stage::Label => with_progress(orch, orch.apply_labeling()).await?,
        Stage::Score => with_progress(orch, orch.score_dataset()).await?,
        other => return Err(eyre!("'{other}' is not a standalone stage command")),
    };
    print_stage_result(&orch.status(), &response)
}

async fn cmd_export(
    api_url: Option<&str>,
    format: Option<ExportFormat>,
    out: Option<&str>,
) -> Result<()> {
    let session = Session::open(api_url, out)?;
    let format = format.unwrap_or(session.config.export.default_format);
    let orch = &session.orchestrator;

    info!(%format, "exporting dataset");

    if let Some(notice) = ungated_export_notice(&orch.status()) {
        eprintln!("  ! {notice}");
    }

    let artifact = with_progress(orch, orch.export_dataset(format)).await?;
    println!();
    println!("  Dataset exported successfully!");
    println!("  Format: {}", artifact.format);
    println!("  Path:   {}", artifact.path.display());
    println!("  Size:   {} bytes", artifact.bytes);
    println!();

    Ok(())
}

async fn cmd_preview(
    api_url: Option<&str>,
    limit: Option<u32>,
    offset: u32,
    json: bool,
) -> Result<()> {
    let session = Session::open(api_url, None)?;
    let limit = limit.unwrap_or(session.config.preview.limit);
    let orch = &session.orchestrator;

    let preview = with_progress(orch, orch.fetch_preview(limit, offset)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        print_preview(&preview);
    }

    Ok(())
}

async fn cmd_analytics(api_url: Option<&str>) -> Result<()> {
    let session = Session::open(api_url, None)?;
    let orch = &session.orchestrator;

    let analytics = with_progress(orch, orch.fetch_analytics()).await?;
    println!("{}", serde_json::to_string_pretty(&analytics)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(api_url: Option<&str>) -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");

    let resolved = api_url
        .map(String::from)
        .unwrap_or_else(|| config.api_base_url());
    println!("# resolved base_url: {resolved}");
    Ok(())
}

/// Short error for a run that stopped early.
///
/// The failing stage has already been reported through its notification, so
/// the reason is not repeated here.
fn halted(status: &PipelineStatus) -> Option<color_eyre::Report> {
    status.error()?;
    Some(eyre!("pipeline halted ({})", status.message()))
}

/// Warning shown when exporting without a completed run in this process.
fn ungated_export_notice(status: &PipelineStatus) -> Option<&'static str> {
    (!status.export_ready()).then_some(
        "No completed pipeline run in this session; exporting whatever dataset the service currently holds.",
    )
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

/// Reject blank queries before anything reaches the service.
fn validate_query(query: &str) -> std::result::Result<&str, EuclidError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(EuclidError::validation("Please enter a search query"));
    }
    Ok(trimmed)
}

/// Trim seed URLs and drop blank ones; `None` when nothing is left.
fn clean_urls(urls: Vec<String>) -> Option<Vec<String>> {
    let cleaned: Vec<String> = urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();

    (!cleaned.is_empty()).then_some(cleaned)
}

// ---------------------------------------------------------------------------
// Progress & output
// ---------------------------------------------------------------------------

/// Drive `fut` while mirroring status and notifications to the terminal.
async fn with_progress<F: Future>(orch: &Orchestrator, fut: F) -> F::Output {
    let bar = progress_bar();
    let mut status_rx = orch.subscribe_status();
    let mut notices = orch.subscribe();

    tokio::pin!(fut);

    let output = loop {
        tokio::select! {
            output = &mut fut => break output,
            Ok(()) = status_rx.changed() => {
                let status = status_rx.borrow_and_update().clone();
                bar.set_position(u64::from(status.progress()));
                bar.set_message(status.message().to_string());
            }
            Ok(notice) = notices.recv() => {
                bar.suspend(|| print_notification(&notice));
            }
        }
    };

    bar.finish_and_clear();
    while let Ok(notice) = notices.try_recv() {
        print_notification(&notice);
    }

    output
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    bar.set_style(style);
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar
}

fn print_notification(notice: &Notification) {
    match notice.level {
        NotificationLevel::Success => println!("  ✓ {}", notice.message),
        NotificationLevel::Error => eprintln!("  ✗ {}", notice.message),
    }
}

fn print_stages(status: &PipelineStatus) {
    println!();
    for stage in Stage::ALL {
        let marker = match status.stage_state(stage) {
            StageState::Completed => "✓",
            StageState::Active => "›",
            StageState::Error => "✗",
            StageState::Pending => "·",
        };
        println!("  {marker} {}", stage.title());
    }
    println!();
    println!("  Status:   {} ({}%)", status.step(), status.progress());
    println!("  Message:  {}", status.message());
    println!();
}

fn print_stage_result(status: &PipelineStatus, response: &serde_json::Value) -> Result<()> {
    println!();
    println!("  Status:   {} ({}%)", status.step(), status.progress());
    println!("  Message:  {}", status.message());
    println!("  Response: {}", serde_json::to_string_pretty(response)?);
    println!();
    Ok(())
}

fn print_preview(preview: &DatasetPreview) {
    println!();
    if let Some(stats) = &preview.stats {
        println!("  Samples:         {}", stats.total_samples);
        println!("  Avg confidence:  {:.1}%", stats.avg_confidence * 100.0);
        println!("  Avg diversity:   {:.1}%", stats.avg_diversity * 100.0);
        println!("  Labels:          {}", stats.label_distribution.len());
        for (label, count) in &stats.label_distribution {
            println!("    {label:<20} {count}");
        }
        println!();
    }

    if preview.data.is_empty() {
        println!("  No rows.");
        println!();
        return;
    }

    println!("  {:<12} {:<14} {:>6}  TEXT", "ID", "LABEL", "CONF");
    for row in &preview.data {
        let confidence = row
            .confidence
            .map(|c| format!("{:.0}%", c * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<12} {:<14} {:>6}  {}",
            truncate(&row.id, 12),
            truncate(row.label.as_deref().unwrap_or("-"), 14),
            confidence,
            truncate(&row.text, TEXT_PREVIEW_WIDTH)
        );
    }
    println!();
}

/// Shorten `s` to at most `max` characters, marking the cut with `…`.
fn truncate(s: &str, max: usize) -> String {
    let single_line = s.replace('\n', " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let kept: String = single_line.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_query_is_rejected() {
        assert!(validate_query("   ").is_err());
        assert_eq!(validate_query("  climate news ").unwrap(), "climate news");
    }

    #[test]
    fn blank_urls_are_dropped() {
        assert_eq!(clean_urls(vec![]), None);
        assert_eq!(clean_urls(vec!["  ".into(), String::new()]), None);
        assert_eq!(
            clean_urls(vec![" https://a.example ".into(), "".into()]),
            Some(vec!["https://a.example".to_string()])
        );
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
        assert_eq!(truncate("line\nbreak", 20), "line break");
    }

    #[test]
    fn cli_parses_run_with_export() {
        let cli = Cli::try_parse_from([
            "euclid",
            "run",
            "climate news",
            "--url",
            "https://a.example",
            "--export",
            "jsonl",
        ])
        .expect("parse");

        match cli.command {
            Command::Run { query, urls, export, .. } => {
                assert_eq!(query, "climate news");
                assert_eq!(urls, vec!["https://a.example".to_string()]);
                assert_eq!(export, Some(ExportFormat::Jsonl));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_rejects_unknown_export_format() {
        assert!(Cli::try_parse_from(["euclid", "export", "--format", "parquet"]).is_err());
    }

    #[test]
    fn halted_run_error_does_not_repeat_reason() {
        let failed = PipelineStatus::failed(Stage::Score, "scoring engine unavailable");
        let err = halted(&failed).expect("halted");
        assert_eq!(err.to_string(), "pipeline halted (Scoring failed)");
        assert!(!err.to_string().contains("scoring engine unavailable"));

        assert!(halted(&PipelineStatus::completed(None)).is_none());
        assert!(halted(&PipelineStatus::idle()).is_none());
    }

    #[test]
    fn export_without_completed_run_is_flagged() {
        assert!(ungated_export_notice(&PipelineStatus::idle()).is_some());
        assert!(
            ungated_export_notice(&PipelineStatus::failed(Stage::Crawl, "refused")).is_some()
        );
        assert!(ungated_export_notice(&PipelineStatus::completed(None)).is_none());
    }
}
