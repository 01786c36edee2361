//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use futures::Stream;
use indicatif::{ProgressBar, ProgressStyle};
use sitescout_crawler::{CrawlRequest, Orchestrator};
use sitescout_discovery::{DiscoveryOptions, ManifestDiscoverer, ManifestProbe};
use sitescout_shared::{AllowList, AppConfig, CrawlConfig, init_config, load_config, load_config_from};
use sitescout_stream::{PumpOutcome, StreamEvent, WireFormat, decode_event_line, pump};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteScout: gather evidence from a bounded set of websites.
#[derive(Parser)]
#[command(
    name = "sitescout",
    version,
    about = "Crawl allow-listed sites, discover llms.txt manifests, and replay answer streams.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.sitescout/sitescout.toml.
    #[arg(long, global = true, env = "SITESCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Client record framing for `replay`.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum ReplayFormat {
    Ndjson,
    Sse,
}

impl From<ReplayFormat> for WireFormat {
    fn from(format: ReplayFormat) -> Self {
        match format {
            ReplayFormat::Ndjson => WireFormat::Ndjson,
            ReplayFormat::Sse => WireFormat::Sse,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl a batch of URLs and print the report as JSON.
    Crawl(CrawlArgs),

    /// Probe a site for an llms.txt manifest.
    Discover {
        /// Any URL on the site.
        url: String,
    },

    /// Replay recorded stream events (NDJSON) as client records.
    Replay {
        /// Event file; stdin when omitted.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output framing.
        #[arg(long, default_value = "ndjson")]
        format: ReplayFormat,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct CrawlArgs {
    /// Absolute URLs to crawl.
    #[arg(required = true)]
    urls: Vec<String>,

    /// Allowed domain (repeatable). Defaults to the hosts of the given URLs.
    #[arg(long = "allow")]
    allow: Vec<String>,

    /// Maximum links kept per page.
    #[arg(long)]
    max_links: Option<usize>,

    /// Skip llms.txt discovery.
    #[arg(long)]
    no_manifests: bool,

    /// Maximum simultaneous page fetches.
    #[arg(long)]
    concurrency: Option<u32>,

    /// Per-page timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
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

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout only
/// carries records.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitescout=info",
        1 => "sitescout=debug",
        _ => "sitescout=trace",
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
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Crawl(args) => cmd_crawl(&config, args).await,
        Command::Discover { url } => cmd_discover(&config, &url).await,
        Command::Replay { input, format } => cmd_replay(&config, input, format.into()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// crawl
// ---------------------------------------------------------------------------

async fn cmd_crawl(config: &AppConfig, args: CrawlArgs) -> Result<()> {
    let mut crawl = CrawlConfig::from(config);
    if let Some(concurrency) = args.concurrency {
        crawl.concurrency = concurrency;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        crawl.timeout_secs = timeout_secs;
    }
    if let Some(max_links) = args.max_links {
        crawl.max_links_per_page = max_links;
    }
    if args.no_manifests {
        crawl.discover_manifests = false;
    }
    crawl.validate()?;

    for url in &args.urls {
        Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    }

    let allowed = if args.allow.is_empty() {
        AllowList::from_start_urls(&args.urls).entries()
    } else {
        args.allow
    };

    info!(
        urls = args.urls.len(),
        allowed = ?allowed,
        concurrency = crawl.concurrency,
        "crawling"
    );

    let request = CrawlRequest::new(args.urls, allowed)
        .with_max_links(crawl.max_links_per_page)
        .with_manifests(crawl.discover_manifests);
    let orchestrator = Orchestrator::from_config(&crawl)?;

    let spinner = spinner(format!("Crawling {} pages...", request.urls.len()))?;
    let report = orchestrator.crawl(&request).await;
    spinner.finish_and_clear();

    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed = report.failed().count();
    if failed > 0 {
        warn!(failed, total = report.len(), "some pages failed");
    }
    Ok(())
}

fn spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}

// ---------------------------------------------------------------------------
// discover
// ---------------------------------------------------------------------------

async fn cmd_discover(config: &AppConfig, url: &str) -> Result<()> {
    let site = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    let discoverer = ManifestDiscoverer::new(&DiscoveryOptions {
        user_agent: config.crawl.user_agent.clone(),
        ..DiscoveryOptions::default()
    })?;

    let Some(manifest) = discoverer.discover_manifest(&site).await else {
        println!("No llms.txt manifest found for {url}");
        return Ok(());
    };

    println!("  Manifest: {}", manifest.url);
    println!("  Title:    {}", manifest.doc.title);
    if let Some(summary) = &manifest.doc.summary {
        println!("  Summary:  {summary}");
    }
    println!();
    for section in &manifest.doc.sections {
        if let Some(title) = &section.title {
            println!("  {title}");
        }
        for link in &section.links {
            match &link.notes {
                Some(notes) => println!("    - {} ({}): {notes}", link.name, link.href),
                None => println!("    - {} ({})", link.name, link.href),
            }
        }
    }
    println!();
    println!("  {} entry URLs", manifest.entry_urls().len());
    Ok(())
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

async fn cmd_replay(config: &AppConfig, input: Option<PathBuf>, format: WireFormat) -> Result<()> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| eyre!("cannot open {}: {e}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(config.stream.channel_capacity.max(1));
    let handle = tokio::spawn(pump(event_lines(reader), tx, cancel.clone()));

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut stdout = tokio::io::stdout();
    while let Some(event) = rx.recv().await {
        stdout.write_all(format.encode(&event)?.as_bytes()).await?;
        stdout.flush().await?;
    }

    let outcome = handle.await?;
    match outcome {
        PumpOutcome::Completed | PumpOutcome::Errored => info!(?outcome, "replay finished"),
        _ => warn!(?outcome, "replay ended before the answer finished"),
    }
    Ok(())
}

/// Stream events from NDJSON lines. Malformed lines are logged and skipped.
fn event_lines<R>(reader: R) -> impl Stream<Item = StreamEvent> + Send
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    futures::stream::unfold((reader.lines(), 0usize), |(mut lines, mut line_no)| async move {
        loop {
            line_no += 1;
            match lines.next_line().await {
                Ok(Some(line)) => match decode_event_line(&line) {
                    Ok(Some(event)) => return Some((event, (lines, line_no))),
                    Ok(None) => continue,
                    Err(e) => warn!(line = line_no, error = %e, "skipping malformed event"),
                },
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "failed to read events");
                    return None;
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn crawl_flags_parse() {
        let cli = Cli::try_parse_from([
            "sitescout",
            "crawl",
            "https://a.com/p1",
            "https://b.com/p2",
            "--allow",
            "a.com",
            "--allow",
            "*.b.com",
            "--max-links",
            "10",
            "--no-manifests",
        ])
        .unwrap();

        let Command::Crawl(args) = cli.command else {
            panic!("expected crawl");
        };
        assert_eq!(args.urls.len(), 2);
        assert_eq!(args.allow, vec!["a.com", "*.b.com"]);
        assert_eq!(args.max_links, Some(10));
        assert!(args.no_manifests);
    }

    #[test]
    fn replay_format_defaults_to_ndjson() {
        let cli = Cli::try_parse_from(["sitescout", "replay"]).unwrap();
        let Command::Replay { input, format } = cli.command else {
            panic!("expected replay");
        };
        assert!(input.is_none());
        assert_eq!(WireFormat::from(format), WireFormat::Ndjson);
    }

    #[tokio::test]
    async fn event_lines_skip_blank_and_malformed_lines() {
        let input = "{\"kind\":\"started\",\"seq\":0}\n\nnot json\n{\"kind\":\"error\",\"seq\":1,\"message\":\"x\"}\n";
        let events: Vec<StreamEvent> = event_lines(BufReader::new(input.as_bytes())).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind(), "error");
    }
}
