use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use soundpull::fetch::{GENERATED_EXTENSION, RECORDING_BASE_NAME};
use soundpull::storage::missing_files;
use soundpull::{
    ApiEndpoint, Catalog, Config, DetailResolver, ErrorKind, FfmpegMerger, Fetcher,
    NewCatalogEntry, NoopReporter, ProgressEvent, ProgressReporter, ReqwestClient, RequestState,
    SharedProgressReporter, SoundBrowser, SqliteCatalog, load_config, load_default_config,
    merge_and_catalog, player_from_config, recorder_from_config, scan_storage_root,
    unique_file_name,
};

// Emoji with fallback for terminals without Unicode support
static SPEAKER: Emoji<'_, '_> = Emoji("🔊 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");
static MIXER: Emoji<'_, '_> = Emoji("🎛️  ", "[m] ");
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "[r] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

/// Search, download, mix and play sounds from Wikimedia Commons
#[derive(Parser, Debug)]
#[command(name = "soundpull")]
#[command(about = "Search, download, mix and play sounds from Wikimedia Commons")]
#[command(version)]
struct Args {
    /// Path to a configuration file
    #[arg(short, long, global = true, env = "SOUNDPULL_CONFIG")]
    config: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search for audio files
    Search {
        /// Search terms
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Show the download URL of a file
    Details {
        /// File title, e.g. "File:Rain.ogg"
        title: String,
    },

    /// Download a file and add it to the catalog
    Fetch {
        /// File title, e.g. "File:Rain.ogg"
        title: String,
    },

    /// List cataloged sounds
    List {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a catalog entry
    Delete {
        /// Catalog id
        id: i64,

        /// Also delete the file from disk
        #[arg(long)]
        remove_file: bool,
    },

    /// Remove all catalog entries
    Clear,

    /// Mix two audio files into a new cataloged file
    Merge { first: PathBuf, second: PathBuf },

    /// Play a catalog id, local file or URL
    Play { source: String },

    /// Record from the microphone until Ctrl-C
    Record,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchStarting {
                display_name,
                content_length,
            } => {
                self.bar.set_length(content_length.unwrap_or(0));
                self.bar.set_position(0);
                self.bar.set_message(truncate_title(&display_name, 40));
            }

            ProgressEvent::FetchProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                if let Some(total) = total_bytes {
                    self.bar.set_length(total);
                }
                self.bar.set_position(bytes_downloaded);
            }

            ProgressEvent::FetchCompleted {
                display_name,
                bytes_downloaded,
                local_path,
            } => {
                self.bar.set_position(bytes_downloaded);
                self.bar.finish_and_clear();
                println!(
                    "{SUCCESS}{} {}",
                    truncate_title(&display_name, 40).green(),
                    local_path.display().to_string().dimmed()
                );
            }

            ProgressEvent::FetchFailed {
                display_name,
                error,
            } => {
                self.bar.abandon_with_message(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&display_name, 30).red(),
                    error.red()
                ));
            }

            ProgressEvent::PartialFilesCleanedUp { count } => {
                if count > 0 {
                    println!(
                        "{BROOM}Removed {} leftover partial download(s)",
                        count.to_string().yellow()
                    );
                }
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_message(message);
    bar
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NetworkFailure => "network failure",
        ErrorKind::ApiError => "server error",
        ErrorKind::EmptyResponse => "empty response",
        ErrorKind::NotFound => "not found",
        ErrorKind::Filesystem => "filesystem error",
        ErrorKind::ExternalProcess => "external program failed",
        ErrorKind::Superseded => "cancelled",
    }
}

fn settled_value<T>(state: RequestState<T>) -> Result<T> {
    match state {
        RequestState::Success(value) => Ok(value),
        RequestState::Error(failure) => bail!("{}: {}", kind_label(failure.kind), failure.message),
        RequestState::Loading => bail!("request did not finish"),
    }
}

fn init_tracing(quiet: bool) {
    let default_filter = if quiet { "warn" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn http_client(config: &Config) -> Result<Arc<ReqwestClient>> {
    let client = ReqwestClient::new(
        config.api.timeout(),
        config.api.connect_timeout(),
        config.api.read_timeout(),
    )
    .context("Failed to build HTTP client")?;
    Ok(Arc::new(client))
}

fn api_endpoint(config: &Config) -> Result<ApiEndpoint> {
    ApiEndpoint::from_config(&config.api)
        .with_context(|| format!("Invalid API base URL '{}'", config.api.base_url))
}

fn open_catalog(config: &Config) -> Result<Arc<SqliteCatalog>> {
    let catalog = SqliteCatalog::open(&config.storage.catalog_path).with_context(|| {
        format!(
            "Failed to open catalog at {}",
            config.storage.catalog_path.display()
        )
    })?;
    Ok(Arc::new(catalog))
}

async fn run_search(config: &Config, query: &str, quiet: bool) -> Result<()> {
    let browser = SoundBrowser::new(http_client(config)?, api_endpoint(config)?);

    let progress = (!quiet).then(|| spinner(format!("{SEARCH}Searching for {}", query.cyan())));
    let state = browser.search(query).settled().await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    let results = settled_value(state).context("Search failed")?;
    if results.is_empty() {
        println!("No sounds found for {}", query.yellow());
        return Ok(());
    }

    for result in &results {
        println!(
            "  {HEADPHONES}{} {}",
            result.title.green(),
            format!("#{}", result.identifier).dimmed()
        );
    }
    Ok(())
}

async fn run_details(config: &Config, title: &str) -> Result<()> {
    let browser = SoundBrowser::new(http_client(config)?, api_endpoint(config)?);
    let details = settled_value(browser.resolve_details(title).settled().await)
        .with_context(|| format!("Failed to resolve '{title}'"))?;

    println!("{HEADPHONES}{}", details.title.bold().green());
    println!("  {} {}", "file:".dimmed(), details.direct_url.cyan());
    if let Some(page) = &details.description_url {
        println!("  {} {}", "page:".dimmed(), page);
    }
    Ok(())
}

async fn run_fetch(config: &Config, title: &str, quiet: bool) -> Result<()> {
    let client = http_client(config)?;
    let details = DetailResolver::new(Arc::clone(&client), api_endpoint(config)?)
        .resolve_details(title)
        .await
        .with_context(|| format!("Failed to resolve '{title}'"))?;

    let reporter: SharedProgressReporter = if quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };

    let storage = scan_storage_root(&config.storage.root_dir)
        .context("Failed to prepare storage directory")?;
    reporter.report(ProgressEvent::PartialFilesCleanedUp {
        count: storage.partial_files_cleaned,
    });

    let fetcher = Fetcher::new(client, open_catalog(config)?, &config.storage.root_dir)
        .with_reporter(reporter);
    let entry = fetcher
        .fetch_and_catalog(&details.direct_url, &details.title)
        .await
        .context("Download failed")?;

    if !quiet {
        println!(
            "{FOLDER}Cataloged as #{}",
            entry.id.to_string().cyan().bold()
        );
    }
    Ok(())
}

fn run_list(config: &Config, json: bool) -> Result<()> {
    let entries = open_catalog(config)?
        .list_all()
        .context("Failed to read catalog")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("The catalog is empty");
        return Ok(());
    }

    let missing: HashSet<i64> = missing_files(&entries).iter().map(|e| e.id).collect();
    for entry in &entries {
        let marker = if missing.contains(&entry.id) {
            " (missing)".red().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:>5}  {}  {}{}",
            format!("#{}", entry.id).cyan(),
            entry.display_name.green(),
            entry.local_path.display().to_string().dimmed(),
            marker
        );
    }
    Ok(())
}

fn run_delete(config: &Config, id: i64, remove_file: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    let path = if remove_file {
        catalog
            .list_all()
            .context("Failed to read catalog")?
            .into_iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.local_path)
    } else {
        None
    };

    catalog
        .delete_by_id(id)
        .with_context(|| format!("Failed to delete entry #{id}"))?;

    if let Some(path) = path
        && path.exists()
    {
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    println!("{SUCCESS}Removed entry #{id}");
    Ok(())
}

fn run_clear(config: &Config) -> Result<()> {
    let removed = open_catalog(config)?
        .delete_all()
        .context("Failed to clear catalog")?;
    println!(
        "{BROOM}Removed {} catalog entries",
        removed.to_string().yellow()
    );
    Ok(())
}

async fn run_merge(config: &Config, first: &Path, second: &Path, quiet: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    let merger = FfmpegMerger::new(config.merge.clone());

    let progress = (!quiet).then(|| spinner(format!("{MIXER}Mixing sounds")));
    let result = merge_and_catalog(
        &merger,
        catalog.as_ref(),
        &config.storage.root_dir,
        first,
        second,
    )
    .await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    let entry = result.context("Merge failed")?;
    println!(
        "{SUCCESS}{} {}",
        entry.display_name.green(),
        format!("#{}", entry.id).dimmed()
    );
    Ok(())
}

/// A numeric source names a catalog entry; anything else is a path or URL
fn resolve_play_source(config: &Config, source: &str) -> Result<String> {
    let Ok(id) = source.parse::<i64>() else {
        return Ok(source.to_string());
    };

    let entry = open_catalog(config)?
        .list_all()
        .context("Failed to read catalog")?
        .into_iter()
        .find(|entry| entry.id == id)
        .with_context(|| format!("No catalog entry #{id}"))?;
    Ok(entry.local_path.to_string_lossy().into_owned())
}

async fn run_play(config: &Config, source: &str, quiet: bool) -> Result<()> {
    let source = resolve_play_source(config, source)?;
    let mut player = player_from_config(&config.playback);
    player
        .play(&source)
        .await
        .context("Failed to start playback")?;

    if !quiet {
        println!("{HEADPHONES}Playing {} (Ctrl-C to stop)", source.cyan());
    }

    let interrupted = tokio::select! {
        result = player.wait() => {
            result.context("Playback failed")?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        player.stop().await.context("Failed to stop playback")?;
    }
    Ok(())
}

async fn run_record(config: &Config) -> Result<()> {
    let root = &config.storage.root_dir;
    scan_storage_root(root).context("Failed to prepare storage directory")?;

    let output = root.join(unique_file_name(
        root,
        RECORDING_BASE_NAME,
        GENERATED_EXTENSION,
    ));
    let mut recorder = recorder_from_config(&config.recording);
    recorder
        .start(&output)
        .await
        .context("Failed to start recording")?;

    println!(
        "{MICROPHONE}Recording to {} (Ctrl-C to stop)",
        output.display().to_string().cyan()
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    let path = recorder.stop().await.context("Recording failed")?;
    if !path.exists() {
        println!("{FAILURE}Nothing was recorded");
        return Ok(());
    }

    let entry = open_catalog(config)?
        .insert_or_replace(&NewCatalogEntry::for_file(&path))
        .context("Failed to catalog recording")?;
    println!(
        "{SUCCESS}{} {}",
        entry.display_name.green(),
        format!("#{}", entry.id).dimmed()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet);

    let config = match &args.config {
        Some(path) => load_config(path),
        None => load_default_config(),
    }
    .context("Failed to load configuration")?;

    let machine_output = matches!(args.command, Command::List { json: true });
    if !args.quiet && !machine_output {
        println!(
            "\n{}{} {}\n",
            SPEAKER,
            "soundpull".bold().magenta(),
            "- Sound Search & Mixer".dimmed()
        );
    }

    match &args.command {
        Command::Search { query } => run_search(&config, &query.join(" "), args.quiet).await,
        Command::Details { title } => run_details(&config, title).await,
        Command::Fetch { title } => run_fetch(&config, title, args.quiet).await,
        Command::List { json } => run_list(&config, *json),
        Command::Delete { id, remove_file } => run_delete(&config, *id, *remove_file),
        Command::Clear => run_clear(&config),
        Command::Merge { first, second } => run_merge(&config, first, second, args.quiet).await,
        Command::Play { source } => run_play(&config, source, args.quiet).await,
        Command::Record => run_record(&config).await,
    }
}
