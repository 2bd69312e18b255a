use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use r34dl_core::downloader::acquisition_orchestrator::AcquisitionOrchestrator;
use r34dl_core::downloader::single_file_downloader::{build_client, RetryPolicy, SingleFileDownloader};
use r34dl_core::downloader::strategy::api_retrieval_strategy::ApiRetrieval;
use r34dl_core::downloader::strategy::html_retrieval_strategy::HtmlRetrieval;
use r34dl_core::downloader::strategy::retrieval_strategy::{RetrievalStrategy, DEFAULT_BASE_URL};
use r34dl_core::settings::Settings;
use r34dl_core::types::types::{DownloadError, DownloadStats, TagQuery};

mod summary;
mod terminal_observer;
use terminal_observer::TerminalProgressObserver;

#[derive(Parser)]
#[command(name = "r34dl", version, about = "Download tagged images, GIFs and videos")]
struct Cli {
    /// Settings file (defaults to $R34DL_CONFIG or the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Site root to query
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download items matching the given tags
    Download(DownloadArgs),
    /// Check whether anything matches the given tags, without downloading
    Check(CheckArgs),
    /// Show the current settings
    Config,
}

#[derive(Args)]
struct MethodArgs {
    /// Use the XML feed
    #[arg(long, conflicts_with = "html")]
    api: bool,

    /// Scrape the listing pages
    #[arg(long)]
    html: bool,
}

impl MethodArgs {
    fn use_api(&self, default: bool) -> bool {
        match (self.api, self.html) {
            (true, _) => true,
            (_, true) => false,
            _ => default,
        }
    }
}

#[derive(Args)]
struct DownloadArgs {
    /// Space-separated tags, e.g. "cat_girl solo"
    #[arg(short, long)]
    tags: String,

    /// Number of items to download (defaults to the configured limit)
    #[arg(short, long)]
    quantity: Option<u16>,

    #[arg(short, long, default_value = "./downloads")]
    output: PathBuf,

    #[command(flatten)]
    method: MethodArgs,

    #[arg(long, overrides_with = "no_images")]
    images: bool,
    #[arg(long)]
    no_images: bool,

    #[arg(long, overrides_with = "no_gifs")]
    gifs: bool,
    #[arg(long)]
    no_gifs: bool,

    #[arg(long, overrides_with = "no_videos")]
    videos: bool,
    #[arg(long)]
    no_videos: bool,

    /// Retries per file after the first attempt
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Persist the effective settings for future runs
    #[arg(long)]
    save: bool,

    /// Print the final statistics as JSON instead of the summary
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CheckArgs {
    #[arg(short, long)]
    tags: String,

    #[command(flatten)]
    method: MethodArgs,
}

fn toggle(on: bool, off: bool, default: bool) -> bool {
    match (on, off) {
        (true, _) => true,
        (_, true) => false,
        _ => default,
    }
}

fn method_name(use_api: bool) -> &'static str {
    if use_api {
        "API (faster)"
    } else {
        "HTML parsing"
    }
}

const NOTHING_FOUND: &str = "No content found for the specified tags.";

/// What `download` prints when the pre-flight finds nothing. In `--json` mode
/// stdout stays machine-readable: empty stats go there and the notice goes
/// to stderr.
fn nothing_found(json: bool, quantity: usize) -> Result<String, serde_json::Error> {
    if json {
        eprintln!("{}", NOTHING_FOUND);
        serde_json::to_string_pretty(&DownloadStats::new(quantity))
    } else {
        Ok(NOTHING_FOUND.to_string())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let settings_path = cli.config.unwrap_or_else(Settings::default_path);
    let settings = Settings::load_or_init(&settings_path)?;

    match cli.command {
        Command::Download(args) => download(args, settings, &settings_path, &cli.base_url).await,
        Command::Check(args) => check(args, &settings, &cli.base_url).await,
        Command::Config => {
            show_config(&settings, &settings_path);
            Ok(())
        }
    }
}

async fn download(
    args: DownloadArgs,
    mut settings: Settings,
    settings_path: &Path,
    base_url: &str,
) -> Result<(), Box<dyn Error>> {
    let query = TagQuery::parse(&args.tags)?;

    settings.limit = args.quantity.unwrap_or(settings.limit);
    settings.images = toggle(args.images, args.no_images, settings.images);
    settings.gif = toggle(args.gifs, args.no_gifs, settings.gif);
    settings.video = toggle(args.videos, args.no_videos, settings.video);
    settings.is_api = args.method.use_api(settings.is_api);

    let policy = settings.policy();
    policy.ensure_any_enabled()?;

    if args.save {
        settings.save(settings_path)?;
        log::info!("settings saved to {}", settings_path.display());
    }

    std::fs::create_dir_all(&args.output).map_err(DownloadError::Disk)?;

    let mut quantity = usize::from(settings.limit);
    if !args.json {
        println!("Downloading {} items for tags: {}", quantity, query);
        println!("Output directory: {}", args.output.display());
        println!("Method: {}", method_name(settings.is_api));
        println!("File types: {}", policy.describe());
        println!();
    }

    let client = build_client()?;
    let strategy: Box<dyn RetrievalStrategy> = if settings.is_api {
        let api = ApiRetrieval::with_base_url(client.clone(), base_url);
        let count = api.count(&query).await?;
        if count == 0 {
            println!("{}", nothing_found(args.json, quantity)?);
            return Ok(());
        }
        if !args.json {
            println!("Found {} total items available.", count);
        }
        if quantity as u64 > count {
            eprintln!(
                "Warning: requested {} items but only {} available. Downloading all available items.",
                quantity, count
            );
            quantity = count as usize;
        }
        Box::new(api)
    } else {
        let html = HtmlRetrieval::with_base_url(client.clone(), base_url);
        if !html.is_any_content_available(&query).await? {
            println!("{}", nothing_found(args.json, quantity)?);
            return Ok(());
        }
        Box::new(html)
    };

    let retry = RetryPolicy {
        max_retries: args.retries,
        ..RetryPolicy::default()
    };
    let mut orchestrator =
        AcquisitionOrchestrator::new(SingleFileDownloader::new(client), policy, args.output.clone())
            .with_retry_policy(retry);
    if !args.json {
        orchestrator.add_observer(Box::new(TerminalProgressObserver::new(quantity)));
    }

    let start = Instant::now();
    let stats = orchestrator.run(&query, quantity, strategy.as_ref()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        summary::print_summary(&stats, &args.output, &policy, start.elapsed());
    }
    Ok(())
}

async fn check(args: CheckArgs, settings: &Settings, base_url: &str) -> Result<(), Box<dyn Error>> {
    let query = TagQuery::parse(&args.tags)?;
    let use_api = args.method.use_api(settings.is_api);

    println!("Checking content for tags: {}", query);
    println!("Method: {}", method_name(use_api));

    let client = build_client()?;
    if use_api {
        let count = ApiRetrieval::with_base_url(client, base_url).count(&query).await?;
        if count > 0 {
            println!("✓ Found {} items available", count);
        } else {
            println!("✗ No content found for the specified tags");
        }
        return Ok(());
    }

    let html = HtmlRetrieval::with_base_url(client, base_url);
    if !html.is_any_content_available(&query).await? {
        println!("✗ No content found for the specified tags");
        return Ok(());
    }
    match html.max_page_cursor(&query).await {
        Ok(cursor) if cursor > 0 => println!("✓ Content found (up to page {})", cursor),
        Ok(_) => println!("✓ Content found"),
        Err(e) => {
            log::warn!("could not read pagination: {}", e);
            println!("✓ Content found");
        }
    }
    Ok(())
}

fn show_config(settings: &Settings, path: &Path) {
    println!("Current configuration ({}):", path.display());
    println!("  Limit: {}", settings.limit);
    println!("  Download Images: {}", settings.images);
    println!("  Download GIFs: {}", settings.gif);
    println!("  Download Videos: {}", settings.video);
    println!("  Use API: {}", settings.is_api);
}
