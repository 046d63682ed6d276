use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use serde_json::Value;

use feed::FeedMessage;
use pxtracker::config::TrackerConfig;
use pxtracker::error::ErrorCode;
use pxtracker::services::archive::ArchiveStore;
use pxtracker::services::cooldown::{CooldownParams, format_duration};
use pxtracker::services::ingest::{FeedConnector, WsFeedConnector};
use pxtracker::services::template_source::detemplatize;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("{code}: {message}")]
    Tracker { code: &'static str, message: String },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("io error on {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
    #[error("timed out waiting for a feed message")]
    Timeout,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl CliError {
    fn tracker(err: &impl ErrorCode) -> Self {
        Self::Tracker { code: err.error_code(), message: err.to_string() }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pxtracker-cli", about = "Canvas tracker API client and offline tools")]
struct Cli {
    #[arg(long, env = "PXTRACKER_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a tracker is serving.
    Ping,
    /// Query a running tracker.
    Api(ApiCommand),
    /// Print decoded messages from the canvas server feed.
    Watch(WatchArgs),
    /// Cooldown schedule for an online count, computed locally.
    Cooldown(CooldownArgs),
    /// Replay an archived canvas log locally.
    Placemap(PlacemapArgs),
    /// Shrink a styled template image to one pixel per cell.
    Detemplatize(DetemplatizeArgs),
}

#[derive(Args, Debug)]
struct ApiCommand {
    #[command(subcommand)]
    command: ApiSubcommand,
}

#[derive(Subcommand, Debug)]
enum ApiSubcommand {
    Status,
    Cooldown {
        #[arg(long)]
        online: Option<i64>,
        #[arg(long)]
        multiplier: Option<f64>,
    },
    Progress {
        /// Template link.
        template: String,
    },
    Layer {
        /// Template links, top layer first.
        #[arg(required = true)]
        templates: Vec<String>,
    },
    Archives,
    Board {
        #[arg(long, default_value = "board.png")]
        out: PathBuf,
    },
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(long, env = "PXLS_FEED_URL", default_value = "wss://pxls.space/ws")]
    url: String,

    #[arg(long, env = "PXLS_CFAUTH")]
    cfauth: Option<String>,

    #[arg(long, help = "Stop after this many messages")]
    max_messages: Option<usize>,

    #[arg(long, default_value_t = 60)]
    idle_timeout_secs: u64,
}

#[derive(Args, Debug)]
struct CooldownArgs {
    online: i64,

    #[arg(long)]
    multiplier: Option<f64>,
}

#[derive(Args, Debug)]
struct PlacemapArgs {
    #[arg(long, env = "ARCHIVE_DIR", default_value = "resources/canvases")]
    archives: PathBuf,

    #[arg(long)]
    canvas: String,

    #[arg(long, env = "PXLS_USER_KEY")]
    key: String,

    #[arg(long, default_value = "placemap.png")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct DetemplatizeArgs {
    input: PathBuf,

    #[arg(long)]
    true_width: u32,

    #[arg(long, default_value = "template.png")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Ping => run_ping(&cli.base_url).await,
        Command::Api(api) => run_api(&cli.base_url, api).await,
        Command::Watch(args) => run_watch(args).await,
        Command::Cooldown(args) => run_cooldown(&args),
        Command::Placemap(args) => run_placemap(&args),
        Command::Detemplatize(args) => run_detemplatize(&args),
    }
}

// =============================================================================
// SERVER
// =============================================================================

async fn run_ping(base_url: &str) -> Result<(), CliError> {
    let url = format!("{}/healthz", base_url.trim_end_matches('/'));
    let response = reqwest::Client::new().get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::ServerError { status: status.as_u16(), message: "health check failed".to_owned() });
    }
    println!("ok");
    Ok(())
}

async fn run_api(base_url: &str, api: ApiCommand) -> Result<(), CliError> {
    match api.command {
        ApiSubcommand::Status => print_json(&api_json(base_url, reqwest::Method::GET, "/api/status", None).await?),
        ApiSubcommand::Cooldown { online, multiplier } => {
            let mut query = Vec::new();
            if let Some(online) = online {
                query.push(format!("online={online}"));
            }
            if let Some(multiplier) = multiplier {
                query.push(format!("multiplier={multiplier}"));
            }
            let path = if query.is_empty() { "/api/cooldown".to_owned() } else { format!("/api/cooldown?{}", query.join("&")) };
            print_json(&api_json(base_url, reqwest::Method::GET, &path, None).await?)
        }
        ApiSubcommand::Progress { template } => {
            let body = serde_json::json!({ "template": template });
            print_json(&api_json(base_url, reqwest::Method::POST, "/api/progress", Some(body)).await?)
        }
        ApiSubcommand::Layer { templates } => {
            let body = serde_json::json!({ "templates": templates });
            print_json(&api_json(base_url, reqwest::Method::POST, "/api/layer", Some(body)).await?)
        }
        ApiSubcommand::Archives => print_json(&api_json(base_url, reqwest::Method::GET, "/api/archives", None).await?),
        ApiSubcommand::Board { out } => {
            let url = format!("{}/api/board.png", base_url.trim_end_matches('/'));
            let response = checked(reqwest::Client::new().get(url).send().await?).await?;
            let bytes = response.bytes().await?;
            write_file(&out, &bytes)?;
            eprintln!("wrote {}", out.display());
            Ok(())
        }
    }
}

async fn api_json(base_url: &str, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value, CliError> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let request = reqwest::Client::new().request(method, &url);
    let request = if let Some(json) = body { request.json(&json) } else { request };

    let response = checked(request.send().await?).await?;
    Ok(response.json::<Value>().await?)
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, CliError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.json::<Value>().await.unwrap_or(Value::Null).to_string();
    Err(CliError::ServerError { status: status.as_u16(), message })
}

// =============================================================================
// FEED
// =============================================================================

async fn run_watch(args: WatchArgs) -> Result<(), CliError> {
    let connector = WsFeedConnector::new(args.url, args.cfauth);
    let mut stream = connector.connect().await.map_err(|e| CliError::tracker(&e))?;
    let idle = Duration::from_secs(args.idle_timeout_secs);

    let mut seen = 0_usize;
    loop {
        let next = tokio::time::timeout(idle, stream.next()).await.map_err(|_| CliError::Timeout)?;
        let Some(payload) = next else {
            break;
        };
        let payload = payload.map_err(|e| CliError::tracker(&e))?;
        match feed::decode_message(&payload) {
            Ok(FeedMessage::Unknown) => continue,
            Ok(message) => println!("{}", serde_json::to_string(&message)?),
            Err(error) => eprintln!("skipping undecodable message: {error}"),
        }

        seen = seen.saturating_add(1);
        if args.max_messages.is_some_and(|limit| seen >= limit) {
            break;
        }
    }
    eprintln!("watch complete: messages={seen}");
    Ok(())
}

// =============================================================================
// OFFLINE
// =============================================================================

fn run_cooldown(args: &CooldownArgs) -> Result<(), CliError> {
    let params = TrackerConfig::from_env().map_or_else(|_| CooldownParams::default(), |config| config.cooldown);
    let params = args.multiplier.map_or(params, |m| params.with_multiplier(m));
    let schedule = params.schedule(args.online).map_err(|e| CliError::tracker(&e))?;

    println!("online: {}", schedule.online);
    for entry in &schedule.entries {
        println!(
            "{}\t+{}\t{}",
            entry.stack_index,
            format_duration(entry.incremental_seconds),
            format_duration(entry.cumulative_seconds)
        );
    }
    Ok(())
}

fn run_placemap(args: &PlacemapArgs) -> Result<(), CliError> {
    let store = ArchiveStore::new(&args.archives);
    let (result, palette) = store.placemap(&args.canvas, &args.key).map_err(|e| CliError::tracker(&e))?;
    result.render(&palette).save(&args.out)?;

    let counters = result.counters;
    eprintln!(
        "placemap complete: canvas={} placed={} undone={} replaced_by_others={} replaced_by_owner={} out={}",
        args.canvas,
        counters.placed_count,
        counters.undo_count,
        counters.replaced_by_others_count,
        counters.replaced_by_owner_count,
        args.out.display()
    );
    Ok(())
}

fn run_detemplatize(args: &DetemplatizeArgs) -> Result<(), CliError> {
    let source = image::open(&args.input)?.to_rgba8();
    let reduced = detemplatize(&source, args.true_width);
    reduced.save(&args.out)?;
    eprintln!(
        "detemplatize complete: {}x{} -> {}x{} out={}",
        source.width(),
        source.height(),
        reduced.width(),
        reduced.height(),
        args.out.display()
    );
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, bytes).map_err(|error| CliError::Io { path: path.to_owned(), message: error.to_string() })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
