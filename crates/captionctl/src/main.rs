mod caption_file;
mod terminal;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use caption_overlay::api::{build_provider, check_endpoint};
use caption_overlay::config::{resolve_relative, ConfigError};
use caption_overlay::language::{self, LANGUAGES};
use caption_overlay::logging::{init_tracing, SessionLog};
use caption_overlay::prefs::{FilePreferences, PreferenceStore};
use caption_overlay::reader::CaptionReader;
use caption_overlay::render::OverlayRenderer;
use caption_overlay::requester::PageContext;
use caption_overlay::translation::RetryPolicy;
use caption_overlay::{Config, Requester, TranslationRequest};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use translate_server::{DEFAULT_LIBRE_URL, DEFAULT_PORT};

use crate::caption_file::CaptionFile;
use crate::terminal::TerminalOverlay;

#[derive(Parser)]
#[command(name = "captionctl", about = "Caption overlay translator -- command line")]
struct Cli {
    /// Path to config.toml (defaults to config.toml next to this exe)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow a caption file and print a translation whenever the caption changes
    Follow {
        /// Text file whose last lines are the current caption
        #[arg(short, long)]
        file: PathBuf,

        /// Target language code (defaults to the saved preference)
        #[arg(short, long)]
        target: Option<String>,

        /// Number of trailing lines that make up the caption
        #[arg(short, long, default_value = "2")]
        window: usize,
    },
    /// Translate one piece of text and exit
    Translate {
        text: String,

        #[arg(short, long)]
        target: Option<String>,
    },
    /// Show the preferred target language, or set it
    Lang { code: Option<String> },
    /// List supported target languages
    Languages,
    /// Check whether the configured translation endpoints are up
    Status,
    /// Run the local test translation server
    Serve {
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        #[arg(long, default_value = DEFAULT_LIBRE_URL)]
        libre_url: String,
    },
}

// --- Config and paths ---

fn resolve_config_path(cli_path: Option<PathBuf>) -> Result<PathBuf> {
    match cli_path {
        Some(path) => Ok(path),
        None => {
            let mut path = std::env::current_exe().context("Failed to get exe path")?;
            path.pop();
            path.push("config.toml");
            Ok(path)
        }
    }
}

fn load_config(path: &Path) -> Config {
    match Config::try_load(path) {
        Ok(config) => config,
        Err(ConfigError::Read { .. }) => Config::default(),
        Err(e) => {
            eprintln!("Warning: {e}");
            Config::default()
        }
    }
}

struct Paths {
    logs: PathBuf,
    preferences: PathBuf,
}

impl Paths {
    fn new(config_path: &Path, config: &Config) -> Self {
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Self {
            logs: resolve_relative(base, config.logging.directory.as_deref(), "logs"),
            preferences: resolve_relative(base, config.preferences.path.as_deref(), "preferences.json"),
        }
    }
}

/// `--target` if given, else the saved preference. Only supported codes are accepted.
fn resolve_target(cli_target: Option<String>, prefs: &dyn PreferenceStore) -> Result<String> {
    let target = cli_target.unwrap_or_else(|| prefs.preferred_lang());
    if !language::is_supported(&target) {
        let codes: Vec<&str> = LANGUAGES.iter().map(|(code, _)| *code).collect();
        bail!("Unsupported language '{target}' (supported: {})", codes.join(", "));
    }
    Ok(target)
}

// --- Commands ---

async fn follow(config: &Config, paths: &Paths, file: PathBuf, target: String, window: usize) -> Result<()> {
    let page = Arc::new(CaptionFile::open(&file, window));
    let ctx = PageContext {
        reader: Arc::new(CaptionReader::new(page.clone())),
        renderer: Arc::new(OverlayRenderer::new(
            Arc::new(TerminalOverlay::stdout()),
            config.overlay.clone(),
        )),
    };

    let transcript = Arc::new(if config.logging.enabled {
        let source = page.path().file_stem().and_then(|s| s.to_str());
        SessionLog::create(&paths.logs.join("sessions"), source, &target)
    } else {
        SessionLog::disabled()
    });

    let cancel = CancellationToken::new();
    let interval = config.reader.rescan_interval();

    let poller = {
        let page = page.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move { page.poll(interval, cancel).await })
    };
    let watcher = {
        let reader = ctx.reader.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move { reader.watch(interval, cancel).await })
    };

    let handle = Requester::new(
        Arc::new(ctx.clone()),
        Arc::new(ctx),
        build_provider(&config.provider),
        &target,
    )
    .with_policy(RetryPolicy::from(&config.provider))
    .with_settings(config.requester.clone())
    .with_transcript(transcript.clone())
    .spawn(cancel.child_token(), None);

    println!(
        "Following {} -> {} ({})",
        file.display(),
        language::display_name(&target),
        config.provider.kind
    );
    println!("Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    info!("stopping follow mode");
    cancel.cancel();
    handle.join().await;
    let _ = tokio::join!(poller, watcher);

    if let Some(path) = transcript.path() {
        println!();
        println!("Transcript saved to {}", path.display());
    }
    Ok(())
}

async fn translate(config: &Config, text: &str, target: &str) -> Result<()> {
    if text.trim().is_empty() {
        bail!("Nothing to translate");
    }
    let provider = build_provider(&config.provider);
    let request = TranslationRequest::new(text, target, config.requester.max_chars);
    let out = RetryPolicy::from(&config.provider)
        .run(provider.as_ref(), &request)
        .await
        .context("Translation failed")?;
    println!("{out}");
    Ok(())
}

fn lang(prefs: &FilePreferences, code: Option<String>) -> Result<()> {
    match code {
        None => {
            let current = prefs.preferred_lang();
            println!("{current} ({})", language::display_name(&current));
        }
        Some(code) => {
            prefs
                .set_preferred_lang(&code)
                .with_context(|| format!("Failed to save preference to {}", prefs.path().display()))?;
            println!("Preferred language set to {} ({code})", language::display_name(&code));
        }
    }
    Ok(())
}

fn languages(prefs: &FilePreferences) {
    let current = prefs.preferred_lang();
    println!("Supported languages:");
    for (code, name) in LANGUAGES {
        let marker = if *code == current { "*" } else { " " };
        println!(" {marker} {code:<4} {name}");
    }
}

async fn status(config: &Config) {
    println!("Provider: {}", config.provider.kind);
    if config.provider.endpoints.is_empty() {
        println!("  no endpoints configured");
    }
    for endpoint in &config.provider.endpoints {
        println!("  {endpoint}: {}", check_endpoint(endpoint).await);
    }
}

async fn serve(port: u16, libre_url: &str) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("Local translate server listening on http://{addr}/translate");
    println!("Will try LibreTranslate at {libre_url}, otherwise return fallback text.");
    println!("Press Ctrl+C to stop.");
    translate_server::serve(addr, libre_url)
        .await
        .with_context(|| format!("Failed to serve on {addr}"))
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config)?;
    let config = load_config(&config_path);
    let paths = Paths::new(&config_path, &config);
    init_tracing(&config.logging, &paths.logs);
    info!("captionctl started, config {}", config_path.display());

    let prefs = FilePreferences::open(&paths.preferences);

    match cli.command {
        Command::Follow { file, target, window } => {
            let target = resolve_target(target, &prefs)?;
            follow(&config, &paths, file, target, window).await
        }
        Command::Translate { text, target } => {
            let target = resolve_target(target, &prefs)?;
            translate(&config, &text, &target).await
        }
        Command::Lang { code } => lang(&prefs, code),
        Command::Languages => {
            languages(&prefs);
            Ok(())
        }
        Command::Status => {
            status(&config).await;
            Ok(())
        }
        Command::Serve { port, libre_url } => serve(port, &libre_url).await,
    }
}
