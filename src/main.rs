use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use folio::album::Album;
use folio::cache::{
    CacheStorage, CacheWorker, DirNetwork, HttpNetwork, Network, Registration, Request,
};
use folio::config::{self, Config};

#[derive(Parser)]
#[command(name = "folio", version = folio::build_version(), about = "Swipeable photo albums in the terminal, with an offline cache")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log output file path (enables logging in the viewer)
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Directory holding cache buckets (overrides config)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Serve the album origin from a local directory instead of HTTP
    #[arg(long, global = true)]
    offline_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Open an album in the terminal viewer
    View {
        /// Album description (album.toml)
        album: PathBuf,
    },
    /// Manage the offline cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Fetch the album's static assets into a new version bucket
    Install { album: PathBuf },
    /// Make the album's installed version current and delete every other bucket
    Activate { album: PathBuf },
    /// Fetch URLs (or scope-relative paths) through the cache
    Fetch {
        album: PathBuf,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Delete every bucket
    Clear,
    /// List buckets and their sizes
    Status {
        /// Mark this album's current bucket
        album: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    // Load config file and merge CLI overrides
    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    cfg.merge_cli(cli.cache_dir);
    let config = cfg.resolve();

    let network: Arc<dyn Network> = match &cli.offline_root {
        Some(root) => {
            info!("network: serving origin from {}", root.display());
            Arc::new(DirNetwork::new(root))
        }
        None => Arc::new(HttpNetwork::new(config.cache.timeout)),
    };

    let result = match cli.command {
        Command::View { album } => cmd_view(&album, &config, network),
        Command::Cache(cmd) => cmd_cache(cmd, &config, network),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    if let Some(log_path) = &cli.log {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("failed to open log file {}", log_path.display()))?;
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else if matches!(cli.command, Command::Cache(_)) {
        env_logger::init();
    }
    // viewer mode + no --log → logger not initialized (the viewer owns the terminal)
    Ok(())
}

fn open_storage(config: &Config) -> Result<CacheStorage> {
    match &config.cache.dir {
        Some(dir) => CacheStorage::open_dir(dir)
            .with_context(|| format!("failed to open cache directory {}", dir.display())),
        None => {
            warn!("cache: no cache directory, buckets are kept in memory only");
            Ok(CacheStorage::in_memory())
        }
    }
}

fn cmd_view(album_path: &Path, config: &Config, network: Arc<dyn Network>) -> Result<()> {
    let album = Album::load(album_path)?;
    let storage = open_storage(config)?;
    let mut registration = Registration::new(storage, network);

    let settings = album.cache_settings();
    if !registration.restore(settings.clone())? {
        // Offline on first run: view without a cache rather than refuse.
        if let Err(e) = registration.register(settings) {
            warn!("cache: install failed, loading images uncached: {e}");
        }
    }
    folio::viewer::run(&album, &config.viewer, &mut registration)
}

fn cmd_cache(cmd: CacheCommand, config: &Config, network: Arc<dyn Network>) -> Result<()> {
    let storage = open_storage(config)?;
    match cmd {
        CacheCommand::Install { album } => {
            let album = Album::load(&album)?;
            let mut worker = CacheWorker::new(album.cache_settings(), storage.clone(), network)?;
            worker
                .install()
                .with_context(|| format!("install of {} failed", worker.bucket()))?;
            let (entries, bytes) = storage.usage(worker.bucket()).unwrap_or_default();
            eprintln!(
                "installed {} ({entries} entries, {bytes} bytes); run `folio cache activate` to make it current",
                worker.bucket()
            );
        }
        CacheCommand::Activate { album } => {
            let album = Album::load(&album)?;
            let settings = album.cache_settings();
            let bucket = settings.bucket_name();
            let mut worker = CacheWorker::resume(settings, storage, network)?
                .with_context(|| format!("{bucket} is not installed; run `folio cache install` first"))?;
            let deleted = worker.activate()?;
            eprintln!("activated {bucket}");
            for name in deleted {
                eprintln!("  deleted {name}");
            }
        }
        CacheCommand::Fetch { album, urls } => {
            let album = Album::load(&album)?;
            let mut registration = Registration::new(storage, network);
            let settings = album.cache_settings();
            if !registration.restore(settings.clone())? {
                registration.register(settings)?;
            }
            let client = registration.open_client();
            let scope = folio::cache::Scope::parse(&album.scope)?;
            for url in urls {
                let request = Request::get(scope.resolve(&url));
                let fetched = registration
                    .fetch(client, &request)
                    .with_context(|| format!("fetch of {} failed", request.url))?;
                println!(
                    "{} {} {:?} {} bytes",
                    fetched.response.status,
                    request.url,
                    fetched.source,
                    fetched.response.body.len()
                );
                // Short-lived process: let the background refresh land.
                fetched.revalidation.wait();
            }
        }
        CacheCommand::Clear => {
            let mut registration = Registration::new(storage, network);
            registration.post_message(r#"{"type":"CLEAR_CACHE"}"#)?;
            eprintln!("cleared all buckets");
        }
        CacheCommand::Status { album } => {
            let current = match album {
                Some(path) => Some(Album::load(&path)?.cache_settings().bucket_name()),
                None => None,
            };
            let names = storage.keys();
            if names.is_empty() {
                println!("no buckets");
            }
            for name in names {
                let (entries, bytes) = storage.usage(&name).unwrap_or_default();
                let marker = if current.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!("{marker} {name}\t{entries} entries\t{bytes} bytes");
            }
        }
    }
    Ok(())
}
