// media_augment - preprocessing/augmentation HTTP service
// Serves upload, preprocess and augment routes for text, image, audio and 3D files

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use media_augment::ffmpeg::is_ffmpeg_installed;
use media_augment::server::{router, DEFAULT_MAX_UPLOAD_BYTES};
use media_augment::{Lexicon, Toolkit, ToolkitConfig, UploadStore};

#[derive(Parser)]
#[command(name = "media_augment", version, about = "Media preprocessing and augmentation server")]
struct Args {
    /// Address to bind
    #[arg(long, env = "MEDIA_AUGMENT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "MEDIA_AUGMENT_PORT", default_value_t = 8000)]
    port: u16,

    /// Directory where uploads are stored
    #[arg(long, env = "MEDIA_AUGMENT_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Extra thesaurus entries, one `word,synonym,...` line each
    #[arg(long, env = "MEDIA_AUGMENT_THESAURUS")]
    thesaurus: Option<PathBuf>,

    /// Seed for randomized techniques (entropy when unset)
    #[arg(long, env = "MEDIA_AUGMENT_SEED")]
    seed: Option<u64>,

    /// Maximum request body size in bytes
    #[arg(long, env = "MEDIA_AUGMENT_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args = Args::parse();

    info!("Starting media_augment v{}", env!("CARGO_PKG_VERSION"));

    let lexicon = Lexicon::initialize(args.thesaurus.as_deref())
        .context("Failed to initialize lexicon")?;
    if !lexicon.is_ready() {
        bail!("Lexicon has no stopwords or thesaurus entries");
    }

    let store = UploadStore::open(&args.upload_dir)
        .with_context(|| format!("Failed to create upload directory {}", args.upload_dir.display()))?;
    info!("   Uploads: {}", store.dir().display());

    if !is_ffmpeg_installed() {
        warn!("ffmpeg not found in PATH; MP3 uploads will fail to load");
    }

    let config = ToolkitConfig::default().with_seed(args.seed);
    let toolkit = Arc::new(Toolkit::new(store, Arc::new(lexicon), config));
    let app = router(toolkit, args.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", args.host, args.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("   Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
