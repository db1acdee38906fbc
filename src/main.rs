//! mybittorrent - Main entry point
//!
//! Decodes bencode, inspects torrents, queries trackers and downloads single
//! verified pieces from peers.

use anyhow::{Context, Result};
use mybittorrent::cli::output;
use mybittorrent::{
    bencode, CliArgs, Command, Config, FileSink, PeerAddress, PeerConnection, PieceSink, TorrentError,
    TorrentMetadata, TorrentParser, TrackerClient,
};
use std::path::Path;
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        if let Some(location) = panic_info.location() {
            error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args);
    config.validate().context("Invalid configuration")?;

    match args.command {
        Command::Decode { value } => {
            let decoded = bencode::decode(value.as_bytes()).context("Failed to decode bencoded value")?;
            println!("{}", output::render_decoded(&decoded));
        }
        Command::Info { torrent, json } => {
            let metadata = load_torrent_file(&torrent).await?;
            if json {
                println!("{}", output::render_info_json(&metadata).context("Failed to render JSON")?);
            } else {
                print!("{}", output::render_info(&metadata));
            }
        }
        Command::Peers { torrent } => {
            let metadata = load_torrent_file(&torrent).await?;
            let peers = discover_peers(&metadata, &config).await?;
            print!("{}", output::render_peers(&peers));
        }
        Command::Handshake { torrent, peer } => {
            let metadata = load_torrent_file(&torrent).await?;
            let mut connection =
                PeerConnection::connect(peer, metadata.info_hash, config.peer_id, config.connection_options())
                    .await
                    .with_context(|| format!("Failed to connect to {}", peer))?;
            let peer_id = connection
                .handshake()
                .await
                .with_context(|| format!("Handshake with {} failed", peer))?;
            println!("{}", output::render_peer_id(&peer_id));
        }
        Command::DownloadPiece { output: out, torrent, piece_index, peer } => {
            let metadata = load_torrent_file(&torrent).await?;
            download_piece(&metadata, &config, piece_index, peer, &out).await?;
            println!("{}", output::render_piece_saved(piece_index, &out));
        }
    }

    Ok(())
}

/// Initialize logging based on verbosity settings. Logs go to stderr.
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level: {:?}", level);
}

/// Load and parse the torrent file
async fn load_torrent_file(path: &Path) -> Result<TorrentMetadata> {
    let metadata = TorrentParser::parse_file(path)
        .await
        .with_context(|| format!("Failed to load torrent file '{}'", path.display()))?;
    info!("Loaded torrent {} ({} pieces)", metadata.info_hash_hex(), metadata.piece_count());
    Ok(metadata)
}

/// Ask the tracker for peers
async fn discover_peers(metadata: &TorrentMetadata, config: &Config) -> Result<Vec<PeerAddress>> {
    let client = TrackerClient::new(config.peer_id, config.port, config.tracker_timeout)?;
    let response = client
        .announce(metadata)
        .await
        .with_context(|| format!("Announce to {} failed", metadata.announce))?;
    Ok(response.peers)
}

/// Download one piece from `peer`, or from the tracker's first peer, and
/// write it to `out`
async fn download_piece(
    metadata: &TorrentMetadata,
    config: &Config,
    piece_index: u32,
    peer: Option<PeerAddress>,
    out: &Path,
) -> Result<()> {
    if metadata.piece_len(piece_index as usize).is_none() {
        return Err(TorrentError::validation_error_with_field(
            format!("Piece index {} out of range (torrent has {} pieces)", piece_index, metadata.piece_count()),
            "piece_index",
        )
        .into());
    }

    let peer = match peer {
        Some(peer) => peer,
        None => discover_peers(metadata, config)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TorrentError::network_error_with_address("Tracker returned no peers", metadata.announce.clone()))?,
    };
    info!("Using peer {}", peer);

    let mut connection = PeerConnection::connect(peer, metadata.info_hash, config.peer_id, config.connection_options())
        .await
        .with_context(|| format!("Failed to connect to {}", peer))?;
    let data = connection
        .download_piece(metadata, piece_index)
        .await
        .with_context(|| format!("Failed to download piece {} from {}", piece_index, peer))?;

    let mut sink = FileSink::new(out);
    sink.write_piece(piece_index, data)
        .await
        .with_context(|| format!("Failed to save piece to '{}'", out.display()))?;
    Ok(())
}
