//! Peer connection module
//!
//! Drives a single peer through handshake, bitfield, interested and unchoke,
//! then downloads pieces one block at a time with a single outstanding request.

use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, TorrentError};
use crate::peer::address::PeerAddress;
use crate::peer::state::{Peer, PeerState};
use crate::protocol::{Handshake, Message, WireReader, WireWriter};
use crate::storage::piece::Piece;
use crate::torrent::TorrentMetadata;

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for each message read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Reject peers whose handshake carries another info hash
    pub verify_info_hash: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            verify_info_hash: true,
        }
    }
}

/// A connection to one peer for one torrent
pub struct PeerConnection<S = TcpStream> {
    /// Peer information
    pub peer: Peer,
    stream: S,
    state: PeerState,
    info_hash: [u8; 20],
    our_peer_id: [u8; 20],
    options: ConnectionOptions,
}

impl PeerConnection<TcpStream> {
    /// Open a TCP connection to a peer. Nothing is sent yet.
    pub async fn connect(
        addr: PeerAddress,
        info_hash: [u8; 20],
        our_peer_id: [u8; 20],
        options: ConnectionOptions,
    ) -> Result<Self> {
        info!("Connecting to peer: {}", addr);

        let socket = timeout(options.connect_timeout, TcpStream::connect(addr.socket_addr()))
            .await
            .map_err(|_| {
                warn!("Connection timeout to {}", addr);
                TorrentError::network_error_full(
                    "Connection timed out",
                    addr.to_string(),
                    format!("no answer within {:?}", options.connect_timeout),
                )
            })?
            .map_err(|e| {
                error!("Failed to connect to {}: {}", addr, e);
                TorrentError::network_error_full("Failed to connect", addr.to_string(), e.to_string())
            })?;

        debug!("Connected to peer: {}", addr);
        Ok(Self::new(socket, addr, info_hash, our_peer_id, options))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PeerConnection<S> {
    /// Wrap an already connected stream
    pub fn new(
        stream: S,
        addr: PeerAddress,
        info_hash: [u8; 20],
        our_peer_id: [u8; 20],
        options: ConnectionOptions,
    ) -> Self {
        Self {
            peer: Peer::new(addr),
            stream,
            state: PeerState::Connected,
            info_hash,
            our_peer_id,
            options,
        }
    }

    /// Current protocol state
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Exchange handshakes and return the remote peer id
    pub async fn handshake(&mut self) -> Result<[u8; 20]> {
        self.expect_state(PeerState::Connected, "handshake")?;
        self.state = PeerState::Handshaking;
        let result = self.exchange_handshakes().await;
        self.finish(result)
    }

    /// Wait for the peer's bitfield
    pub async fn await_bitfield(&mut self) -> Result<()> {
        self.expect_state(PeerState::AwaitingBitfield, "wait for bitfield")?;
        let result = match self.recv().await {
            Ok(Message::Bitfield { bitfield }) => {
                debug!("Peer {} sent a {} byte bitfield", self.peer.addr, bitfield.len());
                self.peer.bitfield = Some(bitfield);
                Ok(())
            }
            Ok(other) => Err(unexpected("bitfield", &other)),
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    /// Tell the peer we want to download
    pub async fn send_interested(&mut self) -> Result<()> {
        self.expect_state(PeerState::Interested, "send interested")?;
        let result = self.stream.write_message(&Message::Interested).await;
        self.finish(result)
    }

    /// Wait until the peer unchokes us
    pub async fn await_unchoke(&mut self) -> Result<()> {
        self.expect_state(PeerState::AwaitingUnchoke, "wait for unchoke")?;
        let result = match self.recv().await {
            Ok(Message::Unchoke) => {
                debug!("Unchoked by peer {}", self.peer.addr);
                Ok(())
            }
            Ok(other) => Err(unexpected("unchoke", &other)),
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    /// Run every step up to the unchoke
    pub async fn prepare(&mut self) -> Result<()> {
        self.handshake().await?;
        self.await_bitfield().await?;
        self.send_interested().await?;
        self.await_unchoke().await
    }

    /// Download and verify one piece. Prepares the connection first when
    /// nothing has been exchanged yet. Only verified bytes are returned.
    pub async fn download_piece(&mut self, metadata: &TorrentMetadata, index: u32) -> Result<Bytes> {
        let piece = Piece::for_torrent(metadata, index)?;

        if self.state == PeerState::Connected {
            self.prepare().await?;
        }
        if !self.state.can_request() {
            return Err(self.reject("download a piece"));
        }

        if !self.peer.has_piece(index as usize) {
            warn!("Peer {} does not advertise piece {}, requesting anyway", self.peer.addr, index);
        }

        self.state = PeerState::Requesting;
        info!("Downloading piece {} ({} bytes) from {}", index, piece.len(), self.peer.addr);
        let result = self.fetch_blocks(piece).await;
        let data = self.finish(result)?;

        self.peer.pieces_downloaded += 1;
        info!("Piece {} downloaded and verified", index);
        Ok(data)
    }

    async fn exchange_handshakes(&mut self) -> Result<[u8; 20]> {
        debug!("Sending handshake to peer: {}", self.peer.addr);
        let ours = Handshake::new(self.info_hash, self.our_peer_id);
        self.stream.write_handshake(&ours).await?;

        debug!("Reading handshake from peer: {}", self.peer.addr);
        let theirs = timeout(self.options.read_timeout, self.stream.read_handshake())
            .await
            .map_err(|_| TorrentError::timeout("waiting for handshake"))??;

        if self.options.verify_info_hash {
            theirs.validate(&self.info_hash)?;
        } else if theirs.info_hash != self.info_hash {
            warn!("Peer {} answered for info hash {}, continuing", self.peer.addr, hex::encode(theirs.info_hash));
        }

        self.peer.peer_id = Some(theirs.peer_id);
        info!("Handshake completed with peer {} (peer id {})", self.peer.addr, hex::encode(theirs.peer_id));
        Ok(theirs.peer_id)
    }

    async fn fetch_blocks(&mut self, mut piece: Piece) -> Result<Bytes> {
        for request in piece.block_requests() {
            trace!("Requesting block: index={} begin={} length={}", request.piece_index, request.begin, request.length);
            self.stream
                .write_message(&Message::Request {
                    index: request.piece_index,
                    begin: request.begin,
                    length: request.length,
                })
                .await?;

            match self.recv().await? {
                Message::Piece { index, begin, block }
                    if index == request.piece_index
                        && begin == request.begin
                        && block.len() == request.length as usize =>
                {
                    piece.add_block(begin, &block)?;
                }
                Message::Piece { index, begin, block } => {
                    return Err(TorrentError::protocol_error(format!(
                        "Requested block ({}, {}, {}), received ({}, {}, {})",
                        request.piece_index,
                        request.begin,
                        request.length,
                        index,
                        begin,
                        block.len()
                    )));
                }
                other => return Err(unexpected("piece", &other)),
            }
        }

        piece.verify()
    }

    /// Read the next message that is not a keep-alive. Keep-alives do not
    /// extend the deadline.
    async fn recv(&mut self) -> Result<Message> {
        let deadline = Instant::now() + self.options.read_timeout;
        loop {
            let message = timeout_at(deadline, self.stream.read_message())
                .await
                .map_err(|_| TorrentError::timeout(format!("waiting for message in state {}", self.state)))??;

            if message != Message::KeepAlive {
                trace!("Received {} from {}", message.name(), self.peer.addr);
                return Ok(message);
            }
            trace!("Keep-alive from {}", self.peer.addr);
        }
    }

    fn expect_state(&self, expected: PeerState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.reject(operation))
        }
    }

    fn reject(&self, operation: &str) -> TorrentError {
        let message = if self.state.is_failed() {
            format!("Cannot {}: connection has failed", operation)
        } else {
            format!("Cannot {} in state {}", operation, self.state)
        };
        TorrentError::protocol_error_with_peer(message, self.peer.addr.to_string())
    }

    /// Advance on success; any error fails the connection for good
    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                if let Some(next) = self.state.next() {
                    debug!("Peer {} state: {} -> {}", self.peer.addr, self.state, next);
                    self.state = next;
                }
                Ok(value)
            }
            Err(e) => {
                error!("Peer {} failed in state {}: {}", self.peer.addr, self.state, e);
                self.state = PeerState::Failed;
                Err(e.with_peer(self.peer.addr.to_string()))
            }
        }
    }
}

fn unexpected(wanted: &str, got: &Message) -> TorrentError {
    let id = got
        .message_id()
        .map(|id| (id as u8).to_string())
        .unwrap_or_else(|| "none".to_string());
    TorrentError::protocol_error(format!("Expected {}, received {} (id {})", wanted, got.name(), id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio::net::TcpListener;

    const REMOTE_ID: [u8; 20] = *b"-XX0001-remotepeer00";

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    /// Torrent over `data` cut into pieces of `piece_length`
    fn metadata_for(data: &[u8], piece_length: usize) -> TorrentMetadata {
        TorrentMetadata {
            announce: "http://127.0.0.1:8080/announce".to_string(),
            length: data.len() as u64,
            piece_length: piece_length as u64,
            piece_hashes: data.chunks(piece_length).map(TorrentMetadata::sha1).collect(),
            info_hash: [0x11; 20],
            name: Some("sample.bin".to_string()),
        }
    }

    fn addr() -> PeerAddress {
        "127.0.0.1:6881".parse().unwrap()
    }

    fn client(stream: DuplexStream, options: ConnectionOptions) -> PeerConnection<DuplexStream> {
        PeerConnection::new(stream, addr(), [0x11; 20], Handshake::generate_peer_id(), options)
    }

    /// Well-behaved seeder: answers every request from `data`
    async fn seeder(stream: DuplexStream, info_hash: [u8; 20], data: Vec<u8>, piece_length: usize) {
        // Ends quietly once the client hangs up
        let _ = serve(stream, info_hash, data, piece_length).await;
    }

    async fn serve(mut stream: DuplexStream, info_hash: [u8; 20], data: Vec<u8>, piece_length: usize) -> Result<()> {
        stream.read_handshake().await?;
        stream.write_handshake(&Handshake::new(info_hash, REMOTE_ID)).await?;
        stream.write_message(&Message::KeepAlive).await?;
        stream.write_message(&Message::Bitfield { bitfield: vec![0xff] }).await?;
        if stream.read_message().await? != Message::Interested {
            return Err(TorrentError::protocol_error("expected interested"));
        }
        stream.write_message(&Message::Unchoke).await?;

        while let Message::Request { index, begin, length } = stream.read_message().await? {
            let start = index as usize * piece_length + begin as usize;
            let block = data[start..start + length as usize].to_vec();
            stream.write_message(&Message::Piece { index, begin, block }).await?;
        }
        Ok(())
    }

    /// Runs the opening exchange, then hands the stream back
    async fn open(mut stream: DuplexStream) -> DuplexStream {
        stream.read_handshake().await.unwrap();
        stream.write_handshake(&Handshake::new([0x11; 20], REMOTE_ID)).await.unwrap();
        stream.write_message(&Message::Bitfield { bitfield: vec![0x80] }).await.unwrap();
        stream.read_message().await.unwrap();
        stream.write_message(&Message::Unchoke).await.unwrap();
        stream
    }

    #[tokio::test]
    async fn test_download_pieces_from_seeder() {
        let data = content(50_000);
        let metadata = metadata_for(&data, 40_000);
        let (local, remote) = duplex(64 * 1024);
        tokio::spawn(seeder(remote, [0x11; 20], data.clone(), 40_000));

        let mut conn = client(local, ConnectionOptions::default());
        let piece = conn.download_piece(&metadata, 0).await.unwrap();
        assert_eq!(piece.as_ref(), &data[..40_000]);
        assert_eq!(conn.state(), PeerState::Complete);
        assert_eq!(conn.peer.peer_id, Some(REMOTE_ID));
        assert!(conn.peer.has_piece(1));

        // Last piece is shorter, same connection
        let piece = conn.download_piece(&metadata, 1).await.unwrap();
        assert_eq!(piece.as_ref(), &data[40_000..]);
        assert_eq!(conn.peer.pieces_downloaded, 2);
    }

    #[tokio::test]
    async fn test_step_by_step_states() {
        let data = content(10);
        let metadata = metadata_for(&data, 10);
        let (local, remote) = duplex(64 * 1024);
        tokio::spawn(seeder(remote, [0x11; 20], data.clone(), 10));

        let mut conn = client(local, ConnectionOptions::default());
        assert_eq!(conn.handshake().await.unwrap(), REMOTE_ID);
        assert_eq!(conn.state(), PeerState::AwaitingBitfield);
        conn.await_bitfield().await.unwrap();
        assert_eq!(conn.state(), PeerState::Interested);
        conn.send_interested().await.unwrap();
        assert_eq!(conn.state(), PeerState::AwaitingUnchoke);
        conn.await_unchoke().await.unwrap();
        assert_eq!(conn.state(), PeerState::Requesting);
        assert_eq!(conn.download_piece(&metadata, 0).await.unwrap().as_ref(), &data[..]);
    }

    #[tokio::test]
    async fn test_out_of_order_call_rejected() {
        let (local, _remote) = duplex(1024);
        let mut conn = client(local, ConnectionOptions::default());
        assert!(matches!(
            conn.await_unchoke().await,
            Err(TorrentError::ProtocolError { .. })
        ));
        assert_eq!(conn.state(), PeerState::Connected);
    }

    #[tokio::test]
    async fn test_short_handshake_fails_connection() {
        let (local, mut remote) = duplex(1024);
        tokio::spawn(async move {
            remote.read_handshake().await.unwrap();
            let reply = Handshake::new([0x11; 20], REMOTE_ID).serialize();
            remote.write_all(&reply[..40]).await.unwrap();
        });

        let data = content(10);
        let mut conn = client(local, ConnectionOptions::default());
        let err = conn.download_piece(&metadata_for(&data, 10), 0).await.unwrap_err();
        assert!(matches!(err, TorrentError::HandshakeError { .. }));
        assert!(err.to_string().contains("127.0.0.1:6881"));
        assert_eq!(conn.state(), PeerState::Failed);

        assert!(matches!(
            conn.handshake().await,
            Err(TorrentError::ProtocolError { .. })
        ));
    }

    #[tokio::test]
    async fn test_info_hash_mismatch() {
        let (local, remote) = duplex(64 * 1024);
        tokio::spawn(seeder(remote, [0x22; 20], content(10), 10));

        let mut conn = client(local, ConnectionOptions::default());
        assert!(matches!(
            conn.handshake().await,
            Err(TorrentError::HandshakeError { .. })
        ));
    }

    #[tokio::test]
    async fn test_info_hash_mismatch_tolerated_without_verification() {
        let data = content(10);
        let (local, remote) = duplex(64 * 1024);
        tokio::spawn(seeder(remote, [0x22; 20], data.clone(), 10));

        let options = ConnectionOptions { verify_info_hash: false, ..ConnectionOptions::default() };
        let mut conn = client(local, options);
        let piece = conn.download_piece(&metadata_for(&data, 10), 0).await.unwrap();
        assert_eq!(piece.as_ref(), &data[..]);
    }

    #[tokio::test]
    async fn test_wrong_message_instead_of_bitfield() {
        let (local, mut remote) = duplex(1024);
        tokio::spawn(async move {
            remote.read_handshake().await.unwrap();
            remote.write_handshake(&Handshake::new([0x11; 20], REMOTE_ID)).await.unwrap();
            remote.write_message(&Message::Unchoke).await.unwrap();
        });

        let mut conn = client(local, ConnectionOptions::default());
        conn.handshake().await.unwrap();
        let err = conn.await_bitfield().await.unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
        assert!(err.to_string().contains("id 1"));
        assert_eq!(conn.state(), PeerState::Failed);
    }

    #[tokio::test]
    async fn test_truncated_piece_message() {
        let data = content(20_000);
        let metadata = metadata_for(&data, 20_000);
        let (local, remote) = duplex(64 * 1024);
        tokio::spawn(async move {
            let mut remote = open(remote).await;
            remote.read_message().await.unwrap();
            // Declare a full block, send 100 bytes, hang up
            let frame = Message::Piece { index: 0, begin: 0, block: vec![0u8; 16384] }.serialize();
            remote.write_all(&frame[..104]).await.unwrap();
        });

        let mut conn = client(local, ConnectionOptions::default());
        match conn.download_piece(&metadata, 0).await {
            Err(TorrentError::TruncatedMessage { expected, received }) => {
                assert_eq!(expected, 16393);
                assert_eq!(received, 100);
            }
            other => panic!("expected truncation, got {:?}", other.map(|b| b.len())),
        }
        assert_eq!(conn.state(), PeerState::Failed);
    }

    #[tokio::test]
    async fn test_mismatched_block_rejected() {
        let data = content(10);
        let metadata = metadata_for(&data, 10);
        let (local, remote) = duplex(64 * 1024);
        tokio::spawn(async move {
            let mut remote = open(remote).await;
            remote.read_message().await.unwrap();
            let block = vec![0u8; 10];
            remote.write_message(&Message::Piece { index: 0, begin: 16384, block }).await.unwrap();
        });

        let mut conn = client(local, ConnectionOptions::default());
        assert!(matches!(
            conn.download_piece(&metadata, 0).await,
            Err(TorrentError::ProtocolError { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_piece_fails_integrity() {
        let data = content(30_000);
        let mut metadata = metadata_for(&data, 30_000);
        metadata.piece_hashes[0] = [0u8; 20];
        let (local, remote) = duplex(64 * 1024);
        tokio::spawn(seeder(remote, [0x11; 20], data, 30_000));

        let mut conn = client(local, ConnectionOptions::default());
        match conn.download_piece(&metadata, 0).await {
            Err(TorrentError::IntegrityError { piece_index, expected, .. }) => {
                assert_eq!(piece_index, 0);
                assert_eq!(expected, [0u8; 20]);
            }
            other => panic!("expected integrity error, got {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_piece_index_out_of_range() {
        let data = content(10);
        let (local, _remote) = duplex(1024);
        let mut conn = client(local, ConnectionOptions::default());
        assert!(matches!(
            conn.download_piece(&metadata_for(&data, 10), 5).await,
            Err(TorrentError::ValidationError { .. })
        ));
        assert_eq!(conn.state(), PeerState::Connected);
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (local, mut remote) = duplex(1024);
        tokio::spawn(async move {
            remote.read_handshake().await.unwrap();
            remote.write_handshake(&Handshake::new([0x11; 20], REMOTE_ID)).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let options = ConnectionOptions { read_timeout: Duration::from_millis(50), ..ConnectionOptions::default() };
        let mut conn = client(local, options);
        conn.handshake().await.unwrap();
        assert!(matches!(
            conn.await_bitfield().await,
            Err(TorrentError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_keep_alives_do_not_extend_deadline() {
        let (local, mut remote) = duplex(1024);
        tokio::spawn(async move {
            remote.read_handshake().await.unwrap();
            remote.write_handshake(&Handshake::new([0x11; 20], REMOTE_ID)).await.unwrap();
            for _ in 0..250 {
                if remote.write_message(&Message::KeepAlive).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let options = ConnectionOptions { read_timeout: Duration::from_millis(100), ..ConnectionOptions::default() };
        let mut conn = client(local, options);
        conn.handshake().await.unwrap();
        let started = std::time::Instant::now();
        assert!(matches!(
            conn.await_bitfield().await,
            Err(TorrentError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(conn.state(), PeerState::Failed);
    }

    #[tokio::test]
    async fn test_connect_over_tcp() {
        let data = content(100);
        let metadata = metadata_for(&data, 64);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let served = data.clone();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.read_handshake().await.unwrap();
            socket.write_handshake(&Handshake::new([0x11; 20], REMOTE_ID)).await.unwrap();
            socket.write_message(&Message::Bitfield { bitfield: vec![0xc0] }).await.unwrap();
            socket.read_message().await.unwrap();
            socket.write_message(&Message::Unchoke).await.unwrap();
            while let Ok(Message::Request { index, begin, length }) = socket.read_message().await {
                let start = index as usize * 64 + begin as usize;
                let block = served[start..start + length as usize].to_vec();
                socket.write_message(&Message::Piece { index, begin, block }).await.unwrap();
            }
        });

        let addr = PeerAddress::new(std::net::Ipv4Addr::LOCALHOST, port);
        let mut conn = PeerConnection::connect(addr, [0x11; 20], [0x33; 20], ConnectionOptions::default())
            .await
            .unwrap();
        let piece = conn.download_piece(&metadata, 1).await.unwrap();
        assert_eq!(piece.as_ref(), &data[64..]);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let addr = PeerAddress::new(std::net::Ipv4Addr::LOCALHOST, port);
        let result = PeerConnection::connect(addr, [0x11; 20], [0x33; 20], ConnectionOptions::default()).await;
        assert!(matches!(result, Err(TorrentError::NetworkError { .. })));
    }
}
