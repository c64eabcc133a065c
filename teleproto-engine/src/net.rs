//! Tokio TCP driver over the abridged transport.
//!
//! Each socket gets a writer task fed by an unbounded channel; the
//! connection engines only ever push bytes into that channel, so they stay
//! synchronous. [`serve`] runs one task per accepted client; [`TcpClient`]
//! runs a reader task and exposes `async` calls with timeouts.

use std::fmt;
use std::io;
use std::sync::Arc;

use teleproto_mtproto::transport::{AbridgedDecoder, AbridgedTransport, Frame, Transport};
use teleproto_tl_types::{RemoteCall, enums, functions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use crate::client::ClientConnection;
use crate::config::ClientConfig;
use crate::credentials::SessionCredentials;
use crate::errors::{ConnectionError, InvocationError, RpcError, TransferError};
use crate::file_transfer::FileTransfer;
use crate::server::{Server, ServerConnection};
use crate::status::{Status, StatusChange, StatusReason};

const READ_BUFFER: usize = 64 * 1024;

// ─── ChannelTransport ─────────────────────────────────────────────────────────

/// The writer task is gone.
#[derive(Debug)]
pub struct ChannelClosed;

impl fmt::Display for ChannelClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("writer task closed")
    }
}

impl std::error::Error for ChannelClosed {}

/// Hands packets to a writer task.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    type Error = ChannelClosed;

    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
        self.tx.send(packet.to_vec()).map_err(|_| ChannelClosed)
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) -> io::Result<()> {
    while let Some(bytes) = rx.recv().await {
        writer.write_all(&bytes).await?;
    }
    writer.shutdown().await
}

// ─── Server ───────────────────────────────────────────────────────────────────

/// Accepts connections forever, one task each.
pub async fn serve(listener: TcpListener, server: Server) -> io::Result<()> {
    info!("[teleproto] listening on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        let server = server.clone();
        tokio::spawn(async move {
            debug!("[teleproto] {peer} connected");
            match handle_connection(stream, server).await {
                Ok(()) => debug!("[teleproto] {peer} disconnected"),
                Err(e) => warn!("[teleproto] {peer}: {e}"),
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, server: Server) -> Result<(), ConnectionError> {
    stream.set_nodelay(true)?;
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = AbortOnDropHandle::new(tokio::spawn(write_loop(writer, rx)));

    let mut conn = server.connection(AbridgedTransport::without_marker(ChannelTransport::new(tx)));
    let result = serve_frames(&mut reader, &mut conn).await;

    // Let the writer flush whatever the engine queued last (e.g. -404).
    drop(conn);
    if let Ok(Err(e)) = writer.await {
        debug!("[teleproto] writer: {e}");
    }
    result
}

async fn serve_frames(reader: &mut OwnedReadHalf, conn: &mut ServerConnection<AbridgedTransport<ChannelTransport>>) -> Result<(), ConnectionError> {
    let mut decoder = AbridgedDecoder::server();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        decoder.push(&buf[..n]);
        while let Some(frame) = decoder.next_frame()? {
            match frame {
                Frame::Packet(packet) => conn.process_incoming(&packet)?,
                Frame::Error(code) => {
                    conn.status().fail(StatusReason::Remote);
                    return Err(ConnectionError::Transport(code));
                }
            }
        }
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

type Engine = ClientConnection<AbridgedTransport<ChannelTransport>>;

/// A client connection over TCP.
pub struct TcpClient {
    conn: Arc<Mutex<Engine>>,
    config: ClientConfig,
    status: watch::Receiver<StatusChange>,
    _reader: AbortOnDropHandle<()>,
    _writer: AbortOnDropHandle<io::Result<()>>,
}

impl TcpClient {
    /// Connects and runs the key exchange.
    pub async fn connect(addr: impl ToSocketAddrs, config: ClientConfig) -> Result<Self, ConnectionError> {
        Self::open(addr, config, None).await
    }

    /// Connects with saved credentials, skipping the key exchange.
    pub async fn resume(addr: impl ToSocketAddrs, config: ClientConfig, credentials: SessionCredentials) -> Result<Self, ConnectionError> {
        Self::open(addr, config, Some(credentials)).await
    }

    async fn open(addr: impl ToSocketAddrs, config: ClientConfig, credentials: Option<SessionCredentials>) -> Result<Self, ConnectionError> {
        let deadline = config.handshake_timeout;
        let stream = tokio::time::timeout(deadline, TcpStream::connect(addr)).await.map_err(|_| ConnectionError::Timeout)??;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = AbridgedTransport::new(ChannelTransport::new(tx));

        let mut conn = match credentials {
            Some(creds) => ClientConnection::with_credentials(config.clone(), transport, creds),
            None => ClientConnection::new(config.clone(), transport),
        };
        let mut status = conn.subscribe();
        conn.connect()?;

        let conn = Arc::new(Mutex::new(conn));
        let writer = AbortOnDropHandle::new(tokio::spawn(write_loop(writer, rx)));
        let reader = AbortOnDropHandle::new(tokio::spawn(read_loop(reader, conn.clone())));

        let ready = tokio::time::timeout(deadline, status.wait_for(|c| c.status.has_key() || c.status == Status::Failed));
        match ready.await {
            Ok(Ok(change)) if change.status.has_key() => {}
            Ok(_) => return Err(ConnectionError::Failed),
            Err(_) => {
                conn.lock().await.abort(StatusReason::Timeout);
                return Err(ConnectionError::Timeout);
            }
        }
        info!("[teleproto] connected to DC{}", config.dc_id);
        Ok(Self { conn, config, status, _reader: reader, _writer: writer })
    }

    pub fn status(&self) -> Status {
        self.status.borrow().status
    }

    /// Receives every later status change.
    pub fn subscribe(&self) -> watch::Receiver<StatusChange> {
        self.status.clone()
    }

    /// Sends `request` and waits (up to the RPC timeout) for its reply.
    pub async fn invoke<R: RemoteCall>(&self, request: &R) -> Result<R::Return, InvocationError> {
        let call = self.conn.lock().await.invoke(request)?;
        tokio::time::timeout(self.config.rpc_timeout, call.wait()).await.map_err(|_| InvocationError::Timeout)?
    }

    pub async fn ping(&self, ping_id: i64) -> Result<enums::Pong, InvocationError> {
        self.invoke(&functions::Ping { ping_id }).await
    }

    pub async fn export_credentials(&self) -> Option<SessionCredentials> {
        self.conn.lock().await.export_credentials()
    }

    /// Uploads `data` part by part and returns the `InputFile` naming it.
    pub async fn upload(&self, file_id: i64, name: &str, data: &[u8]) -> Result<enums::InputFile, TransferError> {
        let mut transfer = FileTransfer::upload(self.config.dc_id, file_id, name, data.len() as u64);
        while !transfer.is_finished() {
            let start = transfer.offset() as usize;
            let chunk = &data[start..start + transfer.expected_chunk_len()];
            let saved = self.invoke(&transfer.upload_request(chunk.to_vec())?).await?;
            if !saved {
                return Err(InvocationError::Rpc(RpcError::bad_request("FILE_PART_INVALID")).into());
            }
            transfer.bump_part(chunk)?;
        }
        debug!("[teleproto] uploaded {} bytes in {} parts", data.len(), transfer.total_parts());
        transfer.input_file()
    }

    /// Downloads `size` bytes from `location`.
    pub async fn download(&self, location: enums::InputFileLocation, size: u64) -> Result<Vec<u8>, TransferError> {
        let mut transfer = FileTransfer::download(self.config.dc_id, location, size);
        let mut out = Vec::with_capacity(size as usize);
        while !transfer.is_finished() {
            let enums::upload::File::File(file) = self.invoke(&transfer.download_request()?).await?;
            transfer.bump_part(&file.bytes)?;
            out.extend_from_slice(&file.bytes);
        }
        Ok(out)
    }
}

async fn read_loop(mut reader: OwnedReadHalf, conn: Arc<Mutex<Engine>>) {
    let mut decoder = AbridgedDecoder::client();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("[teleproto] server closed the socket");
                conn.lock().await.abort(StatusReason::Remote);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("[teleproto] read failed: {e}");
                conn.lock().await.abort(StatusReason::Remote);
                return;
            }
        };
        decoder.push(&buf[..n]);
        loop {
            let packet = match decoder.next_frame() {
                Ok(Some(Frame::Packet(packet))) => packet,
                Ok(Some(Frame::Error(code))) => code.to_bytes().to_vec(),
                Ok(None) => break,
                Err(e) => {
                    warn!("[teleproto] {e}");
                    conn.lock().await.abort(StatusReason::Remote);
                    return;
                }
            };
            if let Err(e) = conn.lock().await.process_incoming(&packet) {
                debug!("[teleproto] reader stopping: {e}");
                return;
            }
        }
    }
}
