use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::{IngestDriver, IngestError, IngestStatus};
use crate::buffer::PacketQueue;
use crate::ts::{TsPacket, SYNC_BYTE, TS_PACKET_SIZE};

/// Sync is only trusted once this many consecutive 188-byte strides all
/// start with 0x47.
const RESYNC_STRIDES: usize = 5;
const ACCEPT_POLL: Duration = Duration::from_millis(200);
const READ_POLL: Duration = Duration::from_millis(200);
const READ_CHUNK: usize = 32 * TS_PACKET_SIZE;

/// Byte-stream ingest: accepts one inbound connection at a time and
/// re-synchronizes on the 0x47 stride whenever alignment is lost.
pub struct TcpDriver {
    port: u16,
}

impl TcpDriver {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    fn listen(&self) -> std::io::Result<TcpListener> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], self.port));
        socket.bind(&addr.into())?;
        socket.listen(1)?;
        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        Ok(listener)
    }

    fn serve_stream(
        &self,
        stream: TcpStream,
        queue: &PacketQueue,
        status: &IngestStatus,
        running: &AtomicBool,
    ) -> Result<(), IngestError> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_POLL))?;
        let mut stream = stream;
        let mut sync = StreamSync::new();
        let mut buf = [0u8; READ_CHUNK];

        while running.load(Ordering::Relaxed) {
            let n = match stream.read(&mut buf) {
                Ok(0) => return Err(IngestError::Eof),
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let mut accepted = 0u64;
            sync.extend_and_drain(&buf[..n], |pkt| {
                queue.push(pkt);
                accepted += 1;
            });
            status.add_packets(accepted);
        }
        Ok(())
    }
}

impl IngestDriver for TcpDriver {
    fn run(
        &mut self,
        queue: &PacketQueue,
        status: &IngestStatus,
        running: &AtomicBool,
    ) -> Result<(), IngestError> {
        let listener = self.listen()?;
        tracing::info!(port = self.port, "tcp ingest listening");

        while running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    tracing::info!(peer = %peer, "tcp ingest connected");
                    status.set_connected(true);
                    let result = self.serve_stream(stream, queue, status, running);
                    status.set_connected(false);
                    return result;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Accumulates stream bytes and yields aligned packets, verifying the
/// 188-byte stride before trusting a sync byte.
struct StreamSync {
    buf: Vec<u8>,
    synced: bool,
}

impl StreamSync {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(2 * READ_CHUNK),
            synced: false,
        }
    }

    fn extend_and_drain(&mut self, data: &[u8], mut emit: impl FnMut(TsPacket)) {
        self.buf.extend_from_slice(data);
        loop {
            if !self.synced {
                if !self.try_sync() {
                    return;
                }
            }
            if self.buf.len() < TS_PACKET_SIZE {
                return;
            }
            if self.buf[0] != SYNC_BYTE {
                // Alignment lost mid-stream.
                self.synced = false;
                continue;
            }
            if let Some(pkt) = TsPacket::from_bytes(&self.buf[..TS_PACKET_SIZE]) {
                emit(pkt);
            }
            self.buf.drain(..TS_PACKET_SIZE);
        }
    }

    /// Looks for an offset where `RESYNC_STRIDES` consecutive strides all
    /// begin with the sync byte; drops everything before it.
    fn try_sync(&mut self) -> bool {
        let needed = (RESYNC_STRIDES - 1) * TS_PACKET_SIZE + 1;
        if self.buf.len() < needed {
            return false;
        }
        let last_candidate = self.buf.len() - needed;
        for offset in 0..=last_candidate {
            if (0..RESYNC_STRIDES).all(|k| self.buf[offset + k * TS_PACKET_SIZE] == SYNC_BYTE) {
                self.buf.drain(..offset);
                self.synced = true;
                return true;
            }
        }
        // Nothing aligned in this window; keep only the tail that could
        // still start a verified run.
        let keep_from = self.buf.len() - (needed - 1);
        self.buf.drain(..keep_from);
        false
    }
}
