use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::{IngestDriver, IngestError, IngestStatus};
use crate::buffer::PacketQueue;
use crate::ts::{TsPacket, TS_PACKET_SIZE};

/// MTU-sized datagrams carry 1..7 TS packets.
const MAX_PACKETS_PER_DATAGRAM: usize = 7;
const READ_POLL: Duration = Duration::from_millis(200);

/// Datagram ingest: every receive is a whole number of TS packets.
pub struct UdpDriver {
    port: u16,
    rcvbuf_size: Option<usize>,
}

impl UdpDriver {
    pub fn new(port: u16, rcvbuf_size: Option<usize>) -> Self {
        Self { port, rcvbuf_size }
    }

    fn bind(&self) -> std::io::Result<std::net::UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        if let Some(size) = self.rcvbuf_size {
            socket.set_recv_buffer_size(size)?;
        }
        socket.set_reuse_address(true)?;
        let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], self.port));
        socket.bind(&addr.into())?;
        socket.set_read_timeout(Some(READ_POLL))?;
        Ok(socket.into())
    }
}

impl IngestDriver for UdpDriver {
    fn run(
        &mut self,
        queue: &PacketQueue,
        status: &IngestStatus,
        running: &AtomicBool,
    ) -> Result<(), IngestError> {
        let socket = self.bind()?;
        tracing::info!(port = self.port, "udp ingest listening");
        let mut buf = [0u8; MAX_PACKETS_PER_DATAGRAM * TS_PACKET_SIZE];

        while running.load(Ordering::Relaxed) {
            let n = match socket.recv(&mut buf) {
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
            status.set_connected(true);
            let mut accepted = 0u64;
            for chunk in buf[..n].chunks_exact(TS_PACKET_SIZE) {
                if let Some(pkt) = TsPacket::from_bytes(chunk) {
                    queue.push(pkt);
                    accepted += 1;
                }
            }
            status.add_packets(accepted);
        }
        Ok(())
    }
}
