use std::io::ErrorKind;
use std::net::SocketAddr;

use async_trait::async_trait;
use proxtrace_primitives::{DatagramChannel, TracerError, TracerResult};
use tokio::net::{lookup_host, UdpSocket};

/// Replies are short; anything longer than this is never an acknowledgement.
const RECV_BUFFER_LEN: usize = 512;

/// UDP link to the collector. Replies are accepted only from the collector's
/// address.
pub struct UdpChannel {
    collector: String,
    local_port: u16,
    socket: Option<UdpSocket>,
}

impl UdpChannel {
    pub fn new(collector: impl Into<String>, local_port: u16) -> Self {
        Self {
            collector: collector.into(),
            local_port,
            socket: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn socket(&self) -> TracerResult<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| TracerError::TransportUnavailable("not connected".into()))
    }
}

#[async_trait]
impl DatagramChannel for UdpChannel {
    async fn connect(&mut self) -> TracerResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let remote = lookup_host(self.collector.as_str())
            .await
            .map_err(|e| TracerError::TransportUnavailable(format!("{}: {e}", self.collector)))?
            .next()
            .ok_or_else(|| {
                TracerError::TransportUnavailable(format!("{} did not resolve", self.collector))
            })?;

        let bind: SocketAddr = if remote.is_ipv4() {
            ([0u8, 0, 0, 0], self.local_port).into()
        } else {
            ([0u16; 8], self.local_port).into()
        };

        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| TracerError::TransportUnavailable(format!("bind {bind}: {e}")))?;
        socket
            .connect(remote)
            .await
            .map_err(|e| TracerError::TransportUnavailable(format!("connect {remote}: {e}")))?;

        log::info!(
            "Uplink ready: {} -> {}",
            socket.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            remote
        );
        self.socket = Some(socket);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn send(&mut self, payload: &[u8]) -> TracerResult<()> {
        let sent = self
            .socket()?
            .send(payload)
            .await
            .map_err(|e| TracerError::Transport(e.to_string()))?;

        if sent != payload.len() {
            return Err(TracerError::Transport(format!(
                "short send: {sent} of {} bytes",
                payload.len()
            )));
        }
        Ok(())
    }

    async fn recv(&mut self) -> TracerResult<Vec<u8>> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let len = self
            .socket()?
            .recv(&mut buf)
            .await
            .map_err(|e| TracerError::Transport(e.to_string()))?;
        Ok(buf[..len].to_vec())
    }

    fn discard_pending(&mut self) -> usize {
        let Some(socket) = self.socket.as_ref() else {
            return 0;
        };

        let mut buf = [0u8; RECV_BUFFER_LEN];
        let mut discarded = 0;
        loop {
            match socket.try_recv(&mut buf) {
                Ok(_) => discarded += 1,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::debug!("Receive failed while draining: {}", e);
                    break;
                }
            }
        }
        discarded
    }
}
