//! UDP transport to the looper
//!
//! The link owns two sockets: a send socket for commands and replies, and a
//! listen socket whose datagrams are decoded on a background task and handed
//! to the inbound callback. Sends never block.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket as StdUdpSocket};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rosc::{OscMessage, OscPacket};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::command::LooperCommand;

/// Callback receiving every inbound OSC message
pub type InboundCallback = Arc<dyn Fn(OscMessage) + Send + Sync>;

/// Outbound side of the looper connection, as seen by the bridge
pub trait LooperLink {
    /// Open the send and listen channels
    fn open(&mut self) -> Result<()>;

    /// Close both channels
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// URL the looper should answer to
    fn reply_url(&self) -> String;

    /// Send a command to the looper
    fn send(&mut self, cmd: &LooperCommand) -> Result<()>;

    /// Send a message to an arbitrary host, e.g. a diagnostic client
    fn send_to(&mut self, host: &str, port: u16, msg: OscMessage) -> Result<()>;
}

/// Send a command and log, rather than propagate, a failure
pub fn fire(link: &mut dyn LooperLink, cmd: LooperCommand) {
    debug!("→ {}", cmd);
    if let Err(e) = link.send(&cmd) {
        warn!("Failed to send {}: {}", cmd, e);
    }
}

fn encode(msg: OscMessage) -> Result<Vec<u8>> {
    rosc::encoder::encode(&OscPacket::Message(msg))
        .map_err(|e| anyhow!("Failed to encode OSC message: {:?}", e))
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {}:{}", host, port))?
        .next()
        .ok_or_else(|| anyhow!("No address for {}:{}", host, port))
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}

/// UDP implementation of [`LooperLink`]
pub struct UdpLink {
    looper_host: String,
    looper_port: u16,
    listen_port: u16,
    on_message: InboundCallback,

    send_socket: Option<StdUdpSocket>,
    looper_addr: Option<SocketAddr>,
    listener: Option<JoinHandle<()>>,
}

impl UdpLink {
    pub fn new(
        looper_host: impl Into<String>,
        looper_port: u16,
        listen_port: u16,
        on_message: InboundCallback,
    ) -> Self {
        Self {
            looper_host: looper_host.into(),
            looper_port,
            listen_port,
            on_message,
            send_socket: None,
            looper_addr: None,
            listener: None,
        }
    }

    fn open_send(&mut self) -> Result<()> {
        if self.send_socket.is_some() {
            return Ok(());
        }

        let addr = resolve(&self.looper_host, self.looper_port)?;
        let socket = StdUdpSocket::bind(("0.0.0.0", 0)).context("Failed to bind OSC send socket")?;
        socket
            .set_nonblocking(true)
            .context("Failed to make OSC send socket non-blocking")?;

        info!("OSC send channel ready for {}", addr);
        self.looper_addr = Some(addr);
        self.send_socket = Some(socket);
        Ok(())
    }

    fn open_listen(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }

        let std_socket = StdUdpSocket::bind(("0.0.0.0", self.listen_port))
            .with_context(|| format!("Failed to bind OSC listen port {}", self.listen_port))?;
        std_socket
            .set_nonblocking(true)
            .context("Failed to make OSC listen socket non-blocking")?;
        let socket = UdpSocket::from_std(std_socket).context("Failed to register OSC socket")?;

        let on_message = Arc::clone(&self.on_message);
        let port = self.listen_port;

        self.listener = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; rosc::decoder::MTU];
            loop {
                let (size, peer) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("OSC receive error on port {}: {}", port, e);
                        continue;
                    }
                };

                match rosc::decoder::decode_udp(&buf[..size]) {
                    Ok((_, packet)) => {
                        let mut messages = Vec::new();
                        flatten(packet, &mut messages);
                        for msg in messages {
                            trace!("← {} from {} ({} args)", msg.addr, peer, msg.args.len());
                            on_message(msg);
                        }
                    }
                    Err(e) => {
                        warn!("Dropping {} bytes with invalid OSC format from {}: {:?}", size, peer, e);
                    }
                }
            }
        }));

        info!("OSC listening on port {}", port);
        Ok(())
    }
}

impl LooperLink for UdpLink {
    fn open(&mut self) -> Result<()> {
        self.open_send()?;
        self.open_listen()
    }

    fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.send_socket = None;
        self.looper_addr = None;
        info!("OSC channels closed");
    }

    fn is_open(&self) -> bool {
        self.send_socket.is_some() && self.listener.is_some()
    }

    fn reply_url(&self) -> String {
        format!("osc.udp://localhost:{}/", self.listen_port)
    }

    fn send(&mut self, cmd: &LooperCommand) -> Result<()> {
        let (socket, addr) = match (&self.send_socket, self.looper_addr) {
            (Some(socket), Some(addr)) => (socket, addr),
            _ => return Err(anyhow!("OSC link to looper is not open")),
        };

        let bytes = encode(cmd.to_osc(&self.reply_url()))?;
        socket
            .send_to(&bytes, addr)
            .with_context(|| format!("Failed to send {} to {}", cmd, addr))?;
        Ok(())
    }

    fn send_to(&mut self, host: &str, port: u16, msg: OscMessage) -> Result<()> {
        let socket = self
            .send_socket
            .as_ref()
            .ok_or_else(|| anyhow!("OSC send socket is not open"))?;

        let addr = resolve(host, port)?;
        let path = msg.addr.clone();
        let bytes = encode(msg)?;
        socket
            .send_to(&bytes, addr)
            .with_context(|| format!("Failed to send {} to {}", path, addr))?;
        Ok(())
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// In-memory link recording everything sent through it
#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    #[derive(Default)]
    pub struct RecordingLink {
        pub open: bool,
        pub refuse_open: bool,
        pub open_calls: usize,
        pub sent: Vec<LooperCommand>,
        pub replies: Vec<(String, u16, OscMessage)>,
    }

    impl RecordingLink {
        pub fn opened() -> Self {
            Self {
                open: true,
                ..Self::default()
            }
        }

        pub fn take(&mut self) -> Vec<String> {
            self.sent.drain(..).map(|cmd| cmd.to_string()).collect()
        }
    }

    impl LooperLink for RecordingLink {
        fn open(&mut self) -> Result<()> {
            self.open_calls += 1;
            if self.refuse_open {
                return Err(anyhow!("port in use"));
            }
            self.open = true;
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn reply_url(&self) -> String {
            "osc.udp://localhost:9000/".to_string()
        }

        fn send(&mut self, cmd: &LooperCommand) -> Result<()> {
            if !self.open {
                return Err(anyhow!("not open"));
            }
            self.sent.push(cmd.clone());
            Ok(())
        }

        fn send_to(&mut self, host: &str, port: u16, msg: OscMessage) -> Result<()> {
            self.replies.push((host.to_string(), port, msg));
            Ok(())
        }
    }
}
