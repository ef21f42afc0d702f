//! Socket policy applied to every TCP stream before it becomes a link.
//!
//! Packages are small and interactive (a ping, a clipboard update), so the
//! policy favours latency: Nagle's algorithm is off and buffers are sized
//! for small lines.  Keep-alive is on, with a short idle time and retry
//! interval, so a peer that vanished without a FIN (Wi-Fi dropped, laptop
//! lid closed, crash) is detected within seconds.  Until then the dead link
//! stays `Linked` and blocks a fresh connection from the same device.
//!
//! # Where each option is applied
//!
//! | option        | outbound              | inbound                          |
//! |---------------|-----------------------|----------------------------------|
//! | keep-alive    | on the socket pre-connect | on the listener, inherited by accepted sockets |
//! | buffer sizes  | on the socket pre-connect | on the listener, inherited by accepted sockets |
//! | no-delay      | on the connected stream | on each accepted stream        |
//! | keep-alive timing | on the connected stream | on each accepted stream    |

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// Pending-connection backlog for the link listener.
const LISTEN_BACKLOG: u32 = 128;

/// Socket options for link streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketPolicy {
    /// Enable TCP keep-alive.
    #[serde(default = "default_true")]
    pub keepalive: bool,
    /// Idle seconds before the first keep-alive packet; 0 keeps the OS
    /// default (often two hours).
    #[serde(default = "default_keepalive_idle_secs")]
    pub keepalive_idle_secs: u64,
    /// Seconds between unanswered keep-alive packets; 0 keeps the OS default.
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    /// Disable Nagle's algorithm.
    #[serde(default = "default_true")]
    pub nodelay: bool,
    /// `SO_SNDBUF` in bytes; 0 keeps the OS default.
    #[serde(default = "default_buffer_size")]
    pub send_buffer_size: u32,
    /// `SO_RCVBUF` in bytes; 0 keeps the OS default.
    #[serde(default = "default_buffer_size")]
    pub recv_buffer_size: u32,
}

fn default_true() -> bool {
    true
}
fn default_buffer_size() -> u32 {
    64 * 1024
}
fn default_keepalive_idle_secs() -> u64 {
    10
}
fn default_keepalive_interval_secs() -> u64 {
    5
}

impl Default for SocketPolicy {
    fn default() -> Self {
        Self {
            keepalive: default_true(),
            keepalive_idle_secs: default_keepalive_idle_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            nodelay: default_true(),
            send_buffer_size: default_buffer_size(),
            recv_buffer_size: default_buffer_size(),
        }
    }
}

impl SocketPolicy {
    /// Creates an unbound socket of the right family with the pre-connect
    /// options applied.
    pub fn socket_for(&self, addr: SocketAddr) -> io::Result<TcpSocket> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(self.keepalive)?;
        if self.send_buffer_size > 0 {
            socket.set_send_buffer_size(self.send_buffer_size)?;
        }
        if self.recv_buffer_size > 0 {
            socket.set_recv_buffer_size(self.recv_buffer_size)?;
        }
        Ok(socket)
    }

    /// Opens an outbound stream to `addr` with the full policy applied.
    pub async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let stream = self.socket_for(addr)?.connect(addr).await?;
        self.apply(&stream)?;
        Ok(stream)
    }

    /// Binds a listener whose accepted sockets inherit keep-alive and buffer
    /// sizes.
    pub fn listen(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        let socket = self.socket_for(addr)?;
        #[cfg(not(windows))]
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(LISTEN_BACKLOG)
    }

    /// Applies the per-stream options: no-delay and keep-alive timing.
    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;
        if self.keepalive {
            SockRef::from(stream).set_tcp_keepalive(&self.keepalive_timing())?;
        }
        Ok(())
    }

    fn keepalive_timing(&self) -> TcpKeepalive {
        let timing = match self.keepalive_idle_secs {
            0 => TcpKeepalive::new(),
            secs => TcpKeepalive::new().with_time(Duration::from_secs(secs)),
        };
        #[cfg(any(
            target_os = "linux",
            target_os = "android",
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "netbsd",
            target_os = "windows",
        ))]
        let timing = match self.keepalive_interval_secs {
            0 => timing,
            secs => timing.with_interval(Duration::from_secs(secs)),
        };
        timing
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
