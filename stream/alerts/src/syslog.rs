//! Syslog sink over UDP.
//!
//! UDP is used on purpose: TCP syslog requires non-default framing support
//! on the receiving server (an extra NUL frame delimiter with rsyslog's
//! `imtcp` input), so the default transport stays datagram based.
use std::net::SocketAddr;
use std::net::UdpSocket;

use anyhow::Context as AnyhowContext;
use anyhow::Result;

use mos_models::Severity;

/// Facility used for every message (local0).
const FACILITY: u8 = 16;

/// Default syslog UDP port.
const SYSLOG_PORT: u16 = 514;

/// Forward alert messages to a syslog server over UDP.
#[derive(Clone)]
pub struct Syslog {
    target: SocketAddr,
}

impl Syslog {
    /// Initialise a sink sending to the given syslog server IP.
    pub fn new(server: &str) -> Result<Syslog> {
        let target: SocketAddr = format!("{}:{}", server, SYSLOG_PORT)
            .parse()
            .with_context(|| format!("invalid syslog server address '{}'", server))?;
        Ok(Syslog { target })
    }

    /// Send one message at the given severity.
    pub fn send(&self, severity: Severity, message: &str) -> Result<()> {
        // Priority is facility * 8 + severity per RFC 3164.
        let priority = (FACILITY << 3) | syslog_severity(severity);
        let frame = format!("<{}>mos: {}", priority, message);
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.send_to(frame.as_bytes(), self.target)?;
        Ok(())
    }
}

/// Map alert severities onto syslog severity codes.
fn syslog_severity(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 2,
        Severity::Error => 3,
        Severity::Warning => 4,
        Severity::Info => 6,
        Severity::Debug => 7,
    }
}
