//! One connect, handshake, request, dump cycle.
use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::config::ProbeConfig;
use crate::error::{Error, Result};
use crate::request::STATUS_REQUEST;
use crate::tls::{self, TlsConnector};

/// Marker written before the response bytes.
pub const RESPONSE_BEGIN: &str = "--- Response ---";
/// Marker written after the response bytes.
pub const RESPONSE_END: &str = "--- End Response ---";

/// What one completed exchange negotiated and received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Cipher suite the server picked.
    pub cipher: String,
    /// Protocol version the server picked.
    pub protocol: String,
    /// Response bytes copied to the output.
    pub bytes_received: u64,
}

/// A configured client, reusable across attempts.
pub struct Probe {
    config: ProbeConfig,
    connector: Box<dyn TlsConnector>,
}

impl Probe {
    /// Validate `config` and build the TLS context once.
    pub fn new(config: ProbeConfig) -> Result<Self> {
        config.validate()?;
        let connector = tls::connector(config.backend, &config.tls)?;
        Ok(Self { config, connector })
    }

    /// The config this probe was built from.
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run one exchange, copying the framed response to `out`.
    pub fn exchange<W: Write>(&self, out: &mut W) -> Result<Exchange> {
        let addr = self.config.target;
        let timeout = self.config.connect_timeout;
        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|source| {
            if source.kind() == io::ErrorKind::TimedOut {
                Error::ConnectTimeout { addr, timeout }
            } else {
                Error::Connect { addr, source }
            }
        })?;
        log::info!("TCP connected to {addr}");

        let mut session = self.connector.connect(&self.config.server_name, tcp)?;
        let cipher = session.cipher_name();
        let protocol = session.protocol_version();
        log::info!("TLS handshake successful, cipher {cipher} ({protocol})");

        session.write_all(STATUS_REQUEST.as_bytes())?;
        session.flush()?;
        log::info!("HTTP request sent");

        writeln!(out, "{RESPONSE_BEGIN}")?;
        let bytes_received = copy_response(&mut session, out, self.config.read_buffer_size)?;
        writeln!(out, "\n{RESPONSE_END}")?;
        out.flush()?;
        log::debug!("received {bytes_received} bytes");

        Ok(Exchange {
            cipher,
            protocol,
            bytes_received,
        })
    }
}

/// Copy until the peer closes. Read errors end the response; only failures
/// writing to `out` are reported.
fn copy_response<R, W>(session: &mut R, out: &mut W, buffer_size: usize) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        match session.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                out.write_all(&buf[..n])?;
                total += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                log::debug!("peer closed without close_notify");
                break;
            }
            Err(e) => {
                log::warn!("read failed after {total} bytes: {e}");
                break;
            }
        }
    }
    Ok(total)
}
