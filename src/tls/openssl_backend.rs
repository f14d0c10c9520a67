use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use openssl::ssl::{
    SslConnector, SslContextBuilder, SslMethod, SslStream, SslVerifyMode, SslVersion,
};

use super::{TlsConnector, TlsSession};
use crate::config::{TlsSettings, TlsVersion};
use crate::error::{Error, Result};
use crate::provider::load_legacy_providers;
use crate::keylog::KeyLogFile;

/// Client side of libssl, configured to accept whatever the server offers.
pub struct OpenSslConnector {
    inner: SslConnector,
}

impl OpenSslConnector {
    /// Build an `SSL_CTX` from `settings`.
    pub fn new(settings: &TlsSettings) -> Result<Self> {
        load_legacy_providers();

        let mut builder = SslConnector::builder(SslMethod::tls_client())?;

        if let Some(level) = settings.security_level {
            builder.set_security_level(level);
        }
        let max_version = offered_max_version(settings);
        if let Some(ciphers) = &settings.cipher_list {
            pin_cipher_list(&mut builder, ciphers, max_version)?;
        }
        builder.set_min_proto_version(settings.min_version.map(ssl_version))?;
        builder.set_max_proto_version(max_version.map(ssl_version))?;

        // Lab servers present self-signed certificates.
        builder.set_verify(SslVerifyMode::NONE);

        if let Some(path) = &settings.key_log {
            let sink = Arc::new(KeyLogFile::open(path)?);
            builder.set_keylog_callback(move |_, line| sink.log_line(line));
        }

        Ok(Self {
            inner: builder.build(),
        })
    }
}

impl TlsConnector for OpenSslConnector {
    fn connect(&self, server_name: &str, tcp: TcpStream) -> Result<Box<dyn TlsSession>> {
        let config = self
            .inner
            .configure()?
            .verify_hostname(false)
            .use_server_name_indication(true);
        let stream = config.connect(server_name, tcp)?;
        Ok(Box::new(OpenSslSession(stream)))
    }
}

struct OpenSslSession(SslStream<TcpStream>);

impl Read for OpenSslSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for OpenSslSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl TlsSession for OpenSslSession {
    fn cipher_name(&self) -> String {
        self.0
            .ssl()
            .current_cipher()
            .map(|c| c.name().to_owned())
            .unwrap_or_else(|| "(none)".to_owned())
    }

    fn protocol_version(&self) -> String {
        self.0.ssl().version_str().to_owned()
    }
}

impl Drop for OpenSslSession {
    fn drop(&mut self) {
        // Best effort close_notify; the peer has usually hung up already.
        let _ = self.0.shutdown();
    }
}

/// Highest version the client offers. A cipher list only covers TLS 1.2 and
/// below, so an explicit list caps an open-ended range at TLS 1.2.
fn offered_max_version(settings: &TlsSettings) -> Option<TlsVersion> {
    match settings.max_version {
        None if settings.cipher_list.is_some()
            && settings.min_version < Some(TlsVersion::Tls1_3) =>
        {
            Some(TlsVersion::Tls1_2)
        }
        max => max,
    }
}

/// Restrict `builder` to `ciphers`. The TLS 1.3 suites are configured
/// separately in libssl and are cleared when TLS 1.3 is out of range.
pub(crate) fn pin_cipher_list(
    builder: &mut SslContextBuilder,
    ciphers: &str,
    max_version: Option<TlsVersion>,
) -> Result<()> {
    builder.set_cipher_list(ciphers).map_err(|e| {
        Error::Config(format!("cipher list {ciphers:?} not accepted by libssl: {e}"))
    })?;
    if matches!(max_version, Some(v) if v < TlsVersion::Tls1_3) {
        builder.set_ciphersuites("")?;
    }
    Ok(())
}

pub(crate) fn ssl_version(version: TlsVersion) -> SslVersion {
    match version {
        TlsVersion::Tls1_0 => SslVersion::TLS1,
        TlsVersion::Tls1_1 => SslVersion::TLS1_1,
        TlsVersion::Tls1_2 => SslVersion::TLS1_2,
        TlsVersion::Tls1_3 => SslVersion::TLS1_3,
    }
}
