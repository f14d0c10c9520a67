use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, ProtocolVersion, SignatureScheme,
    StreamOwned, SupportedCipherSuite, SupportedProtocolVersion,
};

use super::{TlsConnector, TlsSession};
use crate::config::{TlsSettings, TlsVersion};
use crate::error::{self, Error};
use crate::keylog::KeyLogFile;

/// rustls client using the OpenSSL-backed crypto provider.
///
/// rustls never implemented RC4 or anything below TLS 1.2, so this backend is
/// only useful for the key-logging profile and modern-suite comparisons.
pub struct RustlsConnector {
    config: Arc<ClientConfig>,
}

impl RustlsConnector {
    /// Build a `ClientConfig` from `settings`.
    pub fn new(settings: &TlsSettings) -> error::Result<Self> {
        let versions = protocol_versions(settings)?;

        let mut provider = rustls_openssl::default_provider();
        provider.cipher_suites = select_suites(
            &rustls_openssl::ALL_CIPHER_SUITES[..],
            settings.cipher_list.as_deref(),
            &versions,
        )?;
        let provider = Arc::new(provider);

        let mut config = ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&versions)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth();

        if let Some(path) = &settings.key_log {
            config.key_log = Arc::new(KeyLogFile::open(path)?);
        }

        Ok(Self {
            config: Arc::new(config),
        })
    }
}

impl TlsConnector for RustlsConnector {
    fn connect(&self, server_name: &str, mut tcp: TcpStream) -> error::Result<Box<dyn TlsSession>> {
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| Error::Config(format!("invalid server name {server_name:?}: {e}")))?;
        let mut conn = ClientConnection::new(self.config.clone(), name)?;
        while conn.is_handshaking() {
            conn.complete_io(&mut tcp)
                .map_err(|e| Error::Handshake(e.to_string()))?;
        }
        Ok(Box::new(RustlsSession(StreamOwned::new(conn, tcp))))
    }
}

fn protocol_versions(
    settings: &TlsSettings,
) -> error::Result<Vec<&'static SupportedProtocolVersion>> {
    let in_bounds = |v: TlsVersion| {
        settings.min_version.map_or(true, |min| v >= min)
            && settings.max_version.map_or(true, |max| v <= max)
    };
    let versions: Vec<_> = rustls::ALL_VERSIONS
        .iter()
        .copied()
        .filter(|v| tls_version(v.version).is_some_and(|t| in_bounds(t)))
        .collect();
    if versions.is_empty() {
        return Err(Error::Config(
            "no protocol version supported by rustls fits the configured bounds".into(),
        ));
    }
    Ok(versions)
}

/// Version string in libssl's spelling, so both backends report alike.
fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_0 => "TLSv1".to_owned(),
        ProtocolVersion::TLSv1_1 => "TLSv1.1".to_owned(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_owned(),
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_owned(),
        other => format!("{other:?}"),
    }
}

fn tls_version(version: ProtocolVersion) -> Option<TlsVersion> {
    match version {
        ProtocolVersion::TLSv1_2 => Some(TlsVersion::Tls1_2),
        ProtocolVersion::TLSv1_3 => Some(TlsVersion::Tls1_3),
        _ => None,
    }
}

/// Pick suites by name from a colon separated list. `None` or `DEFAULT`
/// keeps every suite usable with `versions`.
fn select_suites(
    available: &[SupportedCipherSuite],
    list: Option<&str>,
    versions: &[&'static SupportedProtocolVersion],
) -> error::Result<Vec<SupportedCipherSuite>> {
    let usable = |suite: &SupportedCipherSuite| {
        versions
            .iter()
            .any(|v| v.version == suite.version().version)
    };

    let selected: Vec<_> = match list.map(str::trim) {
        None | Some("") | Some("DEFAULT") => available.iter().copied().filter(usable).collect(),
        Some(list) => {
            let mut selected = Vec::new();
            for name in list.split(':').map(str::trim).filter(|n| !n.is_empty()) {
                selected.extend(
                    available
                        .iter()
                        .copied()
                        .filter(|s| usable(s) && suite_name(s).eq_ignore_ascii_case(name)),
                );
            }
            selected
        }
    };

    if selected.is_empty() {
        return Err(Error::Config(format!(
            "no rustls cipher suite matches {:?}",
            list.unwrap_or("DEFAULT")
        )));
    }
    Ok(selected)
}

fn suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// Accepts any certificate the server presents. Handshake signatures are
/// still checked so the session keys are bound to the presented key.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

struct RustlsSession(StreamOwned<ClientConnection, TcpStream>);

impl Read for RustlsSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for RustlsSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl TlsSession for RustlsSession {
    fn cipher_name(&self) -> String {
        self.0
            .conn
            .negotiated_cipher_suite()
            .map(|s| suite_name(&s))
            .unwrap_or_else(|| "(none)".to_owned())
    }

    fn protocol_version(&self) -> String {
        self.0
            .conn
            .protocol_version()
            .map(protocol_name)
            .unwrap_or_else(|| "(none)".to_owned())
    }
}

impl Drop for RustlsSession {
    fn drop(&mut self) {
        self.0.conn.send_close_notify();
        let _ = self.0.conn.complete_io(&mut self.0.sock);
    }
}
