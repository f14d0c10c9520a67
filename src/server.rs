//! Sequential HTTPS server handing out one RC4-encrypted line per request.
use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};

use crate::config::TlsVersion;
use crate::error::Result;
use crate::keylog::KeyLogFile;
use crate::line_source::{LineSource, Rc4Payload};
use crate::provider::load_legacy_providers;
use crate::tls::openssl_backend::{pin_cipher_list, ssl_version};

const MAX_REQUEST_HEAD: usize = 8192;
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the server listens and what it serves.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM private key.
    pub key_path: PathBuf,
    /// Text file, one payload per line.
    pub data_path: PathBuf,
    /// Persisted rotation position.
    pub index_path: PathBuf,
    /// The only path that gets a line.
    pub path: String,
    /// Application-layer RC4 key.
    pub rc4_key: Vec<u8>,
    /// OpenSSL cipher list. Setting one restricts the server to TLS 1.2 and
    /// below. `None` keeps the Mozilla intermediate suites and TLS 1.3.
    pub cipher_list: Option<String>,
    /// OpenSSL security level override.
    pub security_level: Option<u32>,
    /// Append session secrets here.
    pub key_log: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: (Ipv4Addr::UNSPECIFIED, 443).into(),
            cert_path: PathBuf::from("certs/server.crt"),
            key_path: PathBuf::from("certs/server.key"),
            data_path: PathBuf::from("data.txt"),
            index_path: PathBuf::from("line_index.txt"),
            path: "/".to_owned(),
            rc4_key: crate::line_source::DEFAULT_RC4_KEY.to_vec(),
            cipher_list: None,
            security_level: None,
            key_log: None,
        }
    }
}

/// A bound listener with its TLS context.
pub struct LineServer {
    listener: TcpListener,
    acceptor: SslAcceptor,
    source: LineSource,
    payload: Rc4Payload,
    path: String,
}

impl LineServer {
    /// Load the certificate and key and bind the listener.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        load_legacy_providers();

        let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server())?;
        if let Some(level) = config.security_level {
            builder.set_security_level(level);
        }
        if let Some(ciphers) = &config.cipher_list {
            pin_cipher_list(&mut builder, ciphers, Some(TlsVersion::Tls1_2))?;
            builder.set_max_proto_version(Some(ssl_version(TlsVersion::Tls1_2)))?;
        }
        log::info!("loading certificate {}", config.cert_path.display());
        builder.set_certificate_chain_file(&config.cert_path)?;
        log::info!("loading private key {}", config.key_path.display());
        builder.set_private_key_file(&config.key_path, SslFiletype::PEM)?;
        builder.check_private_key()?;
        if let Some(path) = &config.key_log {
            let sink = Arc::new(KeyLogFile::open(path)?);
            builder.set_keylog_callback(move |_, line| sink.log_line(line));
        }

        let listener = TcpListener::bind(config.bind)?;
        log::info!("serving on https://{}", listener.local_addr()?);

        Ok(Self {
            listener,
            acceptor: builder.build(),
            source: LineSource::new(config.data_path, config.index_path),
            payload: Rc4Payload::new(&config.rc4_key),
            path: config.path,
        })
    }

    /// Address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections one after another. A failed handshake or exchange
    /// only drops that client; an error from the listener itself is returned.
    pub fn serve(&self) -> Result<()> {
        loop {
            let tcp = self.accept()?;
            if let Err(e) = self.handle(tcp) {
                log::warn!("connection failed: {e}");
            }
        }
    }

    /// Accept and answer a single connection, returning the raw request head
    /// the client sent.
    pub fn serve_one(&self) -> Result<Vec<u8>> {
        let tcp = self.accept()?;
        self.handle(tcp)
    }

    fn accept(&self) -> Result<TcpStream> {
        let (tcp, peer) = self.listener.accept()?;
        log::debug!("connection from {peer}");
        Ok(tcp)
    }

    fn handle(&self, tcp: TcpStream) -> Result<Vec<u8>> {
        tcp.set_read_timeout(Some(CLIENT_TIMEOUT))?;
        let mut tls = self.acceptor.accept(tcp)?;
        if let Some(cipher) = tls.ssl().current_cipher() {
            log::info!("{} with {}", tls.ssl().version_str(), cipher.name());
        }

        let head = read_request_head(&mut tls)?;
        let response = self.respond(&head);
        tls.write_all(&response)?;
        tls.flush()?;
        let _ = tls.shutdown();
        Ok(head)
    }

    /// Build the full HTTP response for a raw request head.
    fn respond(&self, head: &[u8]) -> Vec<u8> {
        let head = String::from_utf8_lossy(head);
        let Some((method, path)) = parse_request_line(&head) else {
            return response(400, "Bad Request", b"Bad Request\n");
        };
        log::info!("{method} {path}");
        if method != "GET" {
            return response(501, "Not Implemented", b"Not Implemented\n");
        }
        if path != self.path {
            return response(404, "Not Found", b"Not Found\n");
        }

        let body = match self.source.next_line() {
            Ok(line) => match self.payload.encode(&line) {
                Ok(encoded) => encoded,
                Err(e) => {
                    log::error!("encrypting line failed: {e}");
                    "Error: Encryption failed\n".to_owned()
                }
            },
            Err(e) => {
                log::error!("{e}");
                e.client_message().to_owned()
            }
        };
        response(200, "OK", body.as_bytes())
    }
}

fn read_request_head<R: Read>(stream: &mut R) -> Result<Vec<u8>> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") && head.len() < MAX_REQUEST_HEAD {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Ok(head)
}

fn parse_request_line(head: &str) -> Option<(&str, &str)> {
    let mut parts = head.lines().next()?.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    parts.next()?.starts_with("HTTP/").then_some((method, path))
}

fn response(status: u16, reason: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.0 {status} {reason}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;
    use crate::error::Error;
    use crate::fixtures::line_server;

    #[test]
    fn request_line_parsing() {
        assert_eq!(
            parse_request_line("GET /x HTTP/1.1\r\nHost: a\r\n\r\n"),
            Some(("GET", "/x"))
        );
        assert_eq!(parse_request_line("GET /x\r\n"), None);
        assert_eq!(parse_request_line("garbage"), None);
        assert_eq!(parse_request_line(""), None);
    }

    #[test]
    fn response_framing() {
        let r = response(404, "Not Found", b"Not Found\n");
        let text = String::from_utf8(r).unwrap();
        assert!(text.starts_with("HTTP/1.0 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 10\r\n"));
        assert!(text.ends_with("\r\n\r\nNot Found\n"));
    }

    #[test]
    fn head_reader_stops_at_blank_line() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let head = read_request_head(&mut input).unwrap();
        assert!(head.ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn only_listener_errors_end_serve() {
        let work = tempfile::tempdir().unwrap();
        let server = line_server(work.path(), "/", None);
        let addr = server.local_addr().unwrap();

        let mut garbage = TcpStream::connect(addr).unwrap();
        garbage.write_all(b"not a client hello\r\n\r\n").unwrap();
        drop(garbage);

        // With nothing left to accept the listener reports WouldBlock, which
        // is the only way out of the loop.
        server.listener.set_nonblocking(true).unwrap();
        match server.serve() {
            Err(Error::Io(e)) => assert_eq!(e.kind(), ErrorKind::WouldBlock),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn garbage_client_fails_only_its_own_connection() {
        let work = tempfile::tempdir().unwrap();
        let server = line_server(work.path(), "/", None);
        let addr = server.local_addr().unwrap();

        let mut garbage = TcpStream::connect(addr).unwrap();
        garbage.write_all(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(matches!(
            server.serve_one(),
            Err(Error::Handshake(_))
        ));
    }
}
