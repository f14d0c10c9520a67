//! TLS backends behind one connector interface.
use std::io::{Read, Write};
use std::net::TcpStream;

use crate::config::{Backend, TlsSettings};
use crate::error::Result;

pub(crate) mod openssl_backend;
mod rustls_backend;

pub use openssl_backend::OpenSslConnector;
pub use rustls_backend::RustlsConnector;

/// An established TLS session over TCP.
pub trait TlsSession: Read + Write {
    /// Negotiated cipher suite, in the backend's naming.
    fn cipher_name(&self) -> String;
    /// Negotiated protocol version.
    fn protocol_version(&self) -> String;
}

/// Turns a connected socket into a TLS session.
pub trait TlsConnector {
    /// Run the client handshake on `tcp`.
    fn connect(&self, server_name: &str, tcp: TcpStream) -> Result<Box<dyn TlsSession>>;
}

/// Build the connector for `backend` from `settings`.
pub fn connector(backend: Backend, settings: &TlsSettings) -> Result<Box<dyn TlsConnector>> {
    settings.validate()?;
    Ok(match backend {
        Backend::OpenSsl => Box::new(OpenSslConnector::new(settings)?),
        Backend::Rustls => Box::new(RustlsConnector::new(settings)?),
    })
}
