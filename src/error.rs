//! Error type shared by the probe and the line server.
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while configuring or running a probe or the line server.
#[derive(Debug, Error)]
pub enum Error {
    /// The TCP connection could not be established in time.
    #[error("TCP connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Address that was dialled.
        addr: SocketAddr,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The TCP connection failed for another reason.
    #[error("TCP connect to {addr} failed: {source}")]
    Connect {
        /// Address that was dialled.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The TLS handshake did not complete.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// The settings are contradictory or cannot be expressed by the backend.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The key log file could not be opened.
    #[error("cannot open key log file {path}: {source}")]
    KeyLog {
        /// Path of the key log file.
        path: PathBuf,
        /// Underlying file error.
        #[source]
        source: io::Error,
    },

    /// The data file served by the line server is unusable.
    #[error("line source: {0}")]
    LineSource(#[from] crate::line_source::LineError),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error reported by OpenSSL.
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    /// Error reported by rustls.
    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),
}

impl<S: std::fmt::Debug> From<openssl::ssl::HandshakeError<S>> for Error {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        Error::Handshake(e.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
