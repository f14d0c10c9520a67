//! A deliberately weak TLS client for lab traffic analysis, and the RC4 line
//! server it talks to.
//!
//! The probe connects, negotiates TLS with pinned or weakened settings (RC4
//! suites, a fixed protocol version, no certificate checks), sends one fixed
//! HTTP request, dumps the raw response and optionally repeats on a fixed
//! interval. Session secrets can be written to an NSS key log so captures can
//! be decrypted offline.
#![deny(missing_docs)]
pub mod config;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod keylog;
pub mod line_source;
pub mod probe;
mod provider;
pub mod request;
pub mod runner;
pub mod server;
pub mod tls;

pub use config::{Backend, ProbeConfig, Profile, Schedule, TlsSettings, TlsVersion};
pub use error::{Error, Result};
pub use line_source::{LineSource, Rc4Payload};
pub use probe::{Exchange, Probe};
pub use runner::{RunSummary, Runner};
pub use server::{LineServer, ServerConfig};
