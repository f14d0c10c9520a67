//! Probe configuration and the four built-in profiles.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::error::{Error, Result};

/// Default target: the local uplink server on the HTTPS port.
pub const DEFAULT_TARGET: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 443);

/// Name sent in SNI and expected by the default request's `Host` header.
pub const DEFAULT_SERVER_NAME: &str = "localhost";

/// Size of the buffer the response is read through.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Pause between attempts in the looping profiles.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Key log file used when `SSLKEYLOGFILE` is unset.
pub const DEFAULT_KEY_LOG_FILE: &str = "sslkeylog.txt";

/// The successive probe variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// One exchange, `RC4-SHA` only.
    Rc4,
    /// `RC4-SHA` only, repeated forever.
    Rc4Loop,
    /// TLS 1.2 pinned, RC4 suites only, repeated forever.
    Tls12Rc4,
    /// TLS 1.2 pinned, default suites, session secrets written to a key log.
    KeyLog,
}

/// Protocol versions that can bound a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum TlsVersion {
    /// TLS 1.0
    #[value(name = "1.0")]
    Tls1_0,
    /// TLS 1.1
    #[value(name = "1.1")]
    Tls1_1,
    /// TLS 1.2
    #[value(name = "1.2")]
    Tls1_2,
    /// TLS 1.3
    #[value(name = "1.3")]
    Tls1_3,
}

/// TLS library driving the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    /// libssl via the `openssl` crate. The only backend that can offer RC4.
    #[default]
    #[value(name = "openssl")]
    OpenSsl,
    /// rustls with the OpenSSL-backed crypto provider.
    Rustls,
}

/// Handshake parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// Cipher list. OpenSSL syntax for the OpenSSL backend, colon separated
    /// IANA suite names for rustls. `None` keeps the library default.
    pub cipher_list: Option<String>,
    /// Lowest protocol version offered.
    pub min_version: Option<TlsVersion>,
    /// Highest protocol version offered.
    pub max_version: Option<TlsVersion>,
    /// OpenSSL security level. Level 0 is needed for RC4 and SHA-1 suites.
    pub security_level: Option<u32>,
    /// Where to append session secrets, if anywhere.
    pub key_log: Option<PathBuf>,
}

impl TlsSettings {
    /// Reject version bounds that cannot be satisfied.
    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min_version, self.max_version) {
            if min > max {
                return Err(Error::Config(format!(
                    "minimum TLS version {min:?} is above maximum {max:?}"
                )));
            }
        }
        Ok(())
    }
}

/// When to run exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// A single exchange.
    Once,
    /// Repeat with a fixed pause, optionally bounded.
    Every {
        /// Pause after each attempt.
        interval: Duration,
        /// Stop after this many attempts. `None` runs until killed.
        max_attempts: Option<u64>,
    },
}

impl Profile {
    /// The TLS settings this variant uses.
    pub fn settings(self) -> TlsSettings {
        match self {
            Profile::Rc4 | Profile::Rc4Loop => TlsSettings {
                cipher_list: Some("RC4-SHA".to_owned()),
                min_version: None,
                max_version: None,
                security_level: Some(0),
                key_log: None,
            },
            Profile::Tls12Rc4 => TlsSettings {
                cipher_list: Some("RC4-SHA:RC4-MD5".to_owned()),
                min_version: Some(TlsVersion::Tls1_2),
                max_version: Some(TlsVersion::Tls1_2),
                security_level: Some(0),
                key_log: None,
            },
            Profile::KeyLog => TlsSettings {
                cipher_list: None,
                min_version: Some(TlsVersion::Tls1_2),
                max_version: Some(TlsVersion::Tls1_2),
                security_level: None,
                key_log: Some(
                    std::env::var_os("SSLKEYLOGFILE")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_LOG_FILE)),
                ),
            },
        }
    }

    /// Whether this variant runs once or loops.
    pub fn schedule(self) -> Schedule {
        match self {
            Profile::Rc4 => Schedule::Once,
            _ => Schedule::Every {
                interval: RETRY_INTERVAL,
                max_attempts: None,
            },
        }
    }
}

/// Everything needed to run the probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Address to connect to.
    pub target: SocketAddr,
    /// SNI name. Certificates are not checked against it.
    pub server_name: String,
    /// Handshake parameters.
    pub tls: TlsSettings,
    /// TLS library to use.
    pub backend: Backend,
    /// Single shot or loop.
    pub schedule: Schedule,
    /// Upper bound on the TCP connect.
    pub connect_timeout: Duration,
    /// Chunk size for reading the response.
    pub read_buffer_size: usize,
}

impl ProbeConfig {
    /// Build the config a profile implies for `target`.
    pub fn from_profile(profile: Profile, target: SocketAddr) -> Self {
        Self {
            target,
            server_name: DEFAULT_SERVER_NAME.to_owned(),
            tls: profile.settings(),
            backend: Backend::default(),
            schedule: profile.schedule(),
            connect_timeout: Duration::from_secs(10),
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }

    /// Check the config before any socket is opened.
    pub fn validate(&self) -> Result<()> {
        self.tls.validate()?;
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read buffer size must be non-zero".into()));
        }
        if let Schedule::Every {
            max_attempts: Some(0),
            ..
        } = self.schedule
        {
            return Err(Error::Config("attempt count must be at least 1".into()));
        }
        if self.backend == Backend::Rustls {
            if let Some(TlsVersion::Tls1_0 | TlsVersion::Tls1_1) = self.tls.max_version {
                return Err(Error::Config(
                    "rustls does not implement TLS versions below 1.2".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::from_profile(Profile::Rc4, DEFAULT_TARGET)
    }
}
