//! Lab HTTPS server: answers `GET /` with the next line of a data file,
//! RC4-encrypted at the application layer and base64 encoded.
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use uplink_probe::line_source::DEFAULT_RC4_KEY;
use uplink_probe::{LineServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "uplink-line-server", version, about, long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:443")]
    bind: SocketAddr,

    /// PEM certificate chain
    #[arg(long, default_value = "certs/server.crt")]
    cert: PathBuf,

    /// PEM private key
    #[arg(long, default_value = "certs/server.key")]
    key: PathBuf,

    /// File with one payload per line
    #[arg(long, default_value = "data.txt")]
    data: PathBuf,

    /// File holding the rotation position
    #[arg(long, default_value = "line_index.txt")]
    index: PathBuf,

    /// Request path that gets a line
    #[arg(long, default_value = "/")]
    path: String,

    /// Application-layer RC4 key
    #[arg(long, env = "UPLINK_RC4_KEY", hide_env_values = true)]
    rc4_key: Option<String>,

    /// Restrict the TLS layer to RC4 suites as well
    #[arg(long)]
    tls_rc4: bool,

    /// OpenSSL cipher list for the TLS layer
    #[arg(long, value_name = "LIST", conflicts_with = "tls_rc4")]
    ciphers: Option<String>,

    /// Append session secrets to this file
    #[arg(long, env = "SSLKEYLOGFILE", value_name = "FILE")]
    keylog_file: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let (cipher_list, security_level) = if self.tls_rc4 {
            (Some("RC4-SHA:RC4-MD5".to_owned()), Some(0))
        } else {
            (self.ciphers, None)
        };
        ServerConfig {
            bind: self.bind,
            cert_path: self.cert,
            key_path: self.key,
            data_path: self.data,
            index_path: self.index,
            path: self.path,
            rc4_key: self
                .rc4_key
                .map(String::into_bytes)
                .unwrap_or_else(|| DEFAULT_RC4_KEY.to_vec()),
            cipher_list,
            security_level,
            key_log: self.keylog_file,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    match &config.cipher_list {
        Some(list) => log::info!("TLS cipher list restricted to {list}"),
        None => log::info!("using default TLS cipher suites"),
    }
    let server = LineServer::bind(config).context("could not start the line server")?;
    server.serve().context("server stopped")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc4_transport_lowers_security_level() {
        let config = Args::try_parse_from(["uplink-line-server", "--tls-rc4"])
            .unwrap()
            .into_config();
        assert_eq!(config.cipher_list.as_deref(), Some("RC4-SHA:RC4-MD5"));
        assert_eq!(config.security_level, Some(0));
        assert_eq!(config.path, "/");
    }

    #[test]
    fn custom_key_is_used_verbatim() {
        let config = Args::try_parse_from(["uplink-line-server", "--rc4-key", "k3y"])
            .unwrap()
            .into_config();
        assert_eq!(config.rc4_key, b"k3y");
    }
}
