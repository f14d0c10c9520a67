//! Connects to the uplink server with weakened TLS settings, requests the
//! status document and prints whatever comes back.
//!
//! `--profile` picks one of the built-in variants; the other flags override
//! individual settings. Set `SSLKEYLOGFILE` (or `--keylog-file`) to capture
//! session secrets for Wireshark.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use uplink_probe::config::{DEFAULT_SERVER_NAME, DEFAULT_TARGET, RETRY_INTERVAL};
use uplink_probe::{Backend, Probe, ProbeConfig, Profile, Runner, Schedule, TlsVersion};

#[derive(Parser, Debug)]
#[command(name = "uplink-probe", version, about, long_about = None)]
struct Args {
    /// Built-in variant to start from
    #[arg(long, value_enum, default_value_t = Profile::Rc4)]
    profile: Profile,

    /// Server address
    #[arg(long, default_value_t = DEFAULT_TARGET)]
    target: SocketAddr,

    /// Name sent in SNI
    #[arg(long, default_value = DEFAULT_SERVER_NAME)]
    server_name: String,

    /// Cipher list (OpenSSL syntax, or IANA names for rustls)
    #[arg(long, value_name = "LIST")]
    ciphers: Option<String>,

    /// Pin both protocol bounds to one version
    #[arg(long, value_enum, conflicts_with_all = ["tls_min", "tls_max"])]
    tls_version: Option<TlsVersion>,

    /// Lowest protocol version offered
    #[arg(long, value_enum)]
    tls_min: Option<TlsVersion>,

    /// Highest protocol version offered
    #[arg(long, value_enum)]
    tls_max: Option<TlsVersion>,

    /// OpenSSL security level (0 allows RC4)
    #[arg(long, value_name = "LEVEL")]
    security_level: Option<u32>,

    /// Append session secrets to this file
    #[arg(long, env = "SSLKEYLOGFILE", value_name = "FILE")]
    keylog_file: Option<PathBuf>,

    /// TLS library
    #[arg(long, value_enum, default_value_t = Backend::OpenSsl)]
    backend: Backend,

    /// Run a single exchange regardless of profile
    #[arg(long, conflicts_with_all = ["count", "interval_secs"])]
    once: bool,

    /// Stop after this many attempts
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    count: Option<u64>,

    /// Seconds to sleep between attempts
    #[arg(long, value_name = "SECONDS")]
    interval_secs: Option<u64>,

    /// Seconds to wait for the TCP connect
    #[arg(long, value_name = "SECONDS", default_value_t = 10)]
    connect_timeout_secs: u64,
}

impl Args {
    fn into_config(self) -> ProbeConfig {
        let mut config = ProbeConfig::from_profile(self.profile, self.target);
        config.server_name = self.server_name;
        config.backend = self.backend;
        config.connect_timeout = Duration::from_secs(self.connect_timeout_secs);

        let tls = &mut config.tls;
        if let Some(ciphers) = self.ciphers {
            tls.cipher_list = Some(ciphers);
        }
        if let Some(version) = self.tls_version {
            tls.min_version = Some(version);
            tls.max_version = Some(version);
        }
        if let Some(min) = self.tls_min {
            tls.min_version = Some(min);
        }
        if let Some(max) = self.tls_max {
            tls.max_version = Some(max);
        }
        if let Some(level) = self.security_level {
            tls.security_level = Some(level);
        }
        if let Some(path) = self.keylog_file {
            tls.key_log = Some(path);
        }

        if self.once {
            config.schedule = Schedule::Once;
        } else if self.count.is_some() || self.interval_secs.is_some() {
            let interval = match (self.interval_secs, config.schedule) {
                (Some(secs), _) => Duration::from_secs(secs),
                (None, Schedule::Every { interval, .. }) => interval,
                (None, Schedule::Once) => RETRY_INTERVAL,
            };
            config.schedule = Schedule::Every {
                interval,
                max_attempts: self.count,
            };
        }
        config
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let profile = args.profile;
    let config = args.into_config();
    log::info!(
        "profile {profile:?}: {} via {:?}, ciphers {}",
        config.target,
        config.backend,
        config.tls.cipher_list.as_deref().unwrap_or("(library default)")
    );

    let probe = Probe::new(config).context("failed to set up the TLS client")?;
    let stdout = std::io::stdout();
    let summary = Runner::new(probe)
        .run(&mut stdout.lock())
        .context("exchange failed")?;
    log::info!(
        "{} attempt(s), {} succeeded, {} failed",
        summary.attempts(),
        summary.succeeded,
        summary.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ProbeConfig {
        Args::try_parse_from(std::iter::once("uplink-probe").chain(args.iter().copied()))
            .unwrap()
            .into_config()
    }

    #[test]
    fn defaults_match_first_variant() {
        let config = parse(&["--keylog-file", "k.log"]);
        assert_eq!(config.target, DEFAULT_TARGET);
        assert_eq!(config.tls.cipher_list.as_deref(), Some("RC4-SHA"));
        assert_eq!(config.schedule, Schedule::Once);
        assert_eq!(config.tls.key_log, Some(PathBuf::from("k.log")));
    }

    #[test]
    fn count_turns_single_shot_into_bounded_loop() {
        let config = parse(&["--count", "3", "--keylog-file", "k.log"]);
        assert_eq!(
            config.schedule,
            Schedule::Every {
                interval: RETRY_INTERVAL,
                max_attempts: Some(3)
            }
        );
    }

    #[test]
    fn tls_version_pins_both_bounds() {
        let config = parse(&[
            "--profile",
            "rc4-loop",
            "--target",
            "10.0.0.7:8443",
            "--tls-version",
            "1.2",
            "--keylog-file",
            "k.log",
        ]);
        assert_eq!(config.target, "10.0.0.7:8443".parse::<SocketAddr>().unwrap());
        assert_eq!(config.tls.min_version, Some(TlsVersion::Tls1_2));
        assert_eq!(config.tls.max_version, Some(TlsVersion::Tls1_2));
    }

    #[test]
    fn zero_count_is_refused() {
        assert!(Args::try_parse_from(["uplink-probe", "--count", "0"]).is_err());
        assert!(parse(&["--count", "1", "--keylog-file", "k.log"])
            .validate()
            .is_ok());
    }

    #[test]
    fn once_conflicts_with_count() {
        assert!(Args::try_parse_from(["uplink-probe", "--once", "--count", "2"]).is_err());
    }
}
