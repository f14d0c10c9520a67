//! NSS key log sink, shared by both TLS backends.
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Appends session secrets to a file in the format Wireshark reads.
#[derive(Debug)]
pub struct KeyLogFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl KeyLogFile {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| Error::KeyLog {
                path: path.clone(),
                source,
            })?;
        log::info!("writing TLS session secrets to {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path the secrets go to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one pre-formatted line, as handed out by OpenSSL.
    pub fn log_line(&self, line: &str) {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.write(&buf);
        buf.zeroize();
    }

    /// Format and append `label client_random secret`.
    pub fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        let mut secret = hex::encode(secret);
        let mut line = format!("{label} {} {secret}\n", hex::encode(client_random));
        self.write(line.as_bytes());
        line.zeroize();
        secret.zeroize();
    }

    fn write(&self, bytes: &[u8]) {
        let Ok(mut file) = self.file.lock() else {
            log::warn!("key log {} is poisoned, dropping secret", self.path.display());
            return;
        };
        if let Err(e) = file.write_all(bytes).and_then(|()| file.flush()) {
            log::warn!("failed to write key log {}: {e}", self.path.display());
        }
    }
}

impl rustls::KeyLog for KeyLogFile {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        KeyLogFile::log(self, label, client_random, secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_nss_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.log");
        let sink = KeyLogFile::open(&path).unwrap();

        sink.log("CLIENT_RANDOM", &[0x00, 0xab], &[0xff, 0x10, 0x01, 0x0a]);
        sink.log_line("SERVER_TRAFFIC_SECRET_0 aa bb");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "CLIENT_RANDOM 00ab ff10010a\nSERVER_TRAFFIC_SECRET_0 aa bb\n"
        );
    }

    #[test]
    fn appends_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.log");

        KeyLogFile::open(&path).unwrap().log_line("first");
        KeyLogFile::open(&path).unwrap().log_line("second");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().collect::<Vec<_>>(), ["first", "second"]);
    }

    #[test]
    fn open_reports_path_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("keys.log");
        match KeyLogFile::open(&path) {
            Err(Error::KeyLog { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
