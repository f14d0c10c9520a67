//! Rotating line source and RC4 payload encoding for the uplink line server.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use openssl::symm::{encrypt, Cipher};
use thiserror::Error;

use crate::error::Result;
use crate::provider::load_legacy_providers;

/// Application-layer key the lab server encrypts each line with.
pub const DEFAULT_RC4_KEY: &[u8] = b"CTF_KEY_12345";

/// Why no line could be produced.
#[derive(Debug, Error)]
pub enum LineError {
    /// The data file does not exist.
    #[error("{} not found", .0.display())]
    Missing(PathBuf),
    /// The data file exists but could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        /// Data file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The data file has no lines.
    #[error("{} is empty", .0.display())]
    Empty(PathBuf),
}

impl LineError {
    /// Body sent to the client in place of a line.
    pub fn client_message(&self) -> &'static str {
        match self {
            LineError::Missing(_) => "Error: data.txt not found\n",
            LineError::Unreadable { .. } => "Error: Cannot read data.txt\n",
            LineError::Empty(_) => "Error: data.txt is empty\n",
        }
    }
}

/// Hands out the lines of a text file one per call, wrapping around, with the
/// position persisted in a separate index file.
#[derive(Debug, Clone)]
pub struct LineSource {
    data_path: PathBuf,
    index_path: PathBuf,
}

impl LineSource {
    /// Serve lines of `data_path`, tracking the position in `index_path`.
    pub fn new(data_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            index_path: index_path.into(),
        }
    }

    /// Return the current line (trimmed) and advance the index.
    pub fn next_line(&self) -> std::result::Result<String, LineError> {
        let contents = fs::read_to_string(&self.data_path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                LineError::Missing(self.data_path.clone())
            } else {
                LineError::Unreadable {
                    path: self.data_path.clone(),
                    source,
                }
            }
        })?;
        let lines: Vec<&str> = contents.lines().collect();
        if lines.is_empty() {
            return Err(LineError::Empty(self.data_path.clone()));
        }

        let len = lines.len() as i64;
        let current = self.read_index().rem_euclid(len);
        let line = lines[current as usize].trim().to_owned();

        let next = (current + 1) % len;
        if let Err(e) = fs::write(&self.index_path, next.to_string()) {
            log::error!(
                "unable to update line index file {}: {e}",
                self.index_path.display()
            );
        }
        Ok(line)
    }

    fn read_index(&self) -> i64 {
        match fs::read_to_string(&self.index_path) {
            Ok(content) => {
                let content = content.trim();
                if content.is_empty() {
                    return 0;
                }
                content.parse().unwrap_or_else(|_| {
                    log::warn!(
                        "invalid content in {}, resetting index to 0",
                        self.index_path.display()
                    );
                    0
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!(
                    "{} not found, starting index at 0",
                    self.index_path.display()
                );
                if let Err(e) = fs::write(&self.index_path, "0") {
                    log::error!(
                        "unable to create index file {}: {e}",
                        self.index_path.display()
                    );
                }
                0
            }
            Err(e) => {
                log::error!("error reading {}: {e}, using index 0", self.index_path.display());
                0
            }
        }
    }

    /// Path of the data file.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

/// RC4-encrypts a line with a fixed key and base64 encodes the result.
#[derive(Clone)]
pub struct Rc4Payload {
    key: Vec<u8>,
}

impl std::fmt::Debug for Rc4Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rc4Payload").finish_non_exhaustive()
    }
}

impl Default for Rc4Payload {
    fn default() -> Self {
        Self::new(DEFAULT_RC4_KEY)
    }
}

impl Rc4Payload {
    /// Use `key` for every line. Each line starts a fresh keystream.
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    /// Raw RC4 ciphertext of `line`.
    pub fn encrypt(&self, line: &str) -> Result<Vec<u8>> {
        load_legacy_providers();
        Ok(encrypt(Cipher::rc4(), &self.key, None, line.as_bytes())?)
    }

    /// Base64 of the ciphertext, newline terminated, as sent on the wire.
    pub fn encode(&self, line: &str) -> Result<String> {
        let mut encoded = STANDARD.encode(self.encrypt(line)?);
        encoded.push('\n');
        Ok(encoded)
    }
}

impl Drop for Rc4Payload {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(dir: &Path, data: Option<&str>) -> LineSource {
        let data_path = dir.join("data.txt");
        if let Some(data) = data {
            fs::write(&data_path, data).unwrap();
        }
        LineSource::new(data_path, dir.join("line_index.txt"))
    }

    #[test]
    fn rotates_and_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path(), Some("alpha\n  beta  \ngamma\n"));

        let served: Vec<_> = (0..4).map(|_| source.next_line().unwrap()).collect();
        assert_eq!(served, ["alpha", "beta", "gamma", "alpha"]);
        assert_eq!(
            fs::read_to_string(dir.path().join("line_index.txt")).unwrap(),
            "1"
        );
    }

    #[test]
    fn out_of_range_index_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path(), Some("a\nb\nc\n"));
        fs::write(dir.path().join("line_index.txt"), "7").unwrap();
        assert_eq!(source.next_line().unwrap(), "b");
    }

    #[test]
    fn garbage_index_resets() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path(), Some("a\nb\n"));
        fs::write(dir.path().join("line_index.txt"), "not a number").unwrap();
        assert_eq!(source.next_line().unwrap(), "a");
        assert_eq!(source.next_line().unwrap(), "b");
    }

    #[test]
    fn missing_and_empty_data() {
        let dir = tempfile::tempdir().unwrap();
        let missing = source(dir.path(), None);
        let err = missing.next_line().unwrap_err();
        assert_eq!(err.client_message(), "Error: data.txt not found\n");

        let empty = source(dir.path(), Some(""));
        let err = empty.next_line().unwrap_err();
        assert_eq!(err.client_message(), "Error: data.txt is empty\n");
    }

    #[test]
    fn rc4_known_answer() {
        // Test vector from the original RC4 publication.
        let payload = Rc4Payload::new(b"Key");
        assert_eq!(
            payload.encrypt("Plaintext").unwrap(),
            [0xbb, 0xf3, 0x16, 0xe8, 0xd9, 0x40, 0xaf, 0x0a, 0xd3]
        );
        assert_eq!(payload.encode("Plaintext").unwrap(), "u/MW6NlArwrT\n");
    }

    #[test]
    fn each_line_restarts_keystream() {
        let payload = Rc4Payload::default();
        assert_eq!(
            payload.encode("status").unwrap(),
            payload.encode("status").unwrap()
        );
    }
}
