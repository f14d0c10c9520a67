//! Shared test fixtures: a throw-away certificate and a line server on it.
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509NameBuilder, X509};
use tempfile::TempDir;

use crate::{LineServer, ServerConfig};

/// Self-signed certificate for `localhost`, generated once per test run.
pub(crate) struct Identity {
    dir: TempDir,
}

impl Identity {
    pub(crate) fn cert(&self) -> PathBuf {
        self.dir.path().join("server.crt")
    }

    pub(crate) fn key(&self) -> PathBuf {
        self.dir.path().join("server.key")
    }
}

pub(crate) fn identity() -> &'static Identity {
    static INSTANCE: OnceCell<Identity> = OnceCell::new();
    INSTANCE.get_or_init(|| {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "localhost").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(1).unwrap())
            .unwrap();
        let san = SubjectAlternativeName::new()
            .dns("localhost")
            .build(&builder.x509v3_context(None, None))
            .unwrap();
        builder.append_extension(san).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        let cert = builder.build();

        let dir = tempfile::tempdir().unwrap();
        let identity = Identity { dir };
        fs::write(identity.cert(), cert.to_pem().unwrap()).unwrap();
        fs::write(identity.key(), key.private_key_to_pem_pkcs8().unwrap()).unwrap();
        identity
    })
}

/// Line server on an ephemeral loopback port serving two lines from `work`.
pub(crate) fn line_server(work: &Path, path: &str, cipher_list: Option<&str>) -> LineServer {
    fs::write(work.join("data.txt"), "uplink nominal\nuplink degraded\n").unwrap();
    LineServer::bind(ServerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        cert_path: identity().cert(),
        key_path: identity().key(),
        data_path: work.join("data.txt"),
        index_path: work.join("line_index.txt"),
        path: path.to_owned(),
        cipher_list: cipher_list.map(str::to_owned),
        ..ServerConfig::default()
    })
    .unwrap()
}
