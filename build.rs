fn main() {
    println!("cargo:rustc-check-cfg=cfg(ossl3)");
    println!("cargo:rerun-if-env-changed=DEP_OPENSSL_VERSION_NUMBER");
    // RC4 lives in the legacy provider on OpenSSL 3, which has to be loaded
    // explicitly. openssl-sys exports the linked version to direct dependents;
    // fall back to pkg-config when that isn't available.
    let version = std::env::var("DEP_OPENSSL_VERSION_NUMBER")
        .ok()
        .and_then(|v| u64::from_str_radix(&v, 16).ok())
        .map(|v| v >> 28)
        .or_else(|| {
            let lib = pkg_config::Config::new()
                .cargo_metadata(false)
                .probe("openssl")
                .ok()?;
            lib.version.split('.').next()?.parse::<u64>().ok()
        });

    if let Some(major) = version {
        if major >= 3 {
            println!("cargo:rustc-cfg=ossl3");
        }
    }
}
