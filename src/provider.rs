//! OpenSSL provider loading.

/// Load the providers RC4 needs. On OpenSSL 3 RC4 moved to the legacy
/// provider, and loading it replaces the implicit default, so both are loaded.
#[cfg(ossl3)]
pub(crate) fn load_legacy_providers() {
    use openssl::provider::Provider;
    use std::sync::OnceLock;

    static PROVIDERS: OnceLock<Vec<Provider>> = OnceLock::new();
    PROVIDERS.get_or_init(|| {
        let mut loaded = Vec::new();
        for name in ["default", "legacy"] {
            match Provider::try_load(None, name, true) {
                Ok(provider) => loaded.push(provider),
                Err(e) => log::warn!("could not load OpenSSL {name} provider: {e}"),
            }
        }
        // OSSL_PROVIDER_load leaves errors on the stack even on success.
        let _ = openssl::error::ErrorStack::get();
        loaded
    });
}

#[cfg(not(ossl3))]
pub(crate) fn load_legacy_providers() {}
