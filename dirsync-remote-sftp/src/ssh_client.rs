use russh::client::Handler;
use russh::keys::PublicKeyBase64;
use tracing::{info, warn};

/// SSH client handler. Only host key verification is customised.
pub(crate) struct Client {
    /// OpenSSH SHA256 fingerprints or raw base64 keys. `None` trusts any key.
    pub allowed_fingerprints: Option<Vec<String>>,
}

impl Client {
    fn accepts(&self, fingerprint: &str, key_b64: &str) -> bool {
        match &self.allowed_fingerprints {
            Some(allowed) => allowed.iter().any(|s| s == fingerprint || s == key_b64),
            None => true,
        }
    }
}

impl Handler for Client {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fp_sha256 = server_public_key
            .fingerprint(russh::keys::HashAlg::Sha256)
            .to_string();
        let key_b64 = server_public_key.public_key_base64();
        if self.allowed_fingerprints.is_none() {
            warn!("no host key allowlist configured, trusting {fp_sha256}");
            return Ok(true);
        }
        let ok = self.accepts(&fp_sha256, &key_b64);
        if ok {
            info!("server key {fp_sha256} accepted");
        } else {
            warn!("server key {fp_sha256} is not in the allowlist");
        }
        Ok(ok)
    }
}
