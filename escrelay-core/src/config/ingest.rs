//! Ingestion configuration.

use escrelay_sdk::signature::IngestKey;

/// Authentication settings for event producers.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    secret: Box<[u8]>,
    key: IngestKey,
}

impl IngestConfig {
    /// Create a new IngestConfig from the shared producer secret.
    pub fn new(secret: impl Into<Box<[u8]>>) -> Self {
        let secret = secret.into();
        let key = IngestKey::new(&secret);
        Self { secret, key }
    }

    /// Raw secret bytes.
    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }

    /// HMAC key producer signatures are checked against.
    pub fn key(&self) -> &IngestKey {
        &self.key
    }
}
