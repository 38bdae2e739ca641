//! Key storage backends that hold document device keys.
//!
//! A presentment never touches private key material. Every document names the secure area
//! its key batch lives in, and signing or key retirement goes through the [SecureArea]
//! registered under that name.
//!
//! Hosts build one [SecureAreaRegistry] at startup with every backend they support
//! (for example a hardware-backed area and a [SoftwareSecureArea]) and hand it to the
//! [DcApiHandler](crate::presentation::handler::DcApiHandler).
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

pub mod software;

pub use software::SoftwareSecureArea;

/// How many presentments a credential key may take part in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CredentialPolicy {
    /// Keys are reused, the holder rotates through the batch.
    RotateUse,
    /// Each key is used for exactly one presentment and retired afterwards.
    OneTimeUse,
}

/// Usage metadata of a key batch, as returned after recording a use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBatchInfo {
    pub credential_policy: CredentialPolicy,
    pub batch_size: usize,
    /// Number of presentments each key of the batch has been used for.
    pub used_counts: Vec<u64>,
}

impl KeyBatchInfo {
    pub fn new(credential_policy: CredentialPolicy, batch_size: usize) -> Self {
        Self {
            credential_policy,
            batch_size,
            used_counts: vec![0; batch_size],
        }
    }

    /// Whether the key at `index` may no longer be presented.
    ///
    /// Rotating keys are never exhausted. A one-time key is exhausted once used, or if the
    /// batch no longer tracks it.
    pub fn is_key_exhausted(&self, index: usize) -> bool {
        match self.credential_policy {
            CredentialPolicy::RotateUse => false,
            CredentialPolicy::OneTimeUse => self.used_counts.get(index).map_or(true, |c| *c > 0),
        }
    }
}

/// A backend holding batches of P-256 device keys.
#[async_trait]
pub trait SecureArea: Send + Sync {
    /// Name documents refer to this backend by.
    fn name(&self) -> &str;

    /// ES256 signature over `data`, as the raw `r || s` concatenation.
    async fn sign(&self, id: &str, key_index: usize, data: &[u8]) -> Result<Vec<u8>>;

    /// Record one use of the key at `key_index` and return the updated batch metadata.
    async fn update_key_batch_info(&self, id: &str, key_index: usize) -> Result<KeyBatchInfo>;

    /// Delete `batch_size` keys starting at `start_index`.
    async fn delete_key_batch(&self, id: &str, start_index: usize, batch_size: usize)
        -> Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no secure area registered under the name '{0}'")]
    UnknownSecureArea(String),
}

/// The secure areas available to this process, keyed by name.
#[derive(Clone, Default)]
pub struct SecureAreaRegistry {
    secure_areas: HashMap<String, Arc<dyn SecureArea>>,
}

impl SecureAreaRegistry {
    pub fn new(secure_areas: Vec<Arc<dyn SecureArea>>) -> Self {
        let mut registry = Self::default();
        for secure_area in secure_areas {
            registry.register(secure_area);
        }
        registry
    }

    /// Add a backend. A backend already registered under the same name is replaced.
    pub fn register(&mut self, secure_area: Arc<dyn SecureArea>) {
        self.secure_areas
            .insert(secure_area.name().to_string(), secure_area);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SecureArea>, Error> {
        self.secure_areas
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownSecureArea(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.secure_areas.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for SecureAreaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureAreaRegistry")
            .field("secure_areas", &self.secure_areas.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_lookup() {
        let software: Arc<dyn SecureArea> = Arc::new(SoftwareSecureArea::new("software"));
        let registry = SecureAreaRegistry::new(vec![software]);

        assert_eq!(registry.get("software").unwrap().name(), "software");
        assert!(matches!(
            registry.get("enclave"),
            Err(Error::UnknownSecureArea(name)) if name == "enclave"
        ));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["software"]);
    }

    #[test]
    fn exhaustion_follows_policy() {
        let mut one_time = KeyBatchInfo::new(CredentialPolicy::OneTimeUse, 2);
        assert!(!one_time.is_key_exhausted(0));
        one_time.used_counts[0] = 1;
        assert!(one_time.is_key_exhausted(0));
        assert!(!one_time.is_key_exhausted(1));
        assert!(one_time.is_key_exhausted(5));

        let mut rotating = KeyBatchInfo::new(CredentialPolicy::RotateUse, 1);
        rotating.used_counts[0] = 10;
        assert!(!rotating.is_key_exhausted(0));
    }

    #[test]
    fn policy_json() {
        assert_eq!(
            serde_json::to_string(&CredentialPolicy::OneTimeUse).unwrap(),
            r#""oneTimeUse""#
        );
        assert_eq!(
            serde_json::from_str::<CredentialPolicy>(r#""rotateUse""#).unwrap(),
            CredentialPolicy::RotateUse
        );
    }
}
