//! A secure area that keeps P-256 keys in process memory.
use super::{CredentialPolicy, KeyBatchInfo, SecureArea};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use signature::Signer;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

pub struct SoftwareSecureArea {
    name: String,
    batches: Mutex<HashMap<String, KeyBatch>>,
}

struct KeyBatch {
    /// `None` once a key has been deleted.
    keys: Vec<Option<SigningKey>>,
    info: KeyBatchInfo,
}

impl SoftwareSecureArea {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batches: Mutex::new(HashMap::new()),
        }
    }

    /// Generate `batch_size` fresh keys for document `id`, replacing any existing batch.
    ///
    /// Returns the public keys in batch order, for the issuer to certify.
    pub fn create_key_batch(
        &self,
        id: &str,
        credential_policy: CredentialPolicy,
        batch_size: usize,
    ) -> Result<Vec<VerifyingKey>> {
        let keys: Vec<SigningKey> = (0..batch_size)
            .map(|_| SigningKey::random(&mut OsRng))
            .collect();
        let public_keys: Vec<VerifyingKey> = keys.iter().map(VerifyingKey::from).collect();
        let batch = KeyBatch {
            keys: keys.into_iter().map(Some).collect(),
            info: KeyBatchInfo::new(credential_policy, batch_size),
        };
        self.batches()?.insert(id.to_string(), batch);
        Ok(public_keys)
    }

    pub fn public_key(&self, id: &str, key_index: usize) -> Result<VerifyingKey> {
        let batches = self.batches()?;
        let key = Self::key(&batches, id, key_index)?;
        Ok(VerifyingKey::from(key))
    }

    /// Current metadata of a batch without recording a use.
    pub fn key_batch_info(&self, id: &str) -> Result<Option<KeyBatchInfo>> {
        Ok(self.batches()?.get(id).map(|batch| batch.info.clone()))
    }

    fn batches(&self) -> Result<MutexGuard<'_, HashMap<String, KeyBatch>>> {
        self.batches
            .lock()
            .map_err(|_| anyhow!("secure area '{}' state is poisoned", self.name))
    }

    fn key<'a>(
        batches: &'a HashMap<String, KeyBatch>,
        id: &str,
        key_index: usize,
    ) -> Result<&'a SigningKey> {
        batches
            .get(id)
            .with_context(|| format!("no key batch for document {id}"))?
            .keys
            .get(key_index)
            .and_then(Option::as_ref)
            .with_context(|| format!("no key at index {key_index} for document {id}"))
    }
}

#[async_trait]
impl SecureArea for SoftwareSecureArea {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sign(&self, id: &str, key_index: usize, data: &[u8]) -> Result<Vec<u8>> {
        let batches = self.batches()?;
        let key = Self::key(&batches, id, key_index)?;
        let signature: Signature = key.try_sign(data)?;
        Ok(signature.to_bytes().to_vec())
    }

    async fn update_key_batch_info(&self, id: &str, key_index: usize) -> Result<KeyBatchInfo> {
        let mut batches = self.batches()?;
        let batch = batches
            .get_mut(id)
            .with_context(|| format!("no key batch for document {id}"))?;
        if batch.keys.get(key_index).and_then(Option::as_ref).is_none() {
            bail!("no key at index {key_index} for document {id}");
        }
        if let Some(count) = batch.info.used_counts.get_mut(key_index) {
            *count += 1;
        }
        Ok(batch.info.clone())
    }

    async fn delete_key_batch(
        &self,
        id: &str,
        start_index: usize,
        batch_size: usize,
    ) -> Result<()> {
        let mut batches = self.batches()?;
        let Some(batch) = batches.get_mut(id) else {
            return Ok(());
        };
        batch
            .keys
            .iter_mut()
            .skip(start_index)
            .take(batch_size)
            .for_each(|key| *key = None);
        if batch.keys.iter().all(Option::is_none) {
            batches.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use signature::Verifier;

    #[tokio::test]
    async fn sign_with_batch_key() {
        let area = SoftwareSecureArea::new("software");
        let public_keys = area
            .create_key_batch("doc", CredentialPolicy::RotateUse, 2)
            .unwrap();

        let raw = area.sign("doc", 1, b"payload").await.unwrap();
        assert_eq!(raw.len(), 64);
        let signature = Signature::from_slice(&raw).unwrap();
        assert!(public_keys[1].verify(b"payload", &signature).is_ok());
        assert!(public_keys[0].verify(b"payload", &signature).is_err());

        assert!(area.sign("doc", 2, b"payload").await.is_err());
        assert!(area.sign("other", 0, b"payload").await.is_err());
    }

    #[tokio::test]
    async fn usage_and_deletion() {
        let area = SoftwareSecureArea::new("software");
        area.create_key_batch("doc", CredentialPolicy::OneTimeUse, 2)
            .unwrap();

        let info = area.update_key_batch_info("doc", 0).await.unwrap();
        assert_eq!(info.used_counts, vec![1, 0]);
        assert!(info.is_key_exhausted(0));

        area.delete_key_batch("doc", 0, 1).await.unwrap();
        assert!(area.sign("doc", 0, b"payload").await.is_err());
        assert!(area.sign("doc", 1, b"payload").await.is_ok());
        assert!(area.update_key_batch_info("doc", 0).await.is_err());

        area.delete_key_batch("doc", 1, 1).await.unwrap();
        assert!(area.key_batch_info("doc").unwrap().is_none());
    }
}
