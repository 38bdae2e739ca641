//! Key usage bookkeeping after a successful presentment.
use super::response::PresentableDocument;
use super::Error;
use crate::secure_area::{CredentialPolicy, SecureAreaRegistry};
use crate::storage::DocumentStorage;

pub struct KeyLifecycleUpdater<'a> {
    storage: &'a dyn DocumentStorage,
    secure_areas: &'a SecureAreaRegistry,
}

impl<'a> KeyLifecycleUpdater<'a> {
    pub fn new(storage: &'a dyn DocumentStorage, secure_areas: &'a SecureAreaRegistry) -> Self {
        Self {
            storage,
            secure_areas,
        }
    }

    /// Record one use of the key of every presented document, in order.
    ///
    /// A one-time key that is now exhausted is retired: the credential at its index is
    /// deleted from storage and the key is deleted from its secure area. Returns the ids of
    /// the documents whose key was retired.
    pub async fn record_presentment<'d>(
        &self,
        presented: impl IntoIterator<Item = &'d PresentableDocument>,
    ) -> Result<Vec<String>, Error> {
        let mut retired = Vec::new();
        for document in presented {
            let secure_area = self.secure_areas.get(&document.key_info.secure_area_name)?;
            let key_batch_info = secure_area
                .update_key_batch_info(&document.id, document.key_index)
                .await
                .map_err(Error::SecureArea)?;

            if key_batch_info.credential_policy == CredentialPolicy::OneTimeUse
                && key_batch_info.is_key_exhausted(document.key_index)
            {
                self.storage
                    .delete_document_credential(&document.id, document.key_index)
                    .await
                    .map_err(Error::Storage)?;
                secure_area
                    .delete_key_batch(&document.id, document.key_index, 1)
                    .await
                    .map_err(Error::SecureArea)?;
                tracing::info!(
                    "retired one-time key {} of document {}",
                    document.key_index,
                    document.id
                );
                retired.push(document.id.clone());
            }
        }
        Ok(retired)
    }
}
