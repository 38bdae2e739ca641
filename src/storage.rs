//! The holder's document store, as seen by a presentment.
//!
//! Persistence itself lives outside this crate: hosts implement [DocumentStorage] over
//! whatever database they keep credentials in.
use crate::secure_area::CredentialPolicy;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Lifecycle state of a stored document. Only [DocumentStatus::Issued] documents can be
/// presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentStatus {
    Issued,
    Pending,
    Deferred,
}

/// A document as loaded from storage.
#[derive(Clone, Debug, PartialEq)]
pub struct HeldDocument {
    /// Opaque, stable identifier.
    pub id: String,
    pub doc_type: Option<String>,
    /// CBOR encoded `IssuerSigned`.
    pub data: Vec<u8>,
    pub metadata: Option<JsonValue>,
    /// JSON encoded [DocKeyInfo]. Documents without a decodable value cannot be signed.
    pub doc_key_info: Option<Vec<u8>>,
    /// Position of the credential key within its batch.
    pub key_index: usize,
}

/// Where the device key of a document lives and how often it may be used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocKeyInfo {
    pub secure_area_name: String,
    pub batch_size: usize,
    pub credential_policy: CredentialPolicy,
}

impl DocKeyInfo {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl HeldDocument {
    /// The decoded key info, or `None` if it is missing or malformed.
    pub fn key_info(&self) -> Option<DocKeyInfo> {
        let bytes = self.doc_key_info.as_deref()?;
        match DocKeyInfo::from_json(bytes) {
            Ok(key_info) => Some(key_info),
            Err(e) => {
                tracing::warn!("document {} has malformed key info: {e}", self.id);
                None
            }
        }
    }
}

#[async_trait]
pub trait DocumentStorage: Send + Sync {
    async fn load_documents(&self, status: DocumentStatus) -> Result<Vec<HeldDocument>>;

    async fn load_document(&self, id: &str, status: DocumentStatus) -> Result<Option<HeldDocument>>;

    /// Remove the credential at `index` of a document's batch.
    async fn delete_document_credential(&self, id: &str, index: usize) -> Result<()>;
}
