//! Entry points for a presentment requested through the Digital Credentials API.
//!
//! ```ignore
//! let handler = DcApiHandler::new(storage, SecureAreaRegistry::new(vec![software]));
//! let validated = handler.validate_request(&request).await?;
//! // ... ask the holder for consent ...
//! let envelope = handler
//!     .build_and_encrypt_response(&validated, &raw_request, Some(origin), None)
//!     .await?;
//! ```
use super::lifecycle::KeyLifecycleUpdater;
use super::reader_identity::{self, ReaderIdentity};
use super::request::{DocumentRequestSet, MobileDocumentRequest};
use super::response::{
    filter_permitted, PermittedItems, PresentableDocument, ResponseAssembler, SelectedItems,
};
use super::Error;
use crate::cbor;
use crate::definitions::{
    dcapi::{self, DcApiRequest, EncryptedResponse},
    IssuerSigned, SessionTranscript,
};
use crate::hpke;
use crate::secure_area::SecureAreaRegistry;
use crate::storage::{DocumentStatus, DocumentStorage, HeldDocument};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct DcApiHandler {
    storage: Arc<dyn DocumentStorage>,
    secure_areas: SecureAreaRegistry,
}

/// Outcome of [DcApiHandler::validate_request].
#[derive(Clone, Debug)]
pub struct ValidatedRequest {
    /// The set of documents that will be presented.
    pub document_request_set: DocumentRequestSet,
    /// Who is asking, if the reader authenticated with a decodable certificate.
    pub reader: Option<ReaderIdentity>,
    /// The issued documents at the time of validation.
    pub documents: Vec<HeldDocument>,
}

impl DcApiHandler {
    pub fn new(storage: Arc<dyn DocumentStorage>, secure_areas: SecureAreaRegistry) -> Self {
        Self {
            storage,
            secure_areas,
        }
    }

    /// Check that the issued documents satisfy a mandatory part of `request`.
    pub async fn validate_request(
        &self,
        request: &MobileDocumentRequest,
    ) -> Result<ValidatedRequest, Error> {
        let reader = request
            .reader_certificate_chain()
            .and_then(reader_identity::from_certificate_chain);

        let documents = self
            .storage
            .load_documents(DocumentStatus::Issued)
            .await
            .map_err(|e| {
                tracing::error!("unable to load issued documents: {e}");
                Error::DocumentsNotProvided
            })?;
        let held_doc_types: Vec<&str> = documents
            .iter()
            .filter_map(|document| document.doc_type.as_deref())
            .collect();
        let document_request_set = request.match_held(&held_doc_types)?.clone();

        Ok(ValidatedRequest {
            document_request_set,
            reader,
            documents,
        })
    }

    /// Build the signed device response for the raw platform request and encrypt it to the
    /// verifier.
    ///
    /// `permitted` narrows the disclosure to what the holder consented to. Without it every
    /// requested element the documents hold is disclosed. The returned bytes are the
    /// encoded `["dcapi", {"enc", "cipherText"}]` envelope.
    pub async fn build_and_encrypt_response(
        &self,
        validated: &ValidatedRequest,
        raw_request: &[u8],
        origin: Option<&str>,
        permitted: Option<PermittedItems>,
    ) -> Result<Vec<u8>, Error> {
        let origin = origin.ok_or(dcapi::Error::MissingOrigin)?;
        let request = DcApiRequest::from_json(raw_request)?;
        let device_request = request.device_request()?;
        let recipient_key = request.encryption_info()?.recipient_key()?;

        if validated.documents.is_empty() {
            return Err(Error::DocumentsNotProvided);
        }
        let documents = self.presentable_documents(&validated.documents).await?;
        let mut doc_type_to_id: BTreeMap<&str, &str> = BTreeMap::new();
        for document in &documents {
            doc_type_to_id
                .entry(document.doc_type.as_str())
                .or_insert(document.id.as_str());
        }

        let session_transcript = SessionTranscript::dcapi(&request.encryption_info, origin)?;
        let assembler = ResponseAssembler::new(&session_transcript, &self.secure_areas);

        let discovered = assembler
            .assemble(&device_request, &documents, None)
            .await?
            .map(|response| response.valid_request_items)
            .unwrap_or_default();
        let valid_request_items = match permitted {
            Some(permitted) => filter_permitted(&discovered, permitted),
            None => discovered,
        };
        let selection: SelectedItems = valid_request_items
            .into_iter()
            .filter_map(|(doc_type, namespaces)| {
                doc_type_to_id
                    .get(doc_type.as_str())
                    .map(|id| (id.to_string(), namespaces))
            })
            .collect();

        let response = assembler
            .assemble(&device_request, &documents, Some(&selection))
            .await?
            .ok_or(Error::NoDocumentToReturn)?;

        let presented = documents
            .iter()
            .filter(|document| response.presented_ids.contains(&document.id));
        KeyLifecycleUpdater::new(self.storage.as_ref(), &self.secure_areas)
            .record_presentment(presented)
            .await?;

        let plaintext = cbor::to_vec(&response.device_response)?;
        let sealed = hpke::seal(&recipient_key, &plaintext, &session_transcript.to_bytes()?)?;
        tracing::debug!(
            "encrypted device response with {} document(s)",
            response.presented_ids.len()
        );
        Ok(EncryptedResponse::new(sealed.enc, sealed.cipher_text).to_bytes()?)
    }

    /// Documents that can be signed, reloaded with their issuer data and key index.
    async fn presentable_documents(
        &self,
        held: &[HeldDocument],
    ) -> Result<Vec<PresentableDocument>, Error> {
        let mut documents = Vec::new();
        for document in held {
            let Some(key_info) = document.key_info() else {
                tracing::warn!("skipping document {} without usable key info", document.id);
                continue;
            };
            let Some(stored) = self
                .storage
                .load_document(&document.id, DocumentStatus::Issued)
                .await
                .map_err(Error::Storage)?
            else {
                tracing::warn!("document {} is no longer issued", document.id);
                continue;
            };
            let issuer_signed: IssuerSigned =
                cbor::from_slice(&stored.data).map_err(|source| Error::InvalidIssuerSigned {
                    id: document.id.clone(),
                    source,
                })?;
            let Some(doc_type) = document
                .doc_type
                .clone()
                .or_else(|| issuer_signed.mso_doc_type())
            else {
                tracing::warn!("skipping document {} of unknown type", document.id);
                continue;
            };
            documents.push(PresentableDocument {
                id: document.id.clone(),
                doc_type,
                issuer_signed,
                key_info,
                key_index: stored.key_index,
            });
        }
        Ok(documents)
    }
}
