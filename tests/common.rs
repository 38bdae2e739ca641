use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ciborium::Value;
use coset::{iana, CoseSign1Builder, HeaderBuilder};
use p256::ecdsa::{Signature, SigningKey};
use p256::SecretKey;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use signature::Signer;

use isomdl_dcapi::cbor;
use isomdl_dcapi::cose::CoseSign1;
use isomdl_dcapi::definitions::device_request::{DocRequest, ItemsRequest};
use isomdl_dcapi::definitions::helpers::{ByteStr, NonEmptyMap, NonEmptyVec, Tag24};
use isomdl_dcapi::definitions::{
    DcApiRequest, DeviceRequest, DeviceResponse, EncryptedResponse, EncryptionInfo, IssuerSigned,
    IssuerSignedItem, SessionTranscript,
};
use isomdl_dcapi::hpke;
use isomdl_dcapi::secure_area::{
    CredentialPolicy, SecureArea, SecureAreaRegistry, SoftwareSecureArea,
};
use isomdl_dcapi::storage::{DocKeyInfo, DocumentStatus, DocumentStorage, HeldDocument};
use isomdl_dcapi::DcApiHandler;

#[allow(dead_code)]
pub const MDL_DOC_TYPE: &str = "org.iso.18013.5.1.mDL";
#[allow(dead_code)]
pub const MDL_NAMESPACE: &str = "org.iso.18013.5.1";
#[allow(dead_code)]
pub const PID_DOC_TYPE: &str = "eu.europa.ec.eudi.pid.1";
#[allow(dead_code)]
pub const PID_NAMESPACE: &str = "eu.europa.ec.eudi.pid.1";
#[allow(dead_code)]
pub const ORIGIN: &str = "https://verifier.example.com";
#[allow(dead_code)]
pub const SOFTWARE: &str = "software";

#[allow(dead_code)]
fn main() {}

/// Document store backed by a vector, recording every credential deletion.
#[derive(Default)]
pub struct InMemoryStorage {
    documents: Mutex<Vec<(HeldDocument, DocumentStatus)>>,
    deleted_credentials: Mutex<Vec<(String, usize)>>,
    unavailable: bool,
}

#[allow(dead_code)]
impl InMemoryStorage {
    pub fn new(documents: Vec<HeldDocument>) -> Self {
        Self {
            documents: Mutex::new(
                documents
                    .into_iter()
                    .map(|document| (document, DocumentStatus::Issued))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// A store whose every read fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn insert(&self, document: HeldDocument, status: DocumentStatus) {
        self.documents.lock().unwrap().push((document, status));
    }

    pub fn deleted_credentials(&self) -> Vec<(String, usize)> {
        self.deleted_credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStorage for InMemoryStorage {
    async fn load_documents(&self, status: DocumentStatus) -> Result<Vec<HeldDocument>> {
        if self.unavailable {
            bail!("storage is unavailable");
        }
        let documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("storage lock poisoned"))?;
        Ok(documents
            .iter()
            .filter(|(_, s)| *s == status)
            .map(|(document, _)| document.clone())
            .collect())
    }

    async fn load_document(&self, id: &str, status: DocumentStatus) -> Result<Option<HeldDocument>> {
        if self.unavailable {
            bail!("storage is unavailable");
        }
        let documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("storage lock poisoned"))?;
        Ok(documents
            .iter()
            .find(|(document, s)| document.id == id && *s == status)
            .map(|(document, _)| document.clone()))
    }

    async fn delete_document_credential(&self, id: &str, index: usize) -> Result<()> {
        self.deleted_credentials
            .lock()
            .map_err(|_| anyhow!("storage lock poisoned"))?
            .push((id.to_string(), index));
        Ok(())
    }
}

/// Issuer-signed data for `elements`, with a mobile security object signed by a fresh
/// issuer key.
pub fn issuer_signed(doc_type: &str, namespace: &str, elements: &[(&str, Value)]) -> Result<Vec<u8>> {
    let items = elements
        .iter()
        .enumerate()
        .map(|(digest_id, (element_identifier, element_value))| {
            Tag24::new(IssuerSignedItem {
                digest_id: digest_id as u64,
                random: ByteStr::from(rand::random::<[u8; 16]>().to_vec()),
                element_identifier: element_identifier.to_string(),
                element_value: element_value.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let digests = items
        .iter()
        .map(|item| {
            let bytes = cbor::to_vec(item)?;
            Ok((
                Value::Integer(item.as_ref().digest_id.into()),
                Value::Bytes(Sha256::digest(bytes).to_vec()),
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    let mso = Value::Map(vec![
        (Value::Text("version".into()), Value::Text("1.0".into())),
        (Value::Text("digestAlgorithm".into()), Value::Text("SHA-256".into())),
        (
            Value::Text("valueDigests".into()),
            Value::Map(vec![(Value::Text(namespace.into()), Value::Map(digests))]),
        ),
        (Value::Text("docType".into()), Value::Text(doc_type.into())),
    ]);
    let payload = cbor::to_vec(&Tag24::new(mso)?)?;

    let issuer_key = SigningKey::random(&mut OsRng);
    let issuer_auth = CoseSign1Builder::new()
        .protected(HeaderBuilder::new().algorithm(iana::Algorithm::ES256).build())
        .payload(payload)
        .create_signature(&[], |data| {
            let signature: Signature = issuer_key.sign(data);
            signature.to_bytes().to_vec()
        })
        .build();

    let issuer_signed = IssuerSigned {
        namespaces: NonEmptyVec::maybe_new(items).map(|items| NonEmptyMap::new(namespace.into(), items)),
        issuer_auth: CoseSign1::new(issuer_auth),
    };
    Ok(cbor::to_vec(&issuer_signed)?)
}

/// A held document whose key batch is created in `secure_area`.
pub fn held_document(
    id: &str,
    doc_type: &str,
    namespace: &str,
    elements: &[(&str, Value)],
    credential_policy: CredentialPolicy,
    secure_area: &SoftwareSecureArea,
) -> Result<HeldDocument> {
    secure_area.create_key_batch(id, credential_policy, 1)?;
    let doc_key_info = DocKeyInfo {
        secure_area_name: secure_area.name().to_string(),
        batch_size: 1,
        credential_policy,
    };
    Ok(HeldDocument {
        id: id.to_string(),
        doc_type: Some(doc_type.to_string()),
        data: issuer_signed(doc_type, namespace, elements)?,
        metadata: None,
        doc_key_info: Some(doc_key_info.to_json()?),
        key_index: 0,
    })
}

#[allow(dead_code)]
pub fn mdl_elements() -> Vec<(&'static str, Value)> {
    vec![
        ("family_name", Value::Text("Doe".into())),
        ("given_name", Value::Text("Jane".into())),
        ("document_number", Value::Text("DL-123456".into())),
        ("age_over_18", Value::Bool(true)),
        ("age_over_65", Value::Bool(false)),
    ]
}

#[allow(dead_code)]
pub fn pid_elements() -> Vec<(&'static str, Value)> {
    vec![
        ("family_name", Value::Text("Doe".into())),
        ("birth_date", Value::Text("1990-01-01".into())),
    ]
}

/// A device request for `elements` of each `(doc_type, namespace)`.
pub fn device_request(requests: &[(&str, &str, &[&str])]) -> Result<DeviceRequest> {
    let doc_requests = requests
        .iter()
        .map(|(doc_type, namespace, elements)| {
            let requested: BTreeMap<String, bool> = elements
                .iter()
                .map(|element| (element.to_string(), false))
                .collect();
            let items_request = ItemsRequest {
                doc_type: doc_type.to_string(),
                namespaces: NonEmptyMap::new(
                    namespace.to_string(),
                    requested.try_into().context("no element requested")?,
                ),
                request_info: None,
            };
            Ok(DocRequest {
                items_request: Tag24::new(items_request)?,
                reader_auth: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DeviceRequest {
        version: DeviceRequest::VERSION.to_string(),
        doc_requests: doc_requests.try_into().context("no document requested")?,
    })
}

/// The verifier's side of a request: its JSON and the key responses are sealed to.
pub struct Verifier {
    pub key: SecretKey,
    pub request: DcApiRequest,
}

#[allow(dead_code)]
impl Verifier {
    pub fn new(device_request: &DeviceRequest) -> Result<Self> {
        let key = SecretKey::random(&mut OsRng);
        let encryption_info = EncryptionInfo::new(rand::random::<[u8; 16]>().to_vec(), &key.public_key());
        let request = DcApiRequest::new(device_request, &encryption_info)?;
        Ok(Self { key, request })
    }

    pub fn json(&self) -> Result<Vec<u8>> {
        Ok(self.request.to_json()?)
    }

    pub fn session_transcript(&self, origin: &str) -> Result<SessionTranscript> {
        Ok(SessionTranscript::dcapi(&self.request.encryption_info, origin)?)
    }

    /// Decrypt an envelope as the verifier at `origin` would.
    pub fn open(&self, envelope: &[u8], origin: &str) -> Result<DeviceResponse> {
        let envelope = EncryptedResponse::from_bytes(envelope)?;
        let info = self.session_transcript(origin)?.to_bytes()?;
        let plaintext = hpke::open(
            &self.key,
            &envelope.data().enc,
            &envelope.data().cipher_text,
            &info,
        )?;
        Ok(cbor::from_slice(&plaintext)?)
    }
}

#[allow(dead_code)]
pub fn handler(storage: Arc<InMemoryStorage>, secure_area: Arc<SoftwareSecureArea>) -> DcApiHandler {
    DcApiHandler::new(
        storage,
        SecureAreaRegistry::new(vec![secure_area as Arc<dyn SecureArea>]),
    )
}
