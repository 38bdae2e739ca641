//! What the platform asks for, independent of how the platform represents it.
//!
//! Hosts convert their native request objects into a [MobileDocumentRequest]; requests that
//! arrive as an ISO 18013-5 `DeviceRequest` can use
//! [MobileDocumentRequest::from_device_request].
use super::Error;
use crate::definitions::device_request::{DeviceRequest, DocRequest};
use ciborium::Value;
use coset::{Header, Label};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// COSE header parameter carrying an X.509 certificate chain.
const X5CHAIN_LABEL: i64 = 33;

/// Elements requested from one document type, grouped by namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    pub document_type: String,
    /// namespace -> element identifier -> intent to retain
    pub namespaces: BTreeMap<String, BTreeMap<String, bool>>,
}

/// Documents that must be presented together.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequestSet {
    pub requests: Vec<DocumentRequest>,
}

/// Alternative ways of satisfying one presentment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentmentRequest {
    pub is_mandatory: bool,
    pub document_request_sets: Vec<DocumentRequestSet>,
}

/// Reader authentication attached to a request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAuthentication {
    /// DER encoded certificates, leaf first.
    pub certificate_chain: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileDocumentRequest {
    pub presentment_requests: Vec<PresentmentRequest>,
    pub request_authentications: Vec<RequestAuthentication>,
}

impl DocumentRequestSet {
    /// Every requested document type is among `held_doc_types`.
    pub fn is_satisfied_by(&self, held_doc_types: &[&str]) -> bool {
        self.requests
            .iter()
            .all(|request| held_doc_types.contains(&request.document_type.as_str()))
    }
}

impl PresentmentRequest {
    /// The first set, in request order, that the held documents satisfy.
    pub fn first_satisfied_set(&self, held_doc_types: &[&str]) -> Option<&DocumentRequestSet> {
        self.document_request_sets
            .iter()
            .find(|set| set.is_satisfied_by(held_doc_types))
    }
}

impl MobileDocumentRequest {
    /// One mandatory presentment with a single set per `DocRequest`. The certificate chain of
    /// each `readerAuth` is kept for reader identification.
    pub fn from_device_request(device_request: &DeviceRequest) -> Self {
        let presentment_requests = device_request
            .doc_requests
            .iter()
            .map(|doc_request| {
                let items_request = doc_request.items_request.as_ref();
                let namespaces = items_request
                    .namespaces
                    .iter()
                    .map(|(namespace, elements)| (namespace.clone(), elements.as_ref().clone()))
                    .collect();
                PresentmentRequest {
                    is_mandatory: true,
                    document_request_sets: vec![DocumentRequestSet {
                        requests: vec![DocumentRequest {
                            document_type: items_request.doc_type.clone(),
                            namespaces,
                        }],
                    }],
                }
            })
            .collect();
        let request_authentications = device_request
            .doc_requests
            .iter()
            .filter_map(reader_auth_chain)
            .map(|certificate_chain| RequestAuthentication { certificate_chain })
            .collect();
        Self {
            presentment_requests,
            request_authentications,
        }
    }

    /// Select the set to present.
    ///
    /// The first mandatory presentment with a satisfiable set wins, and within it the first
    /// satisfiable set. The selected set must request at least one document.
    pub fn match_held(&self, held_doc_types: &[&str]) -> Result<&DocumentRequestSet, Error> {
        let set = self
            .presentment_requests
            .iter()
            .filter(|presentment| presentment.is_mandatory)
            .find_map(|presentment| presentment.first_satisfied_set(held_doc_types))
            .ok_or(Error::DocumentsNotProvided)?;
        if set.requests.is_empty() {
            return Err(Error::DocumentsNotProvided);
        }
        Ok(set)
    }

    /// Certificate chain of the first reader authentication, if any.
    pub fn reader_certificate_chain(&self) -> Option<&[Vec<u8>]> {
        self.request_authentications
            .first()
            .map(|auth| auth.certificate_chain.as_slice())
            .filter(|chain| !chain.is_empty())
    }
}

fn reader_auth_chain(doc_request: &DocRequest) -> Option<Vec<Vec<u8>>> {
    let reader_auth = doc_request.reader_auth.as_ref()?.as_ref();
    x5chain(&reader_auth.unprotected).or_else(|| x5chain(&reader_auth.protected.header))
}

fn x5chain(header: &Header) -> Option<Vec<Vec<u8>>> {
    let (_, value) = header
        .rest
        .iter()
        .find(|(label, _)| *label == Label::Int(X5CHAIN_LABEL))?;
    match value {
        Value::Bytes(certificate) => Some(vec![certificate.clone()]),
        Value::Array(certificates) => certificates
            .iter()
            .map(|certificate| match certificate {
                Value::Bytes(certificate) => Some(certificate.clone()),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}
