//! Assembly of the signed device response.
//!
//! The same assembly runs twice per presentment. The discovery pass takes every requested
//! element the held documents can provide and reports them as [ValidRequestItems]. The
//! final pass is restricted to a [SelectedItems] selection keyed by document id, and its
//! response is the one returned to the reader.
//!
//! Device authentication is always a detached ES256 `COSE_Sign1` over
//! `#6.24(DeviceAuthentication)`, computed by the secure area holding the document key.
use super::Error;
use crate::cbor;
use crate::cose::PreparedCoseSign1;
use crate::definitions::{
    device_request::{DeviceRequest, ItemsRequest},
    device_response::{DocumentError, DocumentErrorCode, Status},
    device_signed::{DeviceAuthentication, DeviceNamespaces},
    helpers::{NonEmptyMap, NonEmptyVec, Tag24},
    issuer_signed::{IssuerSignedItem, IssuerSignedItemBytes},
    DeviceAuth, DeviceResponse, DeviceSigned, Document, IssuerSigned, SessionTranscript,
};
use crate::secure_area::SecureAreaRegistry;
use crate::storage::DocKeyInfo;
use ciborium::Value;
use coset::iana;
use std::collections::BTreeMap;

type DocType = String;
type DocumentId = String;
type Namespace = String;
type ElementIdentifier = String;

/// Items, grouped by document type and namespace, that the held documents can disclose.
pub type ValidRequestItems = BTreeMap<DocType, BTreeMap<Namespace, Vec<ElementIdentifier>>>;
/// Items to disclose, grouped by document id and namespace.
pub type SelectedItems = BTreeMap<DocumentId, BTreeMap<Namespace, Vec<ElementIdentifier>>>;
/// The list of items the holder consented to share, grouped by document type and namespace.
pub type PermittedItems = BTreeMap<DocType, BTreeMap<Namespace, Vec<ElementIdentifier>>>;

/// A held document ready to be presented.
#[derive(Clone, Debug)]
pub struct PresentableDocument {
    pub id: DocumentId,
    pub doc_type: DocType,
    pub issuer_signed: IssuerSigned,
    pub key_info: DocKeyInfo,
    pub key_index: usize,
}

/// The outcome of one assembly pass.
#[derive(Clone, Debug)]
pub struct AssembledResponse {
    pub device_response: DeviceResponse,
    pub valid_request_items: ValidRequestItems,
    /// Ids of the documents included in the response, in response order.
    pub presented_ids: Vec<DocumentId>,
}

pub struct ResponseAssembler<'a> {
    session_transcript: &'a SessionTranscript,
    secure_areas: &'a SecureAreaRegistry,
}

/// Issuer-signed items and errors of one document, before device signing.
struct DisclosedItems {
    namespaces: BTreeMap<Namespace, NonEmptyVec<IssuerSignedItemBytes>>,
    returned: BTreeMap<Namespace, Vec<ElementIdentifier>>,
    errors: BTreeMap<Namespace, NonEmptyMap<ElementIdentifier, DocumentErrorCode>>,
}

impl<'a> ResponseAssembler<'a> {
    pub fn new(
        session_transcript: &'a SessionTranscript,
        secure_areas: &'a SecureAreaRegistry,
    ) -> Self {
        Self {
            session_transcript,
            secure_areas,
        }
    }

    /// Build and sign a device response for `request` from `documents`.
    ///
    /// Without a selection every document of a requested type takes part and every
    /// requested element it holds is disclosed. With a selection only the selected documents
    /// and elements do. Returns `None` when no document could be included.
    pub async fn assemble(
        &self,
        request: &DeviceRequest,
        documents: &[PresentableDocument],
        selection: Option<&SelectedItems>,
    ) -> Result<Option<AssembledResponse>, Error> {
        let mut returned_documents: Vec<Document> = Vec::new();
        let mut document_errors: Vec<DocumentError> = Vec::new();
        let mut valid_request_items = ValidRequestItems::new();
        let mut presented_ids = Vec::new();

        for items_request in request.items_requests() {
            let candidates = documents.iter().filter(|document| {
                document.doc_type == items_request.doc_type
                    && selection.map_or(true, |selection| selection.contains_key(&document.id))
            });

            let mut included = false;
            for document in candidates {
                let selected = selection.and_then(|selection| selection.get(&document.id));
                let disclosed = disclose(document, &items_request, selected);
                if selection.is_some() && disclosed.returned.is_empty() {
                    continue;
                }

                let device_signed = self.sign(document).await?;
                tracing::debug!(
                    "signed document {} of type {}",
                    document.id,
                    document.doc_type
                );
                if !disclosed.returned.is_empty() {
                    valid_request_items
                        .entry(document.doc_type.clone())
                        .or_insert_with(|| disclosed.returned.clone());
                }
                returned_documents.push(Document {
                    doc_type: document.doc_type.clone(),
                    issuer_signed: IssuerSigned {
                        namespaces: disclosed.namespaces.try_into().ok(),
                        issuer_auth: document.issuer_signed.issuer_auth.clone(),
                    },
                    device_signed,
                    errors: disclosed.errors.try_into().ok(),
                });
                presented_ids.push(document.id.clone());
                included = true;
            }

            if !included {
                tracing::debug!(
                    "no document of type {} to return",
                    items_request.doc_type
                );
                let error: DocumentError =
                    [(items_request.doc_type.clone(), DocumentErrorCode::DataNotReturned)]
                        .into_iter()
                        .collect();
                document_errors.push(error);
            }
        }

        let Some(documents) = NonEmptyVec::maybe_new(returned_documents) else {
            return Ok(None);
        };
        Ok(Some(AssembledResponse {
            device_response: DeviceResponse {
                version: DeviceResponse::VERSION.to_string(),
                documents: Some(documents),
                document_errors: document_errors.try_into().ok(),
                status: Status::OK,
            },
            valid_request_items,
            presented_ids,
        }))
    }

    async fn sign(&self, document: &PresentableDocument) -> Result<DeviceSigned, Error> {
        let device_namespaces = Tag24::new(DeviceNamespaces::new())?;
        let device_auth = DeviceAuthentication::new(
            self.session_transcript.clone(),
            document.doc_type.clone(),
            device_namespaces.clone(),
        );
        let device_auth_bytes = cbor::to_vec(&Tag24::new(device_auth)?)?;
        let prepared = PreparedCoseSign1::detached(iana::Algorithm::ES256, &device_auth_bytes);

        let secure_area = self.secure_areas.get(&document.key_info.secure_area_name)?;
        let signature = secure_area
            .sign(&document.id, document.key_index, prepared.signature_payload())
            .await
            .map_err(Error::SecureArea)?;

        Ok(DeviceSigned {
            namespaces: device_namespaces,
            device_auth: DeviceAuth::DeviceSignature(prepared.finalize(signature)),
        })
    }
}

/// Collect the issuer-signed items of `document` answering `request`.
///
/// With a selection, elements outside it are left out silently. Elements that are wanted but
/// not held are reported as [DocumentErrorCode::DataNotReturned].
fn disclose(
    document: &PresentableDocument,
    request: &ItemsRequest,
    selected: Option<&BTreeMap<Namespace, Vec<ElementIdentifier>>>,
) -> DisclosedItems {
    let mut disclosed = DisclosedItems {
        namespaces: BTreeMap::new(),
        returned: BTreeMap::new(),
        errors: BTreeMap::new(),
    };

    for (namespace, elements) in request.namespaces.iter() {
        for element_identifier in elements.keys() {
            if let Some(selected) = selected {
                let is_selected = selected
                    .get(namespace)
                    .is_some_and(|elements| elements.contains(element_identifier));
                if !is_selected {
                    continue;
                }
            }

            match find_item(&document.issuer_signed, namespace, element_identifier) {
                Some(item) => {
                    if let Some(returned_items) = disclosed.namespaces.get_mut(namespace) {
                        returned_items.push(item.clone());
                    } else {
                        disclosed
                            .namespaces
                            .insert(namespace.clone(), NonEmptyVec::new(item.clone()));
                    }
                    disclosed
                        .returned
                        .entry(namespace.clone())
                        .or_default()
                        .push(element_identifier.clone());
                }
                None => {
                    if let Some(returned_errors) = disclosed.errors.get_mut(namespace) {
                        returned_errors
                            .insert(element_identifier.clone(), DocumentErrorCode::DataNotReturned);
                    } else {
                        let returned_errors = NonEmptyMap::new(
                            element_identifier.clone(),
                            DocumentErrorCode::DataNotReturned,
                        );
                        disclosed.errors.insert(namespace.clone(), returned_errors);
                    }
                }
            }
        }
    }
    disclosed
}

/// The item answering a request for `element_identifier`.
///
/// `age_over_NN` requests the issuer did not sign literally are answered with the nearest
/// age attestation.
fn find_item<'a>(
    issuer_signed: &'a IssuerSigned,
    namespace: &str,
    element_identifier: &str,
) -> Option<&'a IssuerSignedItemBytes> {
    if let Some(item) = issuer_signed.item(namespace, element_identifier) {
        return Some(item);
    }
    if !element_identifier.starts_with("age_over_") {
        return None;
    }
    match nearest_age_attestation(element_identifier, issuer_signed.items(namespace)) {
        Ok(item) => item,
        Err(e) => {
            tracing::debug!("ignoring age attestation request {element_identifier}: {e}");
            None
        }
    }
}

/// Filter permitted items to only permit the items that are available.
pub fn filter_permitted(available: &ValidRequestItems, permitted: PermittedItems) -> PermittedItems {
    permitted
        .into_iter()
        .filter_map(|(doc_type, namespaces)| {
            available
                .get(&doc_type)
                .map(|available_namespaces| {
                    namespaces
                        .into_iter()
                        .filter_map(|(ns, elems)| {
                            available_namespaces
                                .get(&ns)
                                .map(|available_elems| {
                                    elems
                                        .into_iter()
                                        .filter(|elem| available_elems.contains(elem))
                                        .collect::<Vec<_>>()
                                })
                                .filter(|elems| !elems.is_empty())
                                .map(|e| (ns, e))
                        })
                        .collect::<BTreeMap<_, _>>()
                })
                .filter(|namespaces| !namespaces.is_empty())
                .map(|ns| (doc_type, ns))
        })
        .collect()
}

/// Find the attestation closest to the requested `age_over_NN`.
///
/// The smallest `age_over_MM` attested true with `MM >= NN` is preferred, then the largest
/// attested false with `MM <= NN`.
pub fn nearest_age_attestation<'a>(
    element_identifier: &str,
    issuer_items: &'a [IssuerSignedItemBytes],
) -> Result<Option<&'a IssuerSignedItemBytes>, Error> {
    let requested_age: u8 = parse_age_from_element_identifier(element_identifier)?;

    let age_over_claims_numerical: Vec<(u8, &IssuerSignedItemBytes)> = issuer_items
        .iter()
        .filter(|item| item.as_ref().element_identifier.starts_with("age_over_"))
        .map(|item| {
            Ok((
                parse_age_from_element_identifier(&item.as_ref().element_identifier)?,
                item,
            ))
        })
        .collect::<Result<_, Error>>()?;

    let (true_age_over_claims, false_age_over_claims): (Vec<_>, Vec<_>) =
        age_over_claims_numerical
            .into_iter()
            .partition(|(_, item)| item.as_ref().element_value == Value::Bool(true));

    let nearest_age_over = true_age_over_claims
        .iter()
        .filter(|(age, _)| *age >= requested_age)
        .min_by_key(|(age, _)| *age);
    if let Some((_, item)) = nearest_age_over {
        return Ok(Some(*item));
    }

    // if there is no appropriate true age attestation, find the closest false age attestation
    let nearest_age_under = false_age_over_claims
        .iter()
        .filter(|(age, _)| *age <= requested_age)
        .max_by_key(|(age, _)| *age);
    Ok(nearest_age_under.map(|(_, item)| *item))
}

/// Will parse the corresponding age as a number from the `age_over_*` element identifier.
pub fn parse_age_from_element_identifier(element_identifier: &str) -> Result<u8, Error> {
    Ok(AgeOver::try_from(element_identifier)?.0)
}

/// Holds the age part from the `age_over_*` element identifier.
pub struct AgeOver(u8);

impl TryFrom<&str> for AgeOver {
    type Error = Error;

    fn try_from(element_identifier: &str) -> Result<Self, Self::Error> {
        if let Some(x) = element_identifier.strip_prefix("age_over_") {
            Ok(AgeOver(str::parse::<u8>(x)?))
        } else {
            Err(Error::PrefixError)
        }
    }
}

/// Extract the issuer-signed item of a response document, for readers and tests.
pub fn returned_item<'a>(
    document: &'a Document,
    namespace: &str,
    element_identifier: &str,
) -> Option<&'a IssuerSignedItem> {
    document
        .issuer_signed
        .item(namespace, element_identifier)
        .map(|item| item.as_ref())
}
