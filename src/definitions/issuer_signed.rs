//! This module contains the definition of the [IssuerSigned] struct and related types.
//!
//! The holder only ever filters issuer-signed items; the MSO inside `issuerAuth` is
//! carried through untouched.
use crate::cbor;
use crate::cose::CoseSign1;
use crate::definitions::helpers::{ByteStr, NonEmptyMap, NonEmptyVec, Tag24};
use ciborium::Value;
use serde::{Deserialize, Serialize};

/// Represents an issuer-signed object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSigned {
    #[serde(skip_serializing_if = "Option::is_none", rename = "nameSpaces")]
    pub namespaces: Option<IssuerNamespaces>,
    pub issuer_auth: CoseSign1,
}

pub type IssuerNamespaces = NonEmptyMap<String, NonEmptyVec<IssuerSignedItemBytes>>;
pub type IssuerSignedItemBytes = Tag24<IssuerSignedItem>;

/// Represents an item signed by the issuer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSignedItem {
    /// The ID of the digest used for signing.
    #[serde(rename = "digestID")]
    pub digest_id: u64,

    /// Random bytes associated with the signed item.
    pub random: ByteStr,

    /// The identifier of the element.
    pub element_identifier: String,

    /// The value of the element.
    pub element_value: Value,
}

impl IssuerSigned {
    /// Find the issuer-signed item for an element, if the issuer signed it.
    pub fn item(&self, namespace: &str, element_identifier: &str) -> Option<&IssuerSignedItemBytes> {
        self.namespaces
            .as_ref()?
            .get(namespace)?
            .iter()
            .find(|item| item.as_ref().element_identifier == element_identifier)
    }

    /// All issuer-signed items of a namespace.
    pub fn items(&self, namespace: &str) -> &[IssuerSignedItemBytes] {
        self.namespaces
            .as_ref()
            .and_then(|namespaces| namespaces.get(namespace))
            .map(|items| items.as_ref())
            .unwrap_or_default()
    }

    /// The `docType` recorded in the mobile security object, if `issuerAuth` carries one.
    pub fn mso_doc_type(&self) -> Option<String> {
        let payload = self.issuer_auth.as_ref().payload.as_deref()?;
        let mso: Tag24<Value> = cbor::from_slice(payload).ok()?;
        let Value::Map(mso) = mso.as_ref() else {
            return None;
        };
        match cbor::map_get(mso, "docType") {
            Some(Value::Text(doc_type)) => Some(doc_type.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use coset::{iana, CoseSign1Builder, HeaderBuilder};

    fn issuer_signed() -> IssuerSigned {
        let item = IssuerSignedItem {
            digest_id: 7,
            random: vec![0xAA; 16].into(),
            element_identifier: "family_name".into(),
            element_value: Value::Text("Doe".into()),
        };
        let issuer_auth = CoseSign1Builder::new()
            .protected(HeaderBuilder::new().algorithm(iana::Algorithm::ES256).build())
            .payload(vec![0xA0])
            .signature(vec![0; 64])
            .build();
        IssuerSigned {
            namespaces: Some(NonEmptyMap::new(
                "org.iso.18013.5.1".into(),
                NonEmptyVec::new(Tag24::new(item).unwrap()),
            )),
            issuer_auth: CoseSign1::new(issuer_auth),
        }
    }

    #[test]
    fn serde_issuer_signed() {
        let signed = issuer_signed();
        let bytes = cbor::to_vec(&signed).unwrap();
        let decoded: IssuerSigned = cbor::from_slice(&bytes).unwrap();
        assert_eq!(cbor::to_vec(&decoded).unwrap(), bytes);
        let (decoded, signed) = (decoded.issuer_auth.as_ref(), signed.issuer_auth.as_ref());
        assert_eq!(decoded.protected.header, signed.protected.header);
        assert_eq!(decoded.payload, signed.payload);
        assert_eq!(decoded.signature, signed.signature);
    }

    #[test]
    fn item_lookup() {
        let signed = issuer_signed();
        let item = signed.item("org.iso.18013.5.1", "family_name").unwrap();
        assert_eq!(item.as_ref().digest_id, 7);
        assert!(signed.item("org.iso.18013.5.1", "given_name").is_none());
        assert!(signed.item("org.iso.18013.5.1.aamva", "family_name").is_none());
        assert_eq!(signed.items("org.iso.18013.5.1").len(), 1);
        assert!(signed.items("unknown").is_empty());
    }

    #[test]
    fn doc_type_from_mso() {
        let mut signed = issuer_signed();
        assert_eq!(signed.mso_doc_type(), None);

        let mso = Value::Map(vec![
            (Value::Text("version".into()), Value::Text("1.0".into())),
            (
                Value::Text("docType".into()),
                Value::Text("org.iso.18013.5.1.mDL".into()),
            ),
        ]);
        signed.issuer_auth.0.payload = Some(cbor::to_vec(&Tag24::new(mso).unwrap()).unwrap());
        assert_eq!(
            signed.mso_doc_type().as_deref(),
            Some("org.iso.18013.5.1.mDL")
        );
    }
}
