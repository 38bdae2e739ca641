use crate::definitions::{
    helpers::{NonEmptyMap, NonEmptyVec},
    DeviceSigned, IssuerSigned,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Represents a device response.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    /// The version of the response.
    pub version: String,

    /// The documents associated with the response, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Documents>,

    /// The errors associated with the documents, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_errors: Option<DocumentErrors>,

    /// The status of the response.
    pub status: Status,
}

pub type Documents = NonEmptyVec<Document>;

/// A document returned to the reader.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub doc_type: String,
    pub issuer_signed: IssuerSigned,
    pub device_signed: DeviceSigned,
    /// Requested elements that were not returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Errors>,
}

/// Errors mapped by namespace and element identifier.
pub type Errors = NonEmptyMap<String, NonEmptyMap<String, DocumentErrorCode>>;
/// A list of document errors.
pub type DocumentErrors = NonEmptyVec<DocumentError>;
/// A map of document type to document error for them.
pub type DocumentError = BTreeMap<String, DocumentErrorCode>;

/// Document specific errors.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(from = "i64", into = "i64")]
pub enum DocumentErrorCode {
    DataNotReturned,
    ApplicationSpecific(i64),
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "u64", into = "u64")]
pub enum Status {
    OK,
    GeneralError,
    CborDecodingError,
    CborValidationError,
}

impl DeviceResponse {
    pub const VERSION: &'static str = "1.0";

    pub fn documents(&self) -> &[Document] {
        self.documents
            .as_ref()
            .map(|documents| documents.as_ref())
            .unwrap_or_default()
    }
}

impl From<i64> for DocumentErrorCode {
    fn from(value: i64) -> Self {
        match value {
            0 => DocumentErrorCode::DataNotReturned,
            _ => DocumentErrorCode::ApplicationSpecific(value),
        }
    }
}

impl From<DocumentErrorCode> for i64 {
    fn from(c: DocumentErrorCode) -> i64 {
        match c {
            DocumentErrorCode::DataNotReturned => 0,
            DocumentErrorCode::ApplicationSpecific(i) => i,
        }
    }
}

impl From<Status> for u64 {
    fn from(s: Status) -> u64 {
        match s {
            Status::OK => 0,
            Status::GeneralError => 10,
            Status::CborDecodingError => 11,
            Status::CborValidationError => 12,
        }
    }
}

impl TryFrom<u64> for Status {
    type Error = String;

    fn try_from(n: u64) -> Result<Status, String> {
        match n {
            0 => Ok(Status::OK),
            10 => Ok(Status::GeneralError),
            11 => Ok(Status::CborDecodingError),
            12 => Ok(Status::CborValidationError),
            _ => Err(format!("unrecognised error code: {n}")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cbor;
    use ciborium::Value;

    #[test]
    fn empty_response_is_a_map() {
        let response = DeviceResponse {
            version: DeviceResponse::VERSION.into(),
            documents: None,
            document_errors: Some(NonEmptyVec::new(
                [("org.example.doc".to_string(), DocumentErrorCode::DataNotReturned)]
                    .into_iter()
                    .collect(),
            )),
            status: Status::OK,
        };
        let value = cbor::into_value(&response).unwrap();
        let Value::Map(entries) = value else {
            panic!("DeviceResponse must be a map")
        };
        assert_eq!(
            cbor::map_get(&entries, "version"),
            Some(&Value::Text("1.0".into()))
        );
        assert!(cbor::map_get(&entries, "documents").is_none());
        assert_eq!(
            cbor::map_get(&entries, "status"),
            Some(&Value::Integer(0.into()))
        );

        let bytes = cbor::to_vec(&response).unwrap();
        let decoded: DeviceResponse = cbor::from_slice(&bytes).unwrap();
        assert!(decoded.documents().is_empty());
        assert_eq!(decoded.status, Status::OK);
    }

    #[test]
    fn status_codes() {
        assert_eq!(u64::from(Status::GeneralError), 10);
        assert_eq!(Status::try_from(12u64), Ok(Status::CborValidationError));
        assert!(Status::try_from(3u64).is_err());
    }
}
