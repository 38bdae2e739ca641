//! Wire formats of ISO/IEC 18013-7 Annex C, "ISO mDL over the Digital Credentials API".
//!
//! Request (JSON, from the platform):
//!
//! ```text
//! { "deviceRequest": b64url(cbor(DeviceRequest)), "encryptionInfo": b64url(cbor(EncryptionInfo)) }
//! EncryptionInfo = ["dcapi", { "nonce": bstr, "recipientPublicKey": COSE_Key }]
//! ```
//!
//! Response (CBOR, to the platform):
//!
//! ```text
//! ["dcapi", { "enc": bstr, "cipherText": bstr }]
//! ```
use crate::cbor::{self, CborError};
use crate::definitions::cose_key::{self, RecipientKey};
use crate::definitions::device_request::DeviceRequest;
use crate::definitions::session::DCAPI_HANDOVER_IDENTIFIER;
use ciborium::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request is not a JSON object with deviceRequest and encryptionInfo: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{0} is not valid base64url: {1}")]
    InvalidBase64(&'static str, base64::DecodeError),
    #[error("{0} is not valid CBOR: {1}")]
    InvalidCbor(&'static str, CborError),
    #[error("malformed encryptionInfo: {0}")]
    InvalidEncryptionInfo(&'static str),
    #[error("unusable recipientPublicKey: {0}")]
    RecipientKey(#[from] cose_key::Error),
    #[error("malformed encrypted response: {0}")]
    InvalidResponse(&'static str),
    #[error("the request origin is unknown")]
    MissingOrigin,
}

impl Error {
    /// Whether the failure concerns the encryption parameters rather than the encoding of
    /// the request.
    pub fn is_encryption_info(&self) -> bool {
        matches!(self, Error::InvalidEncryptionInfo(_) | Error::RecipientKey(_))
    }
}

/// The raw request handed over by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcApiRequest {
    pub device_request: String,
    /// Kept verbatim: the session transcript hashes the base64url string itself.
    pub encryption_info: String,
}

impl DcApiRequest {
    pub fn new(device_request: &DeviceRequest, encryption_info: &EncryptionInfo) -> Result<Self, Error> {
        let device_request =
            cbor::to_vec(device_request).map_err(|e| Error::InvalidCbor("deviceRequest", e))?;
        Ok(Self {
            device_request: base64url_encode(&device_request),
            encryption_info: encryption_info.to_base64url()?,
        })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn device_request(&self) -> Result<DeviceRequest, Error> {
        let bytes = base64url_decode(&self.device_request)
            .map_err(|e| Error::InvalidBase64("deviceRequest", e))?;
        cbor::from_slice(&bytes).map_err(|e| Error::InvalidCbor("deviceRequest", e))
    }

    pub fn encryption_info(&self) -> Result<EncryptionInfo, Error> {
        let bytes = base64url_decode(&self.encryption_info)
            .map_err(|e| Error::InvalidBase64("encryptionInfo", e))?;
        EncryptionInfo::from_bytes(&bytes)
    }
}

/// `EncryptionInfo = [ "dcapi", EncryptionParameters ]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionInfo {
    pub nonce: Option<Vec<u8>>,
    pub recipient_public_key: Value,
}

impl EncryptionInfo {
    pub fn new(nonce: Vec<u8>, recipient_public_key: &p256::PublicKey) -> Self {
        Self {
            nonce: Some(nonce),
            recipient_public_key: cose_key::to_cose_key(recipient_public_key),
        }
    }

    /// Decode the structure. The first element is not interpreted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let value: Value =
            cbor::from_slice(bytes).map_err(|e| Error::InvalidCbor("encryptionInfo", e))?;
        let Value::Array(mut elements) = value else {
            return Err(Error::InvalidEncryptionInfo("expected an array"));
        };
        if elements.len() != 2 {
            return Err(Error::InvalidEncryptionInfo("expected exactly two elements"));
        }
        let Value::Map(parameters) = elements.remove(1) else {
            return Err(Error::InvalidEncryptionInfo("expected a parameter map"));
        };
        let recipient_public_key = cbor::map_get(&parameters, "recipientPublicKey")
            .cloned()
            .ok_or(Error::InvalidEncryptionInfo("missing recipientPublicKey"))?;
        let nonce = match cbor::map_get(&parameters, "nonce") {
            Some(Value::Bytes(nonce)) => Some(nonce.clone()),
            _ => None,
        };
        Ok(Self {
            nonce,
            recipient_public_key,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut parameters = Vec::new();
        if let Some(nonce) = &self.nonce {
            parameters.push((Value::Text("nonce".into()), Value::Bytes(nonce.clone())));
        }
        parameters.push((
            Value::Text("recipientPublicKey".into()),
            self.recipient_public_key.clone(),
        ));
        let value = Value::Array(vec![
            Value::Text(DCAPI_HANDOVER_IDENTIFIER.into()),
            Value::Map(parameters),
        ]);
        cbor::to_vec(&value).map_err(|e| Error::InvalidCbor("encryptionInfo", e))
    }

    pub fn to_base64url(&self) -> Result<String, Error> {
        Ok(base64url_encode(&self.to_bytes()?))
    }

    pub fn recipient_key(&self) -> Result<RecipientKey, Error> {
        Ok(RecipientKey::try_from(&self.recipient_public_key)?)
    }
}

/// `EncryptedResponse = [ "dcapi", EncryptedResponseData ]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedResponse(String, EncryptedResponseData);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedResponseData {
    /// Encapsulated ephemeral public key.
    #[serde(with = "serde_bytes")]
    pub enc: Vec<u8>,
    /// Ciphertext followed by the AEAD tag.
    #[serde(with = "serde_bytes")]
    pub cipher_text: Vec<u8>,
}

impl EncryptedResponse {
    pub fn new(enc: Vec<u8>, cipher_text: Vec<u8>) -> Self {
        Self(
            DCAPI_HANDOVER_IDENTIFIER.to_string(),
            EncryptedResponseData { enc, cipher_text },
        )
    }

    pub fn data(&self) -> &EncryptedResponseData {
        &self.1
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CborError> {
        cbor::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let response: Self =
            cbor::from_slice(bytes).map_err(|e| Error::InvalidCbor("encryptedResponse", e))?;
        if response.0 != DCAPI_HANDOVER_IDENTIFIER {
            return Err(Error::InvalidResponse("unexpected protocol identifier"));
        }
        Ok(response)
    }
}

/// Decode base64url, with or without padding.
pub fn base64url_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::decode_config(input.trim_end_matches('='), base64::URL_SAFE_NO_PAD)
}

pub fn base64url_encode(input: &[u8]) -> String {
    base64::encode_config(input, base64::URL_SAFE_NO_PAD)
}
