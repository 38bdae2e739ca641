//! Session transcript for presentments over the Digital Credentials API
//! (ISO/IEC 18013-7 Annex C).
//!
//! The transcript binds a device response to one request: it is signed inside every
//! `DeviceAuthentication` and used as the HPKE `info` when the response is sealed.
use crate::cbor::{self, CborError};
use crate::definitions::helpers::ByteStr;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DCAPI_HANDOVER_IDENTIFIER: &str = "dcapi";

/// `SessionTranscript = [DeviceEngagementBytes, EReaderKeyBytes, Handover]`.
///
/// Both engagement fields are `null` for the Digital Credentials API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTranscript(Option<ByteStr>, Option<ByteStr>, pub DcApiHandover);

/// `Handover = ["dcapi", dcapiInfoHash]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcApiHandover(String, ByteStr);

impl DcApiHandover {
    /// Compute the handover from the raw base64url `encryptionInfo` string and the
    /// request origin.
    ///
    /// `dcapiInfoHash = SHA-256(cbor([encryptionInfo, serializedOrigin]))`, where the
    /// origin has leading and trailing `/` removed.
    pub fn new(encryption_info: &str, origin: &str) -> Result<Self, CborError> {
        let serialized_origin = origin.trim_matches('/');
        let dcapi_info = cbor::to_vec(&(encryption_info, serialized_origin))?;
        let dcapi_info_hash = Sha256::digest(&dcapi_info);
        Ok(Self(
            DCAPI_HANDOVER_IDENTIFIER.to_string(),
            dcapi_info_hash.to_vec().into(),
        ))
    }

    pub fn info_hash(&self) -> &[u8] {
        self.1.as_ref()
    }
}

impl SessionTranscript {
    pub fn dcapi(encryption_info: &str, origin: &str) -> Result<Self, CborError> {
        Ok(Self(None, None, DcApiHandover::new(encryption_info, origin)?))
    }

    pub fn handover(&self) -> &DcApiHandover {
        &self.2
    }

    /// The encoded transcript, as used for the HPKE `info` parameter.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CborError> {
        cbor::to_vec(self)
    }
}
