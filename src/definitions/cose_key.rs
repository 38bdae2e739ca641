//! Decoding of the verifier's `recipientPublicKey`.
//!
//! Only the subset of RFC-8152 [COSE_Key](https://datatracker.ietf.org/doc/html/rfc8152#section-13)
//! that Annex C allows is accepted: an EC2 key on P-256 with both coordinates present.
use crate::cbor;
use ciborium::Value;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{EncodedPoint, FieldBytes, PublicKey};

/// kty
const LABEL_KTY: i64 = 1;
/// crv
const LABEL_CRV: i64 = -1;
/// x-coordinate
const LABEL_X: i64 = -2;
/// y-coordinate
const LABEL_Y: i64 = -3;

/// COSE elliptic curve identifier of P-256.
const CRV_P256: i64 = 1;
const COORDINATE_LEN: usize = 32;

/// Errors that can occur when decoding a recipient COSE_Key.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Expected to parse a CBOR map, received: '{0:?}'")]
    NotAMap(Value),
    #[error("COSE_Key is missing the key type")]
    MissingKeyType,
    #[error("Only P-256 recipient keys are supported")]
    UnsupportedCurve,
    #[error("COSE_Key of kty 'EC2' missing x coordinate")]
    EC2MissingX,
    #[error("COSE_Key of kty 'EC2' missing y coordinate")]
    EC2MissingY,
    #[error("Expected a {COORDINATE_LEN} byte coordinate, received {0} bytes")]
    InvalidCoordinateLength(usize),
    #[error("Coordinates do not describe a point on P-256")]
    InvalidCoseKey,
}

/// The uncompressed P-256 point a response is encrypted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientKey {
    x: [u8; COORDINATE_LEN],
    y: [u8; COORDINATE_LEN],
}

impl RecipientKey {
    /// The coordinate pair `x || y`.
    pub fn to_bytes(&self) -> [u8; 2 * COORDINATE_LEN] {
        let mut bytes = [0u8; 2 * COORDINATE_LEN];
        bytes[..COORDINATE_LEN].copy_from_slice(&self.x);
        bytes[COORDINATE_LEN..].copy_from_slice(&self.y);
        bytes
    }

    pub fn encoded_point(&self) -> EncodedPoint {
        EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&self.x),
            FieldBytes::from_slice(&self.y),
            false,
        )
    }

    pub fn public_key(&self) -> Result<PublicKey, Error> {
        PublicKey::from_sec1_bytes(self.encoded_point().as_bytes())
            .map_err(|_| Error::InvalidCoseKey)
    }
}

impl TryFrom<&Value> for RecipientKey {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self, Error> {
        let Value::Map(map) = value else {
            return Err(Error::NotAMap(value.clone()));
        };
        match cbor::map_get_label(map, LABEL_CRV) {
            Some(Value::Integer(crv)) if i128::from(*crv) == i128::from(CRV_P256) => (),
            _ => return Err(Error::UnsupportedCurve),
        }
        if !matches!(cbor::map_get_label(map, LABEL_KTY), Some(Value::Integer(_))) {
            return Err(Error::MissingKeyType);
        }
        let x = match cbor::map_get_label(map, LABEL_X) {
            Some(Value::Bytes(x)) => coordinate(x)?,
            _ => return Err(Error::EC2MissingX),
        };
        let y = match cbor::map_get_label(map, LABEL_Y) {
            Some(Value::Bytes(y)) => coordinate(y)?,
            _ => return Err(Error::EC2MissingY),
        };
        let key = RecipientKey { x, y };
        key.public_key()?;
        Ok(key)
    }
}

impl From<&PublicKey> for RecipientKey {
    fn from(key: &PublicKey) -> Self {
        let point = key.to_encoded_point(false);
        let mut x = [0u8; COORDINATE_LEN];
        let mut y = [0u8; COORDINATE_LEN];
        // An uncompressed point always carries both coordinates.
        if let (Some(px), Some(py)) = (point.x(), point.y()) {
            x.copy_from_slice(px);
            y.copy_from_slice(py);
        }
        RecipientKey { x, y }
    }
}

/// Build the COSE_Key map for a P-256 public key.
pub fn to_cose_key(key: &PublicKey) -> Value {
    let recipient = RecipientKey::from(key);
    Value::Map(vec![
        // kty: EC2
        (Value::Integer(LABEL_KTY.into()), Value::Integer(2.into())),
        (Value::Integer(LABEL_CRV.into()), Value::Integer(CRV_P256.into())),
        (Value::Integer(LABEL_X.into()), Value::Bytes(recipient.x.to_vec())),
        (Value::Integer(LABEL_Y.into()), Value::Bytes(recipient.y.to_vec())),
    ])
}

fn coordinate(bytes: &[u8]) -> Result<[u8; COORDINATE_LEN], Error> {
    bytes
        .try_into()
        .map_err(|_| Error::InvalidCoordinateLength(bytes.len()))
}
