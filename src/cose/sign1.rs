use ciborium::Value;
use coset::{
    iana, sig_structure_data, AsCborValue, CoseSign1Builder, HeaderBuilder, SignatureContext,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Tag number of a tagged `COSE_Sign1` structure.
const COSE_SIGN1_TAG: u64 = 18;

/// A `COSE_Sign1` that can be (de)serialized with serde.
///
/// Accepts both the tagged and untagged form on input, always writes the untagged form.
#[derive(Clone, Debug, PartialEq)]
pub struct CoseSign1(pub coset::CoseSign1);

impl CoseSign1 {
    pub fn new(cose_sign1: coset::CoseSign1) -> Self {
        Self(cose_sign1)
    }

    pub fn into_inner(self) -> coset::CoseSign1 {
        self.0
    }
}

impl AsRef<coset::CoseSign1> for CoseSign1 {
    fn as_ref(&self) -> &coset::CoseSign1 {
        &self.0
    }
}

impl Serialize for CoseSign1 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0
            .clone()
            .to_cbor_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CoseSign1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = match Value::deserialize(deserializer)? {
            Value::Tag(COSE_SIGN1_TAG, inner) => *inner,
            value => value,
        };
        let inner = coset::CoseSign1::from_cbor_value(value).map_err(serde::de::Error::custom)?;
        Ok(CoseSign1(inner))
    }
}

/// A `COSE_Sign1` with a detached payload, waiting for its signature.
///
/// The signer never sees the structure itself, only [PreparedCoseSign1::signature_payload].
#[derive(Clone, Debug)]
pub struct PreparedCoseSign1 {
    cose_sign1: coset::CoseSign1,
    signature_payload: Vec<u8>,
}

impl PreparedCoseSign1 {
    pub fn detached(algorithm: iana::Algorithm, payload: &[u8]) -> Self {
        let protected = HeaderBuilder::new().algorithm(algorithm).build();
        let cose_sign1 = CoseSign1Builder::new().protected(protected).build();
        let signature_payload = sig_structure_data(
            SignatureContext::CoseSign1,
            cose_sign1.protected.clone(),
            None,
            &[],
            payload,
        );
        Self {
            cose_sign1,
            signature_payload,
        }
    }

    /// The `Sig_structure` bytes the signature must be computed over.
    pub fn signature_payload(&self) -> &[u8] {
        &self.signature_payload
    }

    pub fn finalize(self, signature: Vec<u8>) -> CoseSign1 {
        let mut cose_sign1 = self.cose_sign1;
        cose_sign1.signature = signature;
        CoseSign1(cose_sign1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cbor;
    use p256::ecdsa::{signature::Signer, signature::Verifier, Signature, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn detached_signature_verifies() {
        let key = SigningKey::random(&mut OsRng);
        let payload = b"device authentication bytes";

        let prepared = PreparedCoseSign1::detached(iana::Algorithm::ES256, payload);
        let signature: Signature = key.sign(prepared.signature_payload());
        let signed = prepared.finalize(signature.to_bytes().to_vec());

        assert!(signed.0.payload.is_none());
        signed
            .0
            .verify_detached_signature(payload, &[], |sig, data| {
                let sig = Signature::from_slice(sig)?;
                key.verifying_key().verify(data, &sig)
            })
            .expect("signature did not verify");
    }

    #[test]
    fn tagged_input_is_accepted() {
        let sign1 = CoseSign1Builder::new()
            .protected(HeaderBuilder::new().algorithm(iana::Algorithm::ES256).build())
            .payload(vec![1, 2, 3])
            .signature(vec![4, 5, 6])
            .build();
        let untagged = sign1.clone().to_cbor_value().unwrap();
        let tagged = Value::Tag(COSE_SIGN1_TAG, Box::new(untagged));
        let bytes = cbor::to_vec(&tagged).unwrap();

        let decoded: CoseSign1 = cbor::from_slice(&bytes).unwrap();
        assert_eq!(decoded.0.payload, sign1.payload);
        assert_eq!(decoded.0.signature, sign1.signature);
    }
}
