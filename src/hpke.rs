//! Single-shot HPKE ([RFC 9180](https://www.rfc-editor.org/rfc/rfc9180)) in base mode with
//! the cipher suite fixed by ISO/IEC 18013-7 Annex C:
//!
//! - KEM: DHKEM(P-256, HKDF-SHA256), `0x0010`
//! - KDF: HKDF-SHA256, `0x0001`
//! - AEAD: AES-128-GCM, `0x0001`
//!
//! The AEAD associated data is always empty, the session binding travels in `info`.
//! Every call is an independent context with sequence number zero.
use crate::definitions::cose_key::{self, RecipientKey};
use ::hpke::{
    aead::AesGcm128, kdf::HkdfSha256, kem::DhP256HkdfSha256, Deserializable, Kem, OpModeR,
    OpModeS, Serializable,
};
use p256::SecretKey;
use rand::rngs::OsRng;

type Suite = DhP256HkdfSha256;

/// Length of an uncompressed P-256 point.
pub const N_ENC: usize = 65;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("recipient key is not a valid P-256 point: {0}")]
    InvalidRecipientKey(#[from] cose_key::Error),
    #[error("encapsulated key is not a valid P-256 point")]
    InvalidEncapsulatedKey,
    #[error("recipient private key is not a valid P-256 scalar")]
    InvalidPrivateKey,
    #[error("AEAD operation failed")]
    Aead,
}

/// Output of [seal].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Uncompressed ephemeral public key, 65 bytes.
    pub enc: Vec<u8>,
    /// Ciphertext with the 16 byte GCM tag appended.
    pub cipher_text: Vec<u8>,
}

/// Encrypt `plaintext` to `recipient`, binding it to `info`.
pub fn seal(recipient: &RecipientKey, plaintext: &[u8], info: &[u8]) -> Result<Sealed, Error> {
    let pk_r = <Suite as Kem>::PublicKey::from_bytes(recipient.encoded_point().as_bytes())
        .map_err(|_| Error::InvalidRecipientKey(cose_key::Error::InvalidCoseKey))?;

    let (encapped_key, cipher_text) =
        ::hpke::single_shot_seal::<AesGcm128, HkdfSha256, Suite, _>(
            &OpModeS::Base,
            &pk_r,
            info,
            plaintext,
            b"",
            &mut OsRng,
        )
        .map_err(|e| {
            tracing::debug!("HPKE seal failed: {e}");
            Error::Aead
        })?;

    Ok(Sealed {
        enc: encapped_key.to_bytes().to_vec(),
        cipher_text,
    })
}

/// Decrypt a message produced by [seal] with the recipient's private key.
pub fn open(
    recipient: &SecretKey,
    enc: &[u8],
    cipher_text: &[u8],
    info: &[u8],
) -> Result<Vec<u8>, Error> {
    let sk_r = <Suite as Kem>::PrivateKey::from_bytes(recipient.to_bytes().as_slice())
        .map_err(|_| Error::InvalidPrivateKey)?;
    let encapped_key =
        <Suite as Kem>::EncappedKey::from_bytes(enc).map_err(|_| Error::InvalidEncapsulatedKey)?;

    ::hpke::single_shot_open::<AesGcm128, HkdfSha256, Suite>(
        &OpModeR::Base,
        &sk_r,
        &encapped_key,
        info,
        cipher_text,
        b"",
    )
    .map_err(|_| Error::Aead)
}
