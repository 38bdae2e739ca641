//! Presentment of held documents over the Digital Credentials API.
//!
//! A presentment runs in two steps, both driven by [handler::DcApiHandler]:
//!
//! 1. [handler::DcApiHandler::validate_request] matches the platform's request against the
//!    issued documents and extracts the reader's identity for display.
//! 2. [handler::DcApiHandler::build_and_encrypt_response] assembles the signed device
//!    response, retires one-time keys and returns the HPKE encrypted envelope.
pub mod handler;
pub mod lifecycle;
pub mod reader_identity;
pub mod request;
pub mod response;

use crate::cbor::CborError;
use crate::definitions::{dcapi, helpers::tag24};
use crate::{hpke, secure_area};
use std::num::ParseIntError;

/// Errors that abort a presentment.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No issued document satisfies a mandatory request.
    #[error("no held document satisfies the request")]
    DocumentsNotProvided,
    /// The platform request is not valid JSON, base64url or CBOR.
    #[error("unable to decode the request: {0}")]
    RequestDecodeError(dcapi::Error),
    /// The verifier's encryption parameters are missing or not P-256.
    #[error("session encryption is not initialized: {0}")]
    SessionEncryptionNotInitialized(dcapi::Error),
    /// The final disclosure produced no document.
    #[error("no document to return")]
    NoDocumentToReturn,
    /// Stored issuer data of a document cannot be decoded.
    #[error("issuer data of document {id} cannot be decoded: {source}")]
    InvalidIssuerSigned { id: String, source: CborError },
    #[error(transparent)]
    UnknownSecureArea(#[from] secure_area::Error),
    #[error("storage failure: {0}")]
    Storage(anyhow::Error),
    #[error("secure area failure: {0}")]
    SecureArea(anyhow::Error),
    /// Error encoding value to CBOR.
    #[error("error encoding value to CBOR: {0}")]
    CborEncoding(#[from] CborError),
    /// Error encoding value to CBOR.
    #[error("error encoding value to CBOR: {0}")]
    Tag24CborEncoding(#[from] tag24::Error),
    #[error("unable to encrypt the response: {0}")]
    Hpke(#[from] hpke::Error),
    /// Could not parse age attestation claim.
    #[error("could not parse age attestation claim")]
    ParsingError(#[from] ParseIntError),
    /// `age_over` element identifier is malformed.
    #[error("age_over element identifier is malformed")]
    PrefixError,
}

impl From<dcapi::Error> for Error {
    fn from(e: dcapi::Error) -> Self {
        if e.is_encryption_info() {
            Error::SessionEncryptionNotInitialized(e)
        } else {
            Error::RequestDecodeError(e)
        }
    }
}
