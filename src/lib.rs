//! Holder side of ISO/IEC 18013-7 Annex C: presenting mdocs through the
//! Digital Credentials API.
//!
//! The platform hands the wallet a JSON request carrying a base64url `DeviceRequest` and the
//! verifier's `EncryptionInfo`. The wallet answers with a signed `DeviceResponse`, bound to
//! the request through the session transcript and sealed with HPKE to the verifier's key.
//!
//! - [definitions] holds the CBOR wire structures.
//! - [presentation] runs the presentment: request matching, response assembly, key
//!   lifecycle updates and encryption.
//! - [storage] and [secure_area] are the interfaces to the wallet's document store and key
//!   backends.
pub mod cbor;
pub mod cose;
pub mod definitions;
pub mod hpke;
pub mod presentation;
pub mod secure_area;
pub mod storage;

pub use presentation::handler::{DcApiHandler, ValidatedRequest};
pub use presentation::Error;
