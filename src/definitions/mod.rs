pub mod cose_key;
pub mod dcapi;
pub mod device_request;
pub mod device_response;
pub mod device_signed;
pub mod helpers;
pub mod issuer_signed;
pub mod session;

pub use cose_key::RecipientKey;
pub use dcapi::{DcApiRequest, EncryptedResponse, EncryptionInfo};
pub use device_request::{DeviceRequest, DocRequest, ItemsRequest};
pub use device_response::{DeviceResponse, Document};
pub use device_signed::{DeviceAuth, DeviceAuthentication, DeviceSigned};
pub use issuer_signed::{IssuerSigned, IssuerSignedItem};
pub use session::{DcApiHandover, SessionTranscript};
