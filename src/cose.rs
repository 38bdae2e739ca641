//! COSE glue on top of [coset].
pub mod sign1;

pub use sign1::{CoseSign1, PreparedCoseSign1};
