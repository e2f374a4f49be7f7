//! Per-participant certificate material: the unique token and the
//! scannable verification code derived from it.

pub mod qr;
pub mod token;

pub use qr::{encode_verification_code, verification_url, EncodedCode};
pub use token::{generate_token, TOKEN_LEN};
