pub mod http_signature;

pub use http_signature::{verify, SignatureError, SignedRequest, Verification};
