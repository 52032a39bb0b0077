pub mod rate_limit;
pub mod signature;

pub use rate_limit::RateLimiter;
pub use signature::{canonical_string, compute_signature, signing_key, SignatureVerifier};
