mod cache;
pub mod fingerprint;
pub mod hashing;

pub use cache::HttpCache;
pub use fingerprint::{fingerprint_bytes, fingerprint_file};
pub use hashing::{digest_file, digest_like, file_matches, sha1_hex, HashAlgorithm};
