use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::core::error::{LauncherError, LauncherResult};

const READ_CHUNK: usize = 64 * 1024;

/// Digest algorithms accepted in descriptors. Which one applies is decided by
/// the length of the expected hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn for_hex_digest(expected: &str) -> Option<Self> {
        match expected.trim().len() {
            32 => Some(Self::Md5),
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            128 => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn digest_bytes(self, bytes: &[u8]) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(bytes)),
            Self::Sha1 => hex::encode(Sha1::digest(bytes)),
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }

    fn digest_reader(self, reader: impl Read) -> std::io::Result<String> {
        match self {
            Self::Md5 => stream_digest::<Md5>(reader),
            Self::Sha1 => stream_digest::<Sha1>(reader),
            Self::Sha256 => stream_digest::<Sha256>(reader),
            Self::Sha512 => stream_digest::<Sha512>(reader),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        };
        f.write_str(name)
    }
}

fn stream_digest<D: Digest>(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex digest of a file, computed off the async runtime.
pub async fn digest_file(path: &Path, algorithm: HashAlgorithm) -> LauncherResult<String> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path).map_err(|e| LauncherError::io(&path, e))?;
        algorithm
            .digest_reader(std::io::BufReader::new(file))
            .map_err(|e| LauncherError::io(&path, e))
    })
    .await?
}

/// Digest of `path` using the algorithm implied by `expected`. `None` when the
/// expected string has no recognised length.
pub async fn digest_like(path: &Path, expected: &str) -> LauncherResult<Option<String>> {
    match HashAlgorithm::for_hex_digest(expected) {
        Some(algorithm) => digest_file(path, algorithm).await.map(Some),
        None => Ok(None),
    }
}

/// True when the file's digest equals `expected` (case-insensitive).
pub async fn file_matches(path: &Path, expected: &str) -> LauncherResult<bool> {
    Ok(digest_like(path, expected)
        .await?
        .is_some_and(|actual| actual.eq_ignore_ascii_case(expected.trim())))
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    HashAlgorithm::Sha1.digest_bytes(bytes)
}
