use std::fmt;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tokio::io::AsyncReadExt;

use crate::core::error::{InstallerError, InstallerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
    Sha512,
    Md5,
}

impl ChecksumAlgorithm {
    /// Hex digest length for this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            ChecksumAlgorithm::Md5 => 32,
            ChecksumAlgorithm::Sha1 => 40,
            ChecksumAlgorithm::Sha256 => 64,
            ChecksumAlgorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
            ChecksumAlgorithm::Md5 => "md5",
        };
        f.write_str(name)
    }
}

/// Expected digest of an artifact. The digest is stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, digest: &str) -> InstallerResult<Self> {
        let digest = digest.trim().to_ascii_lowercase();
        if digest.len() != algorithm.hex_len() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InstallerError::ManifestMalformed(format!(
                "'{digest}' is not a valid {algorithm} digest"
            )));
        }
        Ok(Self { algorithm, digest })
    }

    pub fn hasher(&self) -> ChecksumHasher {
        ChecksumHasher::new(self.algorithm)
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.digest.eq_ignore_ascii_case(actual_hex)
    }

    /// Hash a file on disk in chunks and compare.
    pub async fn verify_file(&self, path: &Path) -> InstallerResult<bool> {
        let actual = self.hasher().digest_file(path).await?;
        Ok(self.matches(&actual))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// Incremental hasher so downloads can be verified while streaming and
/// resumed transfers can fold in the bytes already on disk.
pub enum ChecksumHasher {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Md5(Md5),
}

impl ChecksumHasher {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
            ChecksumAlgorithm::Md5 => Self::Md5(Md5::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Md5(h) => h.update(data),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
            Self::Md5(h) => hex::encode(h.finalize()),
        }
    }

    /// Feed the first `limit` bytes of `path` (or all of it) into the hasher.
    pub async fn update_from_file(&mut self, path: &Path, limit: Option<u64>) -> InstallerResult<u64> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| InstallerError::io(path, e))?;
        let mut buf = vec![0u8; 64 * 1024];
        let mut consumed = 0u64;
        loop {
            let want = match limit {
                Some(l) if consumed >= l => break,
                Some(l) => buf.len().min((l - consumed) as usize),
                None => buf.len(),
            };
            let n = file
                .read(&mut buf[..want])
                .await
                .map_err(|e| InstallerError::io(path, e))?;
            if n == 0 {
                break;
            }
            self.update(&buf[..n]);
            consumed += n as u64;
        }
        Ok(consumed)
    }

    pub async fn digest_file(mut self, path: &Path) -> InstallerResult<String> {
        self.update_from_file(path, None).await?;
        Ok(self.finalize_hex())
    }
}
