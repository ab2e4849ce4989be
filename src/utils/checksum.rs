//! File digests and checksum verification.
//!
//! Files are streamed through the hasher in fixed size chunks so that large setups
//! and installed binaries never have to be held in memory.

use crate::constants::HASH_CHUNK_SIZE;
use crate::core::UpdaterError;
use crate::models::{ChecksumAlgorithm, ChecksumParameters};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Incremental hasher over the supported algorithms.
enum Hasher {
    Md5(md5::Context),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(chunk),
            Self::Sha1(hasher) => hasher.update(chunk),
            Self::Sha256(hasher) => hasher.update(chunk),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(ctx) => format!("{:x}", ctx.compute()),
            Self::Sha1(hasher) => hex::encode(hasher.finalize()),
            Self::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Computes and verifies file digests.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the lowercase hex digest of a file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be opened or read.
    pub fn compute(path: &Path, algorithm: ChecksumAlgorithm) -> std::io::Result<String> {
        debug!("Computing {} checksum for: {}", algorithm, path.display());

        let mut file = File::open(path)?;
        let mut hasher = Hasher::new(algorithm);
        let mut buffer = [0_u8; HASH_CHUNK_SIZE];

        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hasher.finalize_hex())
    }

    /// Whether the digest of `path` equals the expected one (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be read.
    pub fn matches(path: &Path, expected: &ChecksumParameters) -> std::io::Result<bool> {
        let actual = Self::compute(path, expected.algorithm)?;
        Ok(actual.eq_ignore_ascii_case(expected.checksum.trim()))
    }

    /// Verify a file against the expected digest.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::ChecksumMismatch`] if the digests differ,
    /// [`UpdaterError::Io`] if the file cannot be read.
    pub fn verify(path: &Path, expected: &ChecksumParameters) -> Result<(), UpdaterError> {
        info!("Verifying {} checksum for: {}", expected.algorithm, path.display());

        let actual = Self::compute(path, expected.algorithm)?;
        if !actual.eq_ignore_ascii_case(expected.checksum.trim()) {
            return Err(UpdaterError::ChecksumMismatch {
                path: path.display().to_string(),
                expected: expected.checksum.clone(),
                actual,
            });
        }

        info!("Checksum verification successful");
        Ok(())
    }

    /// Whether two files have identical SHA-256 digests.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of whichever file could not be read.
    pub fn same_content(a: &Path, b: &Path) -> std::io::Result<bool> {
        Ok(Self::compute(a, ChecksumAlgorithm::Sha256)?
            == Self::compute(b, ChecksumAlgorithm::Sha256)?)
    }
}
