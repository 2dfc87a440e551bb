//! Pluggable hash algorithms used for build fingerprints.
//!
//! Fingerprints are content-addressed keys, so the byte-for-byte output of
//! every algorithm registered here is part of the cache's on-disk and remote
//! protocol. Cryptographic algorithms stream their input; the
//! non-cryptographic `XX` accumulator concatenates sub-hashes into a buffer
//! and hashes the buffer once. Both disciplines are deterministic for
//! identical update sequences.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest;
use std::{fmt, fs, path::Path};
use tiny_keccak::Hasher as _;
use xxhash_rust::xxh3::Xxh3;

/// A fixed-width digest rendered as lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|err| CacheError::msg(format!("invalid fingerprint {hex_str:?}: {err}")))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex rendering, the canonical textual form.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex_str = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&hex_str).map_err(serde::de::Error::custom)
    }
}

/// The hash algorithms the engine can be configured with.
///
/// The `-MM` variants read files through a memory mapping instead of a
/// buffered read; their output is identical to the plain variant of the same
/// algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Md5,
    Keccak256,
    Xx,
    Sha256Mm,
    XxMm,
}

/// Registered algorithm names, as accepted in the configuration.
pub const ALGORITHM_NAMES: &[&str] = &["SHA-256", "MD5", "KECCAK-256", "XX", "SHA-256-MM", "XX-MM"];

impl HashAlgorithm {
    /// Looks an algorithm up by its configured name.
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "SHA-256" => Ok(Self::Sha256),
            "MD5" => Ok(Self::Md5),
            "KECCAK-256" => Ok(Self::Keccak256),
            "XX" => Ok(Self::Xx),
            "SHA-256-MM" => Ok(Self::Sha256Mm),
            "XX-MM" => Ok(Self::XxMm),
            other => Err(CacheError::UnknownAlgorithm {
                requested: other.to_string(),
                known: ALGORITHM_NAMES.to_vec(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Md5 => "MD5",
            Self::Keccak256 => "KECCAK-256",
            Self::Xx => "XX",
            Self::Sha256Mm => "SHA-256-MM",
            Self::XxMm => "XX-MM",
        }
    }

    fn memory_mapped(&self) -> bool {
        matches!(self, Self::Sha256Mm | Self::XxMm)
    }

    fn is_cryptographic(&self) -> bool {
        !matches!(self, Self::Xx | Self::XxMm)
    }

    /// Hashes the given bytes.
    pub fn hash(&self, bytes: &[u8]) -> Fingerprint {
        match self {
            Self::Sha256 | Self::Sha256Mm => {
                Fingerprint::from_bytes(sha2::Sha256::digest(bytes).to_vec())
            }
            Self::Md5 => Fingerprint::from_bytes(md5::Md5::digest(bytes).to_vec()),
            Self::Keccak256 => {
                let mut keccak = tiny_keccak::Keccak::v256();
                keccak.update(bytes);
                let mut out = [0u8; 32];
                keccak.finalize(&mut out);
                Fingerprint::from_bytes(out.to_vec())
            }
            Self::Xx | Self::XxMm => {
                Fingerprint::from_bytes(xxhash_rust::xxh3::xxh3_64(bytes).to_be_bytes().to_vec())
            }
        }
    }

    /// Hashes the full contents of the file at `path`.
    pub fn hash_file(&self, path: &Path) -> Result<Fingerprint> {
        if self.memory_mapped() {
            let file = fs::File::open(path).map_err(|err| CacheError::io(err, path))?;
            let len = file.metadata().map_err(|err| CacheError::io(err, path))?.len();
            // mapping a zero-length file is rejected by the OS
            if len == 0 {
                return Ok(self.hash(&[]));
            }
            let mmap =
                unsafe { memmap2::Mmap::map(&file).map_err(|err| CacheError::io(err, path))? };
            Ok(self.hash(&mmap))
        } else {
            let bytes = fs::read(path).map_err(|err| CacheError::io(err, path))?;
            Ok(self.hash(&bytes))
        }
    }

    /// Creates a streaming checksum accumulator for this algorithm.
    pub fn checksum(&self, capacity_hint: usize) -> Checksum {
        if self.is_cryptographic() {
            Checksum::Streaming(Digester::new(*self))
        } else {
            Checksum::Buffered { algorithm: *self, buf: Vec::with_capacity(capacity_hint) }
        }
    }
}

/// Accumulates byte fragments into a combined fingerprint.
pub enum Checksum {
    /// Fragments are fed straight into the underlying hash state.
    Streaming(Digester),
    /// Fragments are concatenated and hashed once on [`Checksum::digest`].
    Buffered { algorithm: HashAlgorithm, buf: Vec<u8> },
}

impl Checksum {
    /// Appends a byte fragment.
    pub fn update(&mut self, fragment: &[u8]) {
        match self {
            Checksum::Streaming(digester) => digester.update(fragment),
            Checksum::Buffered { buf, .. } => buf.extend_from_slice(fragment),
        }
    }

    /// Returns the combined fingerprint over all fragments, in update order.
    pub fn digest(self) -> Fingerprint {
        match self {
            Checksum::Streaming(digester) => digester.finalize(),
            Checksum::Buffered { algorithm, buf } => algorithm.hash(&buf),
        }
    }
}

/// Streaming hash state, dispatching on the configured algorithm.
pub enum Digester {
    Sha256(sha2::Sha256),
    Md5(md5::Md5),
    Keccak256(tiny_keccak::Keccak),
    Xx(Xxh3),
}

impl Digester {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 | HashAlgorithm::Sha256Mm => Self::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Md5 => Self::Md5(md5::Md5::new()),
            HashAlgorithm::Keccak256 => Self::Keccak256(tiny_keccak::Keccak::v256()),
            HashAlgorithm::Xx | HashAlgorithm::XxMm => Self::Xx(Xxh3::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(bytes),
            Self::Md5(h) => h.update(bytes),
            Self::Keccak256(h) => h.update(bytes),
            Self::Xx(h) => h.update(bytes),
        }
    }

    fn finalize(self) -> Fingerprint {
        match self {
            Self::Sha256(h) => Fingerprint::from_bytes(h.finalize().to_vec()),
            Self::Md5(h) => Fingerprint::from_bytes(h.finalize().to_vec()),
            Self::Keccak256(h) => {
                let mut out = [0u8; 32];
                h.finalize(&mut out);
                Fingerprint::from_bytes(out.to_vec())
            }
            Self::Xx(h) => Fingerprint::from_bytes(h.digest().to_be_bytes().to_vec()),
        }
    }
}
