//! # Hash Algorithm Registry
//!
//! Maps multihash codes to hash implementations. Codes come from the
//! multicodec table: <https://github.com/multiformats/multicodec/blob/master/table.csv>.
//!
//! The registry is a plain value built once per run and passed to whoever
//! needs it. [`AlgorithmRegistry::builtin()`] knows `sha2-256` and `sha2-512`;
//! further algorithms are added with [`AlgorithmRegistry::register()`].
//! Lookups of unknown codes fail closed with
//! [`DigestError::UnsupportedAlgorithm`], never falling back to a default.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};

use crate::digest::Digest;
use crate::error::DigestError;

/// A multihash algorithm code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgorithmCode(pub u64);

impl AlgorithmCode {
    /// `sha2-256`.
    pub const SHA2_256: Self = Self(0x12);
    /// `sha2-512`.
    pub const SHA2_512: Self = Self(0x13);

    /// The human-readable name of a built-in algorithm, if this is one.
    pub fn builtin_name(self) -> Option<&'static str> {
        match self {
            Self::SHA2_256 => Some("sha2-256"),
            Self::SHA2_512 => Some("sha2-512"),
            _ => None,
        }
    }
}

impl fmt::Display for AlgorithmCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Incremental hashing state for one digest computation.
pub trait StreamHasher: Send {
    /// Feed more input.
    fn update(&mut self, data: &[u8]);

    /// Consume the hasher and return the raw digest bytes.
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// A hash algorithm that can be registered under a multihash code.
pub trait HashAlgorithm: Send + Sync + fmt::Debug {
    /// The multihash code this algorithm is registered under.
    fn code(&self) -> AlgorithmCode;

    /// Multicodec name, e.g. `sha2-256`.
    fn name(&self) -> &str;

    /// Name used in HTTP `Repr-Digest` headers, e.g. `sha-256`.
    ///
    /// `None` if the algorithm has no registered HTTP digest name.
    fn http_name(&self) -> Option<&str>;

    /// Start a fresh hashing state.
    fn hasher(&self) -> Box<dyn StreamHasher>;
}

struct Sha2Hasher<D>(D);

impl<D> StreamHasher for Sha2Hasher<D>
where
    D: sha2::Digest + Send,
{
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        let this = *self;
        sha2::Digest::finalize(this.0).to_vec()
    }
}

#[derive(Debug)]
struct Sha2Algorithm {
    code: AlgorithmCode,
    name: &'static str,
    http_name: &'static str,
    new_hasher: fn() -> Box<dyn StreamHasher>,
}

impl HashAlgorithm for Sha2Algorithm {
    fn code(&self) -> AlgorithmCode {
        self.code
    }

    fn name(&self) -> &str {
        self.name
    }

    fn http_name(&self) -> Option<&str> {
        Some(self.http_name)
    }

    fn hasher(&self) -> Box<dyn StreamHasher> {
        (self.new_hasher)()
    }
}

fn new_sha256() -> Box<dyn StreamHasher> {
    Box::new(Sha2Hasher(<Sha256 as sha2::Digest>::new()))
}

fn new_sha512() -> Box<dyn StreamHasher> {
    Box::new(Sha2Hasher(<Sha512 as sha2::Digest>::new()))
}

fn sha2_256() -> Arc<dyn HashAlgorithm> {
    Arc::new(Sha2Algorithm {
        code: AlgorithmCode::SHA2_256,
        name: "sha2-256",
        http_name: "sha-256",
        new_hasher: new_sha256,
    })
}

fn sha2_512() -> Arc<dyn HashAlgorithm> {
    Arc::new(Sha2Algorithm {
        code: AlgorithmCode::SHA2_512,
        name: "sha2-512",
        http_name: "sha-512",
        new_hasher: new_sha512,
    })
}

/// Registry of supported hash algorithms, keyed by multihash code.
#[derive(Debug, Clone)]
pub struct AlgorithmRegistry {
    algorithms: BTreeMap<AlgorithmCode, Arc<dyn HashAlgorithm>>,
    default: Arc<dyn HashAlgorithm>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AlgorithmRegistry {
    /// Registry with the built-in algorithms; `sha2-256` is the default.
    pub fn builtin() -> Self {
        let default = sha2_256();
        let mut algorithms = BTreeMap::new();
        algorithms.insert(default.code(), Arc::clone(&default));
        let sha512 = sha2_512();
        algorithms.insert(sha512.code(), sha512);
        Self {
            algorithms,
            default,
        }
    }

    /// Register an algorithm, replacing any previous one with the same code.
    pub fn register(
        &mut self,
        algorithm: Arc<dyn HashAlgorithm>,
    ) -> Option<Arc<dyn HashAlgorithm>> {
        let code = algorithm.code();
        if self.default.code() == code {
            self.default = Arc::clone(&algorithm);
        }
        self.algorithms.insert(code, algorithm)
    }

    /// Make an already-registered algorithm the one used whenever the
    /// pipeline computes a digest on its own.
    pub fn set_default(&mut self, code: AlgorithmCode) -> Result<(), DigestError> {
        self.default = Arc::clone(self.get(code)?);
        Ok(())
    }

    /// The algorithm used when no digest was declared.
    pub fn default_algorithm(&self) -> &Arc<dyn HashAlgorithm> {
        &self.default
    }

    /// Look up an algorithm by code.
    pub fn get(&self, code: AlgorithmCode) -> Result<&Arc<dyn HashAlgorithm>, DigestError> {
        self.algorithms
            .get(&code)
            .ok_or(DigestError::UnsupportedAlgorithm(code))
    }

    /// Whether `code` has a registered implementation.
    pub fn is_supported(&self, code: AlgorithmCode) -> bool {
        self.algorithms.contains_key(&code)
    }

    /// The multicodec name for `code`.
    pub fn algorithm_name(&self, code: AlgorithmCode) -> Result<&str, DigestError> {
        Ok(self.get(code)?.name())
    }

    /// Start an incremental digest computation under `code`.
    pub fn builder(&self, code: AlgorithmCode) -> Result<DigestBuilder, DigestError> {
        let algorithm = self.get(code)?;
        Ok(DigestBuilder {
            code,
            hasher: algorithm.hasher(),
        })
    }

    /// Start an incremental digest computation under the default algorithm.
    pub fn default_builder(&self) -> DigestBuilder {
        DigestBuilder {
            code: self.default.code(),
            hasher: self.default.hasher(),
        }
    }

    /// Hash a complete in-memory buffer.
    pub fn digest(&self, code: AlgorithmCode, data: &[u8]) -> Result<Digest, DigestError> {
        let mut builder = self.builder(code)?;
        builder.update(data);
        Ok(builder.finish())
    }

    /// Render `algorithm:hex` for operator-facing messages.
    ///
    /// Falls back to the numeric code when the algorithm is unknown so
    /// that error messages about unsupported digests still print.
    pub fn describe(&self, digest: &Digest) -> String {
        match self.algorithm_name(digest.code()) {
            Ok(name) => format!("{name}:{}", digest.hash_hex()),
            Err(_) => format!("{}:{}", digest.code(), digest.hash_hex()),
        }
    }

    /// The value of a `Repr-Digest` header for this digest:
    /// `sha-256=:<base64>:`.
    pub fn repr_digest(&self, digest: &Digest) -> Result<String, DigestError> {
        let http_name = self.http_name(digest.code())?;
        Ok(format!("{http_name}=:{}:", BASE64.encode(digest.bytes())))
    }

    /// The value of a `Want-Repr-Digest` header asking for this algorithm.
    pub fn want_repr_digest(&self, code: AlgorithmCode) -> Result<String, DigestError> {
        Ok(format!("{}=10", self.http_name(code)?))
    }

    fn http_name(&self, code: AlgorithmCode) -> Result<&str, DigestError> {
        self.get(code)?
            .http_name()
            .ok_or(DigestError::UnsupportedAlgorithm(code))
    }
}

/// An in-progress digest computation bound to one algorithm.
pub struct DigestBuilder {
    code: AlgorithmCode,
    hasher: Box<dyn StreamHasher>,
}

impl fmt::Debug for DigestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestBuilder")
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

impl DigestBuilder {
    /// The algorithm this builder hashes with.
    pub fn code(&self) -> AlgorithmCode {
        self.code
    }

    /// Feed more input.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finish hashing.
    pub fn finish(self) -> Digest {
        Digest::new(self.code, self.hasher.finalize())
    }
}
