//! # Multihash Digests
//!
//! A [`Digest`] is a self-describing content identifier: a multihash
//! algorithm code plus the raw digest bytes. Equality is structural, so two
//! digests produced by different algorithms are never equal, even when their
//! hex renderings happen to coincide.
//!
//! ## Wire Form
//!
//! ```text
//! varint(code) ++ varint(len) ++ digest-bytes
//! ```
//!
//! Varints are unsigned LEB128 as used by multiformats, at most nine bytes,
//! minimally encoded. The textual form is the lowercase hex of the wire form
//! and is what submissions carry in their `multihash` field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::algorithm::AlgorithmCode;
use crate::error::DigestError;

/// Longest varint accepted by the multiformats unsigned-varint spec.
const MAX_VARINT_LEN: usize = 9;

/// A multihash: algorithm code and raw digest bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    code: AlgorithmCode,
    bytes: Vec<u8>,
}

impl Digest {
    /// Create a digest from an algorithm code and raw hash output.
    pub fn new(code: AlgorithmCode, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            bytes: bytes.into(),
        }
    }

    /// The multihash algorithm code.
    pub fn code(&self) -> AlgorithmCode {
        self.code
    }

    /// The raw digest bytes, without the multihash header.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The raw digest as lowercase hex, without the multihash header.
    pub fn hash_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// The binary multihash.
    pub fn to_multihash(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes.len() + 4);
        write_varint(self.code.0, &mut out);
        write_varint(self.bytes.len() as u64, &mut out);
        out.extend_from_slice(&self.bytes);
        out
    }

    /// Parse a binary multihash.
    pub fn from_multihash(raw: &[u8]) -> Result<Self, DigestError> {
        let malformed = |reason: &str| DigestError::Malformed {
            input: hex::encode(raw),
            reason: reason.to_string(),
        };

        let (code, code_len) = read_varint(raw).map_err(|r| malformed(&format!("code: {r}")))?;
        let rest = &raw[code_len..];
        let (len, len_len) = read_varint(rest).map_err(|r| malformed(&format!("length: {r}")))?;
        let body = &rest[len_len..];

        let len = usize::try_from(len).map_err(|_| malformed("length does not fit in memory"))?;
        if body.len() != len {
            return Err(malformed(&format!(
                "length prefix says {len} bytes, found {}",
                body.len()
            )));
        }

        Ok(Self::new(AlgorithmCode(code), body))
    }

    /// The textual form: lowercase hex of the binary multihash.
    pub fn encode(&self) -> String {
        hex::encode(self.to_multihash())
    }

    /// Parse the textual form.
    pub fn decode(text: &str) -> Result<Self, DigestError> {
        let raw = hex::decode(text).map_err(|e| DigestError::Malformed {
            input: text.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_multihash(&raw).map_err(|e| match e {
            DigestError::Malformed { reason, .. } => DigestError::Malformed {
                input: text.to_string(),
                reason,
            },
            other => other,
        })
    }
}

impl fmt::Display for Digest {
    /// `algorithm:hex`, using built-in names where known.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code.builtin_name() {
            Some(name) => write!(f, "{name}:{}", self.hash_hex()),
            None => write!(f, "{}:{}", self.code, self.hash_hex()),
        }
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::decode(&text).map_err(serde::de::Error::custom)
    }
}

fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Returns the decoded value and the number of bytes consumed.
fn read_varint(input: &[u8]) -> Result<(u64, usize), &'static str> {
    let mut value: u64 = 0;
    for (i, &byte) in input.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err("varint too long");
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            if byte == 0 && i > 0 {
                return Err("varint not minimally encoded");
            }
            return Ok((value, i + 1));
        }
    }
    Err("truncated varint")
}
