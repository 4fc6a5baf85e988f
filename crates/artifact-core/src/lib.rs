//! # artifact-core: Foundational Types for Artifact Ingestion
//!
//! This crate is the leaf of the workspace DAG. It defines the value types
//! every other crate agrees on:
//!
//! - [`Digest`]: a self-describing content identifier (multihash) pairing an
//!   algorithm code with raw digest bytes, with a stable hex text form.
//! - [`AlgorithmRegistry`]: maps multihash codes to hash implementations.
//!   Unknown codes fail closed with [`DigestError::UnsupportedAlgorithm`].
//! - Identifier newtypes ([`Slug`], [`ArtifactId`], [`FileName`],
//!   [`MediaType`], [`LanguageTag`]) validated at construction time.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `artifact-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod algorithm;
pub mod digest;
pub mod error;
pub mod identity;

pub use algorithm::{AlgorithmCode, AlgorithmRegistry, DigestBuilder, HashAlgorithm, StreamHasher};
pub use digest::Digest;
pub use error::{DigestError, ValidationError};
pub use identity::{ArtifactId, FileName, LanguageTag, MediaType, Slug, ARTIFACT_ID_LENGTH};
