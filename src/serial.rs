//! Binary serialization and deserialization of rule configurations.
//!
//! This module provides a stable binary format for persisting a
//! [`RuleConfig`](crate::RuleConfig) so that rule source does not have to be
//! re-read on every start. The format consists of a 32-byte fixed header
//! followed by a bincode-encoded payload.
//!
//! ## Wire Format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"RXPR"
//! 4       2     Format version (u16, little-endian)
//! 6       2     Engine version (u16, little-endian)
//! 8       4     Flags (u32, reserved)
//! 12      4     Payload length in bytes (u32, little-endian)
//! 16      16    BLAKE3 hash of the payload (truncated to 16 bytes)
//! 32..    var   Bincode-encoded payload
//! ```
//!
//! The payload stores the configuration's source tree. Decoding rebuilds the
//! configuration through the same compile step as the rule source parser, so
//! expressions are parsed again with the current operator table.
//!
//! ## Versioning
//!
//! The format version in the header must match exactly. If it does not,
//! deserialization fails immediately with [`DeserializeError::IncompatibleVersion`].
//! The engine version is informational only.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parse::{ExpressionParser, ParsedConfig, ParsedRule};
use crate::types::RuleConfig;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAGIC: &[u8; 4] = b"RXPR";
const FORMAT_VERSION: u16 = 1;
const ENGINE_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when serializing a [`RuleConfig`](crate::RuleConfig) to bytes.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode rule config: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

/// Errors that can occur when deserializing a [`RuleConfig`](crate::RuleConfig) from bytes.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not a rulexpr binary: invalid magic bytes")]
    BadMagic,

    #[error("incompatible format version: blob is v{blob}, engine supports v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("integrity check failed: BLAKE3 checksum mismatch")]
    ChecksumMismatch,

    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("validation failed: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Serialized payload
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SerializedConfig {
    metadata: ConfigMetadata,
    config: ParsedConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigMetadata {
    rule_count: usize,
    config_count: usize,
    source_digest: Option<[u8; 32]>,
}

/// Rules at every level, including nested `thenIf` and `elseIf` rules.
fn count_rules(rules: &[ParsedRule]) -> usize {
    rules
        .iter()
        .map(|rule| {
            1 + rule.then_rules.as_deref().map_or(0, count_rules)
                + rule.else_rules.as_deref().map_or(0, count_rules)
        })
        .sum()
}

fn count_config_rules(config: &ParsedConfig) -> usize {
    count_rules(&config.rules) + config.configs.iter().map(count_config_rules).sum::<usize>()
}

/// The configuration itself plus every nested configuration.
fn count_configs(config: &ParsedConfig) -> usize {
    1 + config.configs.iter().map(count_configs).sum::<usize>()
}

fn config_to_serialized(config: &RuleConfig, source_text: Option<&str>) -> SerializedConfig {
    let source = config.to_source();
    SerializedConfig {
        metadata: ConfigMetadata {
            rule_count: count_config_rules(&source),
            config_count: count_configs(&source),
            source_digest: source_text.map(|s| *blake3::hash(s.as_bytes()).as_bytes()),
        },
        config: source,
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(ser: &SerializedConfig) -> Result<(), DeserializeError> {
    let rule_count = count_config_rules(&ser.config);
    if ser.metadata.rule_count != rule_count {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} rules but payload has {}",
            ser.metadata.rule_count, rule_count
        )));
    }
    let config_count = count_configs(&ser.config);
    if ser.metadata.config_count != config_count {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} configs but payload has {}",
            ser.metadata.config_count, config_count
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Header I/O
// ---------------------------------------------------------------------------

fn write_header(buf: &mut Vec<u8>, payload: &[u8]) {
    let hash = blake3::hash(payload);
    let hash_bytes = hash.as_bytes();

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&ENGINE_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags (reserved)
    #[allow(clippy::cast_possible_truncation)] // payload will never exceed 4 GiB
    let payload_len = payload.len() as u32;
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&hash_bytes[..16]);
}

#[allow(clippy::cast_possible_truncation)] // HEADER_SIZE is 32, always fits in u32
fn read_header(bytes: &[u8]) -> Result<(u16, u32, [u8; 16]), DeserializeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DeserializeError::LengthMismatch {
            expected: HEADER_SIZE as u32,
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != MAGIC {
        return Err(DeserializeError::BadMagic);
    }

    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    // bytes[6..8] is engine_version, bytes[8..12] is flags
    let payload_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    let mut hash = [0u8; 16];
    hash.copy_from_slice(&bytes[16..32]);

    Ok((format_version, payload_len, hash))
}

/// Check the header and checksum and decode the payload.
fn read_payload(bytes: &[u8]) -> Result<SerializedConfig, DeserializeError> {
    let (format_version, payload_len, stored_hash) = read_header(bytes)?;

    if format_version != FORMAT_VERSION {
        return Err(DeserializeError::IncompatibleVersion {
            blob: format_version,
            supported: FORMAT_VERSION,
        });
    }

    let payload_end = HEADER_SIZE + payload_len as usize;
    if bytes.len() < payload_end {
        return Err(DeserializeError::LengthMismatch {
            expected: payload_len,
            actual: bytes.len() - HEADER_SIZE,
        });
    }
    let payload = &bytes[HEADER_SIZE..payload_end];

    let computed_hash = blake3::hash(payload);
    if computed_hash.as_bytes()[..16] != stored_hash {
        return Err(DeserializeError::ChecksumMismatch);
    }

    let (serialized, _): (SerializedConfig, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    Ok(serialized)
}

// ---------------------------------------------------------------------------
// Public encode/decode
// ---------------------------------------------------------------------------

pub(crate) fn encode(
    config: &RuleConfig,
    source_text: Option<&str>,
) -> Result<Vec<u8>, SerializeError> {
    let serialized = config_to_serialized(config, source_text);
    let payload = bincode::serde::encode_to_vec(&serialized, bincode::config::standard())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, &payload);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<RuleConfig, DeserializeError> {
    decode_with(bytes, &ExpressionParser::shared())
}

pub(crate) fn decode_with(
    bytes: &[u8],
    parser: &ExpressionParser,
) -> Result<RuleConfig, DeserializeError> {
    let serialized = read_payload(bytes)?;
    validate(&serialized)?;
    crate::compile::compile_config(parser, &serialized.config)
        .map_err(|e| DeserializeError::Validation(e.to_string()))
}

pub(crate) fn source_digest(bytes: &[u8]) -> Result<Option<[u8; 32]>, DeserializeError> {
    Ok(read_payload(bytes)?.metadata.source_digest)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
