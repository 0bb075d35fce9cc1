//! Printable-text armor for keys and ciphertexts
//!
//! ```text
//! -----BEGIN COURIER PUBLIC KEY-----
//! User-Id: User <user@example.com>
//!
//! q83vASNFZ4mrze8BI0VniavN7wEjRWeJq83vASNFZ4k=
//! =3q2+
//! -----END COURIER PUBLIC KEY-----
//! ```
//!
//! The checksum line is the base64 of the first three bytes of the BLAKE3
//! digest of the decoded body.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::error::{CryptoError, CryptoResult};
use super::hash::Hash;

const LINE_WIDTH: usize = 64;

/// What an armored block contains
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArmorKind {
    /// An X25519 public key
    PublicKey,
    /// An X25519 secret key with its public half
    PrivateKey,
    /// A sealed message envelope
    Message,
}

impl ArmorKind {
    fn label(self) -> &'static str {
        match self {
            ArmorKind::PublicKey => "COURIER PUBLIC KEY",
            ArmorKind::PrivateKey => "COURIER PRIVATE KEY",
            ArmorKind::Message => "COURIER MESSAGE",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        [ArmorKind::PublicKey, ArmorKind::PrivateKey, ArmorKind::Message]
            .into_iter()
            .find(|kind| kind.label() == label)
    }
}

/// A decoded armored block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Armored {
    /// Block type taken from the BEGIN line
    pub kind: ArmorKind,
    /// `Key: Value` headers in order of appearance
    pub headers: Vec<(String, String)>,
    /// Decoded body
    pub data: Vec<u8>,
}

impl Armored {
    /// First header value with the given key
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Armor `data` as a block of the given kind. Control characters in header
/// values are written as spaces.
pub fn encode(kind: ArmorKind, headers: &[(&str, &str)], data: &[u8]) -> String {
    let label = kind.label();
    let body = BASE64.encode(data);
    let checksum = checksum(data);

    let mut out = String::with_capacity(body.len() + 128);
    out.push_str(&format!("-----BEGIN {label}-----\n"));
    for (key, value) in headers {
        let value: String = value
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        out.push_str(&format!("{key}: {value}\n"));
    }
    out.push('\n');

    // base64 output is ASCII, so byte chunks are char boundaries
    for line in body.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push('=');
    out.push_str(&checksum);
    out.push('\n');
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Parse an armored block of any kind
pub fn decode(text: &str) -> CryptoResult<Armored> {
    let mut lines = text.trim().lines().map(str::trim_end);

    let begin = lines
        .next()
        .ok_or_else(|| CryptoError::MalformedArmor("empty input".to_string()))?;
    let label = begin
        .strip_prefix("-----BEGIN ")
        .and_then(|rest| rest.strip_suffix("-----"))
        .ok_or_else(|| CryptoError::MalformedArmor("missing BEGIN line".to_string()))?;
    let kind = ArmorKind::from_label(label)
        .ok_or_else(|| CryptoError::MalformedArmor(format!("unknown block type {label:?}")))?;

    let mut headers = Vec::new();
    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| CryptoError::MalformedArmor(format!("bad header line {line:?}")))?;
        headers.push((key.trim().to_string(), value.trim().to_string()));
    }

    let mut body = String::new();
    let mut expected_checksum = None;
    let mut saw_end = false;
    for line in lines.by_ref() {
        if let Some(sum) = line.strip_prefix('=') {
            expected_checksum = Some(sum.to_string());
        } else if let Some(rest) = line.strip_prefix("-----END ") {
            if rest.strip_suffix("-----") != Some(label) {
                return Err(CryptoError::MalformedArmor(
                    "END line does not match BEGIN line".to_string(),
                ));
            }
            saw_end = true;
            break;
        } else {
            body.push_str(line);
        }
    }

    if !saw_end {
        return Err(CryptoError::MalformedArmor("missing END line".to_string()));
    }

    let data = BASE64
        .decode(body.as_bytes())
        .map_err(|e| CryptoError::MalformedArmor(e.to_string()))?;

    let expected_checksum = expected_checksum
        .ok_or_else(|| CryptoError::MalformedArmor("missing checksum line".to_string()))?;
    if expected_checksum != checksum(&data) {
        return Err(CryptoError::MalformedArmor("checksum mismatch".to_string()));
    }

    Ok(Armored {
        kind,
        headers,
        data,
    })
}

/// Parse an armored block, requiring a specific kind
pub fn decode_kind(text: &str, expected: ArmorKind) -> CryptoResult<Armored> {
    let armored = decode(text)?;
    if armored.kind != expected {
        return Err(CryptoError::MalformedArmor(format!(
            "expected {}, found {}",
            expected.label(),
            armored.kind.label()
        )));
    }
    Ok(armored)
}

fn checksum(data: &[u8]) -> String {
    let digest = Hash::blake3(data);
    BASE64.encode(&digest[..3])
}
