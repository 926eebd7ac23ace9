use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Id of the single vocabulary document inside a user's database.
pub const VOCAB_DOC_ID: &str = "vocab";

const DATABASE_PREFIX: &str = "sesotho-vocab-";
/// Longest database name derived from a username.
pub const MAX_DERIVED_NAME_LEN: usize = 200;
const HASHED_PREFIX_LEN: usize = 160;
const HASH_MARKER: &str = "_h";
const HASH_HEX_LEN: usize = 32;

/// Highest generation a revision token may carry; stores keep it in a signed
/// 64-bit column.
pub const MAX_GENERATION: u64 = i64::MAX as u64;

/// Database name scoped to `username`.
///
/// Characters outside `[A-Za-z0-9-]` are escaped as `_xx` hex bytes so two
/// distinct usernames never share a database. Names longer than
/// [`MAX_DERIVED_NAME_LEN`] keep a readable prefix followed by `_h` and a
/// SHA-256 digest of the username; `_h` never appears in an escaped name.
pub fn database_name_for_username(username: &str) -> String {
    let mut name = String::from(DATABASE_PREFIX);
    for byte in username.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            name.push(byte as char);
        } else {
            name.push_str(&format!("_{byte:02x}"));
        }
    }
    if name.len() <= MAX_DERIVED_NAME_LEN {
        return name;
    }

    let digest = format!("{:x}", Sha256::digest(username.as_bytes()));
    name.truncate(HASHED_PREFIX_LEN);
    name.push_str(HASH_MARKER);
    name.push_str(&digest[..HASH_HEX_LEN]);
    name
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed revision token '{0}'")]
pub struct MalformedRevision(pub String);

/// Opaque version marker assigned by a store on every accepted write.
///
/// Rendered as `<generation>-<digest>`; ordered by generation, then digest, so
/// every replica picks the same winner between two revisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision {
    generation: u64,
    digest: String,
}

impl Revision {
    pub fn new(generation: u64, digest: impl Into<String>) -> Self {
        Self {
            generation,
            digest: digest.into(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.digest)
    }
}

impl FromStr for Revision {
    type Err = MalformedRevision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (generation, digest) = s
            .split_once('-')
            .ok_or_else(|| MalformedRevision(s.to_string()))?;
        let generation = generation
            .parse::<u64>()
            .map_err(|_| MalformedRevision(s.to_string()))?;
        if generation == 0 || generation > MAX_GENERATION || digest.is_empty() {
            return Err(MalformedRevision(s.to_string()));
        }
        Ok(Self::new(generation, digest))
    }
}

impl TryFrom<String> for Revision {
    type Error = MalformedRevision;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Revision> for String {
    fn from(value: Revision) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub rev: Revision,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub seq: i64,
    pub id: String,
    pub rev: Revision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangesResponse {
    pub last_seq: i64,
    pub results: Vec<ChangeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutDocumentRequest {
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<Revision>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutDocumentResponse {
    pub id: String,
    pub rev: Revision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateResponse {
    pub applied: bool,
}

/// Pushed to observers of a database for every accepted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub db: String,
    pub change: ChangeEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_round_trips_through_its_string_form() {
        let rev: Revision = "3-abc123".parse().expect("rev");
        assert_eq!(rev.generation(), 3);
        assert_eq!(rev.digest(), "abc123");
        assert_eq!(rev.to_string(), "3-abc123");

        let json = serde_json::to_string(&rev).expect("json");
        assert_eq!(json, "\"3-abc123\"");
    }

    #[test]
    fn revision_rejects_malformed_tokens() {
        assert!("abc".parse::<Revision>().is_err());
        assert!("0-abc".parse::<Revision>().is_err());
        assert!("2-".parse::<Revision>().is_err());
        assert!(serde_json::from_str::<Revision>("\"x-1\"").is_err());
    }

    #[test]
    fn revision_generation_fits_a_signed_column() {
        let max: Revision = "9223372036854775807-abc".parse().expect("max generation");
        assert_eq!(max.generation(), MAX_GENERATION);
        assert!("9223372036854775808-abc".parse::<Revision>().is_err());
        assert!(serde_json::from_str::<Revision>("\"18446744073709551615-abc\"").is_err());
    }

    #[test]
    fn higher_generation_wins_then_digest_breaks_ties() {
        let older = Revision::new(2, "ffff");
        let newer = Revision::new(10, "0000");
        assert!(newer > older);
        assert!(Revision::new(2, "b") > Revision::new(2, "a"));
    }

    #[test]
    fn database_names_escape_unsafe_characters() {
        assert_eq!(database_name_for_username("thabo"), "sesotho-vocab-thabo");
        assert_eq!(database_name_for_username("a b"), "sesotho-vocab-a_20b");
        assert_ne!(
            database_name_for_username("a_b"),
            database_name_for_username("a b")
        );
    }

    #[test]
    fn long_usernames_get_bounded_distinct_names() {
        let long = "a".repeat(241);
        let name = database_name_for_username(&long);
        assert!(name.len() <= MAX_DERIVED_NAME_LEN);
        assert!(name.starts_with("sesotho-vocab-aaaa"));
        assert!(name.contains("_h"));
        assert_ne!(name, database_name_for_username(&"a".repeat(242)));

        let escaped = database_name_for_username(&"Mpho Ntšekhe ".repeat(20));
        assert!(escaped.len() <= MAX_DERIVED_NAME_LEN);
        assert!(escaped
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
        assert_ne!(escaped, database_name_for_username(&"Mpho Ntšekhe ".repeat(21)));
    }

    #[test]
    fn short_usernames_keep_plain_escaping() {
        let name = database_name_for_username("Ntšekhe");
        assert_eq!(name, "sesotho-vocab-Nt_c5_a1ekhe");
        assert!(!name.contains("_h"));
    }
}
