//! Wire-level request/response shapes and the lock mode vocabulary.
//!
//! These types are transport-agnostic: they describe the JSON documents
//! exchanged over a session, independent of whether the bytes arrived over
//! a WebSocket text frame or an in-memory channel in a test.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A lock mode: shared (read) or exclusive (write).
///
/// `Write` dominates `Read` wherever the two must be combined into one
/// effective mode (e.g. two claims of the same batch crossing one node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Read,
    Write,
}

impl Mode {
    /// Parses the wire's case-insensitive `r`/`read`/`w`/`write` vocabulary.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        match raw.to_ascii_lowercase().as_str() {
            "r" | "read" => Ok(Mode::Read),
            "w" | "write" => Ok(Mode::Write),
            other => Err(ProtocolError::UnknownResourceType(other.to_string())),
        }
    }

    /// Two modes conflict unless both are `Read`.
    pub fn conflicts_with(self, other: Mode) -> bool {
        !(self == Mode::Read && other == Mode::Read)
    }

    /// The dominant mode when two claims of the same batch overlap a node.
    pub fn dominant(self, other: Mode) -> Mode {
        if self == Mode::Write || other == Mode::Write {
            Mode::Write
        } else {
            Mode::Read
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Read => "read",
            Mode::Write => "write",
        })
    }
}

/// A single resource claim: a mode plus a hierarchical path.
///
/// The empty path (`[]`) denotes the namespace root — a claim on it
/// conflicts with every other non-`Read` claim in the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Claim {
    pub mode: Mode,
    pub path: Vec<String>,
}

/// The wire shape of one element of a `lock` request's `resources` array.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireResource {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: Vec<String>,
}

/// The wire shape of a client-to-server request.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRequest {
    pub action: String,
    #[serde(default)]
    pub resources: Vec<WireResource>,
}

/// The session state a response was produced from, echoed back to the
/// client so it can distinguish an immediate grant from a queued one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WireState {
    Acquired,
    Enqueued,
    Ready,
}

/// The wire shape of a server-to-client response.
#[derive(Debug, Clone, Serialize)]
pub struct WireResponse {
    pub id: serde_json::Value,
    pub action: String,
    pub state: WireState,
}

/// Parses a request's `resources` array into normalized claims.
///
/// Path segments are used verbatim (no case-folding, no trimming) — the
/// wire format treats a path as an opaque sequence of segment strings.
pub fn parse_claims(resources: &[WireResource]) -> Result<Vec<Claim>, ProtocolError> {
    if resources.is_empty() {
        return Err(ProtocolError::EmptyClaims);
    }
    resources
        .iter()
        .map(|r| {
            Mode::parse(&r.kind).map(|mode| Claim {
                mode,
                path: r.path.clone(),
            })
        })
        .collect()
}

/// Collapses duplicate `(mode, path)` pairs within one batch, and merges
/// distinct-mode duplicates on the same path to their dominant mode.
///
/// A batch submitted as `[write(a), read(a)]` is normalized to a single
/// `write(a)` claim — the path store's per-node bookkeeping only needs to
/// see one claim per distinct path per batch.
pub fn normalize_claims(claims: Vec<Claim>) -> Vec<Claim> {
    let mut merged: Vec<Claim> = Vec::with_capacity(claims.len());
    for claim in claims {
        if let Some(existing) = merged.iter_mut().find(|c: &&mut Claim| c.path == claim.path) {
            existing.mode = existing.mode.dominant(claim.mode);
        } else {
            merged.push(claim);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_is_case_insensitive() {
        assert_eq!(Mode::parse("R").unwrap(), Mode::Read);
        assert_eq!(Mode::parse("Write").unwrap(), Mode::Write);
        assert!(Mode::parse("rw").is_err());
    }

    #[test]
    fn read_read_does_not_conflict() {
        assert!(!Mode::Read.conflicts_with(Mode::Read));
        assert!(Mode::Read.conflicts_with(Mode::Write));
        assert!(Mode::Write.conflicts_with(Mode::Write));
    }

    #[test]
    fn normalize_merges_duplicate_paths_to_dominant_mode() {
        let claims = vec![
            Claim { mode: Mode::Write, path: vec!["a".into()] },
            Claim { mode: Mode::Read, path: vec!["a".into()] },
            Claim { mode: Mode::Read, path: vec!["b".into()] },
        ];
        let merged = normalize_claims(claims);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].mode, Mode::Write);
    }
}
