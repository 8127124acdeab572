//! Key expressions and the deterministic key layout of the realm.
//!
//! Every resource in a realm is addressed by a `/`-separated key:
//!
//! - publish/subscribe: `{realm}/@v0/{entity_id}/pubsub/{subject}/{source_id}`
//! - request/reply: `{realm}/@v0/{entity_id}/@rpc/{procedure}/{responder_id}`
//!
//! Only the trailing `source_id` (or `responder_id`) may span several
//! chunks. All other components must be exactly one plain chunk, which
//! makes the construction injective: [`PubSubKey::parse`] and
//! [`ReqRepKey::parse`] recover the exact tuple a key was built from.

use eyre::{Result, bail, ensure};
use std::{fmt, sync::Arc};

/// Version chunk following the realm.
pub const KEY_VERSION: &str = "@v0";

/// Chunk marking a publish/subscribe key.
pub const PUBSUB_TAG: &str = "pubsub";

/// Chunk marking a request/reply key.
pub const RPC_TAG: &str = "@rpc";

const RESERVED_CHARS: [char; 3] = ['#', '?', '$'];

/// A validated key expression.
///
/// Chunks are non-empty. `*` matches exactly one chunk and `**` matches
/// any number of chunks; both are only legal as whole chunks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyExpr(Arc<str>);

impl KeyExpr {
    /// Validate and wrap a key expression.
    pub fn new(expr: impl AsRef<str>) -> Result<Self> {
        let expr = expr.as_ref();
        ensure!(!expr.is_empty(), "key expression cannot be empty");

        for chunk in expr.split('/') {
            ensure!(
                !chunk.is_empty(),
                "key expression '{}' contains an empty chunk",
                expr
            );
            if let Some(c) = chunk.chars().find(|c| RESERVED_CHARS.contains(c)) {
                bail!("key expression '{}' contains reserved character '{}'", expr, c);
            }
            ensure!(
                !chunk.contains('*') || chunk == "*" || chunk == "**",
                "wildcards in '{}' must span a whole chunk",
                expr
            );
        }

        Ok(Self(Arc::from(expr)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the chunks of the key.
    pub fn chunks(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Whether the key contains any wildcard chunk.
    pub fn is_wild(&self) -> bool {
        self.chunks().any(|c| c == "*" || c == "**")
    }

    /// Whether some concrete key is matched by both expressions.
    ///
    /// Wildcards never match a chunk starting with `@`.
    pub fn intersects(&self, other: &KeyExpr) -> bool {
        let lhs: Vec<&str> = self.chunks().collect();
        let rhs: Vec<&str> = other.chunks().collect();
        intersect_chunks(&lhs, &rhs)
    }
}

impl fmt::Display for KeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for KeyExpr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for KeyExpr {
    type Error = eyre::Error;

    fn try_from(expr: &str) -> Result<Self> {
        Self::new(expr)
    }
}

impl TryFrom<String> for KeyExpr {
    type Error = eyre::Error;

    fn try_from(expr: String) -> Result<Self> {
        Self::new(expr)
    }
}

fn intersect_chunks(lhs: &[&str], rhs: &[&str]) -> bool {
    match (lhs.split_first(), rhs.split_first()) {
        (None, None) => true,
        (Some((&"**", rest)), _) => {
            intersect_chunks(rest, rhs)
                || matches!(rhs.split_first(), Some((head, _)) if !head.starts_with('@'))
                    && intersect_chunks(lhs, &rhs[1..])
        }
        (_, Some((&"**", rest))) => {
            intersect_chunks(lhs, rest)
                || matches!(lhs.split_first(), Some((head, _)) if !head.starts_with('@'))
                    && intersect_chunks(&lhs[1..], rhs)
        }
        (Some((l, lrest)), Some((r, rrest))) => {
            chunk_matches(l, r) && intersect_chunks(lrest, rrest)
        }
        _ => false,
    }
}

fn chunk_matches(l: &str, r: &str) -> bool {
    l == r || (l == "*" && !r.starts_with('@')) || (r == "*" && !l.starts_with('@'))
}

/// Check a component that must occupy exactly one chunk.
fn validate_chunk(name: &str, value: &str) -> Result<()> {
    ensure!(!value.is_empty(), "{} cannot be empty", name);
    ensure!(
        !value.contains('/'),
        "{} '{}' must be a single key chunk",
        name,
        value
    );
    ensure!(
        !value.starts_with('@'),
        "{} '{}' cannot start with '@'",
        name,
        value
    );
    ensure!(
        !value.contains('*'),
        "{} '{}' cannot contain wildcards",
        name,
        value
    );
    if let Some(c) = value.chars().find(|c| RESERVED_CHARS.contains(c)) {
        bail!("{} '{}' contains reserved character '{}'", name, value, c);
    }
    Ok(())
}

/// Check a trailing component that may span several chunks.
fn validate_tail(name: &str, value: &str) -> Result<()> {
    ensure!(!value.is_empty(), "{} cannot be empty", name);
    for chunk in value.split('/') {
        validate_chunk(name, chunk)?;
    }
    Ok(())
}

/// Components of a publish/subscribe key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PubSubKey {
    pub realm: String,
    pub entity_id: String,
    pub subject: String,
    pub source_id: String,
}

impl PubSubKey {
    pub fn new(
        realm: impl Into<String>,
        entity_id: impl Into<String>,
        subject: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            realm: realm.into(),
            entity_id: entity_id.into(),
            subject: subject.into(),
            source_id: source_id.into(),
        }
    }

    /// Build the key expression after validating every component.
    pub fn to_key(&self) -> Result<KeyExpr> {
        validate_chunk("realm", &self.realm)?;
        validate_chunk("entity_id", &self.entity_id)?;
        validate_chunk("subject", &self.subject)?;
        validate_tail("source_id", &self.source_id)?;

        KeyExpr::new(format!(
            "{}/{}/{}/{}/{}/{}",
            self.realm, KEY_VERSION, self.entity_id, PUBSUB_TAG, self.subject, self.source_id
        ))
    }

    /// Recover the components of a concrete publish/subscribe key.
    pub fn parse(key: &KeyExpr) -> Option<Self> {
        let mut chunks = key.as_str().splitn(6, '/');
        let realm = chunks.next()?;
        (chunks.next()? == KEY_VERSION).then_some(())?;
        let entity_id = chunks.next()?;
        (chunks.next()? == PUBSUB_TAG).then_some(())?;
        let subject = chunks.next()?;
        let source_id = chunks.next()?;

        let parsed = Self::new(realm, entity_id, subject, source_id);
        parsed.to_key().ok()?;
        Some(parsed)
    }
}

/// Components of a request/reply key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReqRepKey {
    pub realm: String,
    pub entity_id: String,
    pub procedure: String,
    pub responder_id: String,
}

impl ReqRepKey {
    pub fn new(
        realm: impl Into<String>,
        entity_id: impl Into<String>,
        procedure: impl Into<String>,
        responder_id: impl Into<String>,
    ) -> Self {
        Self {
            realm: realm.into(),
            entity_id: entity_id.into(),
            procedure: procedure.into(),
            responder_id: responder_id.into(),
        }
    }

    /// Build the key expression after validating every component.
    pub fn to_key(&self) -> Result<KeyExpr> {
        validate_chunk("realm", &self.realm)?;
        validate_chunk("entity_id", &self.entity_id)?;
        validate_chunk("procedure", &self.procedure)?;
        validate_tail("responder_id", &self.responder_id)?;

        KeyExpr::new(format!(
            "{}/{}/{}/{}/{}/{}",
            self.realm, KEY_VERSION, self.entity_id, RPC_TAG, self.procedure, self.responder_id
        ))
    }

    /// Recover the components of a concrete request/reply key.
    pub fn parse(key: &KeyExpr) -> Option<Self> {
        let mut chunks = key.as_str().splitn(6, '/');
        let realm = chunks.next()?;
        (chunks.next()? == KEY_VERSION).then_some(())?;
        let entity_id = chunks.next()?;
        (chunks.next()? == RPC_TAG).then_some(())?;
        let procedure = chunks.next()?;
        let responder_id = chunks.next()?;

        let parsed = Self::new(realm, entity_id, procedure, responder_id);
        parsed.to_key().ok()?;
        Some(parsed)
    }
}

/// Build `{realm}/@v0/{entity_id}/pubsub/{subject}/{source_id}`.
pub fn pub_sub_key(realm: &str, entity_id: &str, subject: &str, source_id: &str) -> Result<KeyExpr> {
    PubSubKey::new(realm, entity_id, subject, source_id).to_key()
}

/// Build `{realm}/@v0/{entity_id}/@rpc/{procedure}/{responder_id}`.
pub fn req_rep_key(
    realm: &str,
    entity_id: &str,
    procedure: &str,
    responder_id: &str,
) -> Result<KeyExpr> {
    ReqRepKey::new(realm, entity_id, procedure, responder_id).to_key()
}
