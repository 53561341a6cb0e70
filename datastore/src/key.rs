//! Hierarchical datastore keys.
//!
//! A [`Key`] is a `/`-separated path. Its canonical form starts with `/`,
//! has no empty segments and no trailing `/` (the root is just `/`). The
//! canonical string is also the engine key, so keys order exactly the way
//! the engine orders them during range scans.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use common::BytesRange;

use crate::error::{Error, Result};

const SEPARATOR: char = '/';

/// A canonical hierarchical key.
///
/// Equality and ordering are byte-lexicographic over the canonical form.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(String);

impl Key {
    /// Creates a key from its canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `s` does not start with `/`, contains
    /// an empty segment, or ends with `/` (other than the root).
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        validate(&s)?;
        Ok(Self(s))
    }

    /// Normalizes loose input into a canonical key.
    ///
    /// Adds the leading `/`, collapses repeated separators and drops a
    /// trailing `/`. `Key::clean(k.as_str()) == k` for every key.
    pub fn clean(s: &str) -> Self {
        Self::join(s.split(SEPARATOR).filter(|segment| !segment.is_empty()))
    }

    /// The root key `/`.
    pub fn root() -> Self {
        Self(SEPARATOR.to_string())
    }

    /// Decodes a key read back from the engine.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let s = std::str::from_utf8(raw)
            .map_err(|e| Error::InvalidKey(format!("key is not valid UTF-8: {}", e)))?;
        Self::new(s)
    }

    /// Builds a key from individual segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if a segment is empty or contains `/`.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = Self::root();
        for segment in segments {
            let segment = segment.as_ref();
            if segment.is_empty() || segment.contains(SEPARATOR) {
                return Err(Error::InvalidKey(format!("invalid segment {:?}", segment)));
            }
            key.push(segment);
        }
        Ok(key)
    }

    fn join<'a>(segments: impl Iterator<Item = &'a str>) -> Self {
        let mut key = Self::root();
        for segment in segments {
            key.push(segment);
        }
        key
    }

    fn push(&mut self, segment: &str) {
        if !self.is_root() {
            self.0.push(SEPARATOR);
        }
        self.0.push_str(segment);
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The canonical bytes, exactly as stored in the engine.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }

    /// Iterates the path segments. The root has none.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|segment| !segment.is_empty())
    }

    /// The last segment, or `""` for the root.
    pub fn name(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    /// Appends all segments of `other` below this key.
    pub fn child(&self, other: &Key) -> Self {
        let mut key = self.clone();
        for segment in other.segments() {
            key.push(segment);
        }
        key
    }

    /// The parent key, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let cut = self.0.rfind(SEPARATOR).unwrap_or(0);
        if cut == 0 {
            Some(Self::root())
        } else {
            Some(Self(self.0[..cut].to_string()))
        }
    }

    /// True if `other` lies strictly below this key in the hierarchy.
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        if self == other {
            return false;
        }
        if self.is_root() {
            return true;
        }
        other.0.starts_with(&self.0) && other.0.as_bytes()[self.0.len()] == SEPARATOR as u8
    }

    pub fn is_descendant_of(&self, other: &Key) -> bool {
        other.is_ancestor_of(self)
    }

    /// The engine range covering this key and every key it is a byte-prefix of.
    ///
    /// `/a` covers `/a`, `/ab` and `/a/b` but never `/ac` from `/ab`. The
    /// root covers everything.
    pub fn range(&self) -> BytesRange {
        if self.is_root() {
            BytesRange::unbounded()
        } else {
            BytesRange::prefix(self.to_bytes())
        }
    }
}

fn validate(s: &str) -> Result<()> {
    if !s.starts_with(SEPARATOR) {
        return Err(Error::InvalidKey(format!("{:?} must start with '/'", s)));
    }
    if s.len() > 1 && s.ends_with(SEPARATOR) {
        return Err(Error::InvalidKey(format!("{:?} has a trailing '/'", s)));
    }
    if s.contains("//") {
        return Err(Error::InvalidKey(format!("{:?} has an empty segment", s)));
    }
    Ok(())
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Key {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
