use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

type SliceCache = Mutex<HashMap<usize, Arc<HashString>>>;

/// Immutable text with a precomputed hash.
///
/// Expression operands are compared against literal names on every evaluation,
/// so the hash is computed once at construction and checked before the bytes.
/// Prefix and suffix views returned by [`left()`](Self::left) and
/// [`mid()`](Self::mid) are memoized: repeated calls with the same argument
/// return the same shared instance for as long as the parent lives.
///
/// All indices count characters, not bytes.
pub struct HashString {
    text: String,
    hash: u32,
    left: SliceCache,
    mid: SliceCache,
}

impl HashString {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = compute_hash(text.as_bytes());
        Self {
            text,
            hash,
            left: Mutex::default(),
            mid: Mutex::default(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The precomputed hash of the text.
    #[must_use]
    pub fn hash_value(&self) -> u32 {
        self.hash
    }

    /// Length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The first `n` characters. Clamps to the whole string when `n` exceeds
    /// the length.
    #[must_use]
    pub fn left(&self, n: usize) -> Arc<HashString> {
        cached_slice(&self.left, n, || self.text.chars().take(n).collect())
    }

    /// Everything from character `index` on. Empty when `index` is past the end.
    #[must_use]
    pub fn mid(&self, index: usize) -> Arc<HashString> {
        cached_slice(&self.mid, index, || self.text.chars().skip(index).collect())
    }

    /// Character index of the first occurrence of `c`.
    #[must_use]
    pub fn find(&self, c: char) -> Option<usize> {
        self.text.chars().position(|ch| ch == c)
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.text.starts_with(prefix)
    }

    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    /// Split at the first `.` into `(head, rest)`, both memoized.
    #[must_use]
    pub fn split_first_dot(&self) -> Option<(Arc<HashString>, Arc<HashString>)> {
        let pos = self.find('.')?;
        Some((self.left(pos), self.mid(pos + 1)))
    }
}

fn cached_slice(cache: &SliceCache, key: usize, make: impl FnOnce() -> String) -> Arc<HashString> {
    let mut slices = cache.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(
        slices
            .entry(key)
            .or_insert_with(|| Arc::new(HashString::new(make()))),
    )
}

/// Classic ELF-style string hash over the raw bytes.
pub(crate) fn compute_hash(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |h, &b| {
        let mut h = (h << 4).wrapping_add(u32::from(b));
        let g = h & 0xf000_0000;
        if g != 0 {
            h ^= g >> 24;
        }
        h & !g
    })
}

impl Clone for HashString {
    fn clone(&self) -> Self {
        Self {
            text: self.text.clone(),
            hash: self.hash,
            left: Mutex::default(),
            mid: Mutex::default(),
        }
    }
}

impl Default for HashString {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl PartialEq for HashString {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.text == other.text
    }
}

impl Eq for HashString {}

impl PartialEq<str> for HashString {
    fn eq(&self, other: &str) -> bool {
        self.text.len() == other.len()
            && self.hash == compute_hash(other.as_bytes())
            && self.text == other
    }
}

impl PartialEq<&str> for HashString {
    fn eq(&self, other: &&str) -> bool {
        *self == **other
    }
}

// Hashes the text, not the precomputed value, so `Borrow<str>` lookups agree.
impl Hash for HashString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl Borrow<str> for HashString {
    fn borrow(&self) -> &str {
        &self.text
    }
}

impl AsRef<str> for HashString {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl From<&str> for HashString {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for HashString {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for HashString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for HashString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.text)
    }
}
