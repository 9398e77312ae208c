//! Path addresses for locating values across backing stores
//!
//! Provides [`PathAddress`]: a storage [`Location`] plus up to
//! [`TERMINAL_DEPTH`] dot-separated [`Fragment`]s.

use crate::error::{PathError, PathResult};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Number of fragments that identify a concrete value
pub const TERMINAL_DEPTH: usize = 4;

/// Separates the location from the fragments
pub const LOCATION_SEPARATOR: char = '#';

/// Separates fragments from each other
pub const FRAGMENT_SEPARATOR: char = '.';

/// Inline fragment storage (never more than the terminal depth)
pub type Fragments = SmallVec<[Fragment; TERMINAL_DEPTH]>;

/// Storage identifier preceding the `#`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// In-memory table, readable without I/O
    Static,
    /// Metadata scoped to the current page
    Page,
    /// Metadata scoped to the current document
    Document,
}

impl Location {
    /// Every known location
    pub const ALL: [Location; 3] = [Location::Static, Location::Page, Location::Document];

    /// Identifier used in path strings
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Page => "page",
            Self::Document => "document",
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "page" => Ok(Self::Page),
            "document" => Ok(Self::Document),
            other => Err(PathError::UnknownLocation(other.to_string())),
        }
    }
}

/// One segment of a path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fragment {
    /// Opaque key
    Key(String),
    /// `*`: expand one level
    Wildcard,
    /// `**`: expand down to the terminal depth
    Recursive,
}

impl Fragment {
    /// Create a key fragment
    #[inline]
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    /// Check for `*` or `**`
    #[inline]
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard | Self::Recursive)
    }

    /// Key text, if this is not a wildcard
    #[inline]
    #[must_use]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => Some(key),
            Self::Wildcard | Self::Recursive => None,
        }
    }
}

impl Display for Fragment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Wildcard => f.write_str("*"),
            Self::Recursive => f.write_str("**"),
        }
    }
}

/// Split a path string into its location and fragments
///
/// # Errors
/// - `PathError::Syntax` unless the string contains exactly one `#`
/// - `PathError::UnknownLocation` for an unrecognised location
/// - `PathError::EmptyFragment`, `TooDeep`, `WildcardNotLast` for bad fragments
pub fn parse(path: &str) -> PathResult<(Location, Fragments)> {
    let mut parts = path.split(LOCATION_SEPARATOR);
    let (Some(location), Some(rest), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(PathError::Syntax {
            path: path.to_string(),
            reason: "expected exactly one '#' separator".into(),
        });
    };

    let location = location.parse::<Location>()?;
    let fragments = rest
        .split(FRAGMENT_SEPARATOR)
        .map(|seg| match seg {
            "" => Err(PathError::EmptyFragment(path.to_string())),
            "*" => Ok(Fragment::Wildcard),
            "**" => Ok(Fragment::Recursive),
            key => Ok(Fragment::Key(key.to_string())),
        })
        .collect::<PathResult<Fragments>>()?;

    validate(path, &fragments)?;
    Ok((location, fragments))
}

fn validate(path: &str, fragments: &[Fragment]) -> PathResult<()> {
    if fragments.is_empty() {
        return Err(PathError::Syntax {
            path: path.to_string(),
            reason: "no fragments after location".into(),
        });
    }
    if fragments.len() > TERMINAL_DEPTH {
        return Err(PathError::TooDeep {
            path: path.to_string(),
            depth: fragments.len(),
            max: TERMINAL_DEPTH,
        });
    }
    let last = fragments.len() - 1;
    if fragments[..last].iter().any(Fragment::is_wildcard) {
        return Err(PathError::WildcardNotLast(path.to_string()));
    }
    for fragment in fragments {
        if let Fragment::Key(key) = fragment {
            if key.is_empty() {
                return Err(PathError::EmptyFragment(path.to_string()));
            }
            if key.contains([LOCATION_SEPARATOR, FRAGMENT_SEPARATOR]) {
                return Err(PathError::Syntax {
                    path: path.to_string(),
                    reason: format!("fragment '{key}' contains a separator"),
                });
            }
        }
    }
    Ok(())
}

/// Parsed `location#frag.frag.frag.frag` address
///
/// # Invariants
/// - 1 to [`TERMINAL_DEPTH`] fragments
/// - only the last fragment may be a wildcard
/// - key fragments are non-empty and contain neither `.` nor `#`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathAddress {
    location: Location,
    fragments: Fragments,
}

impl PathAddress {
    /// Build an address from parts
    ///
    /// # Errors
    /// Returns error if the fragments violate the address invariants
    pub fn new(location: Location, fragments: impl IntoIterator<Item = Fragment>) -> PathResult<Self> {
        let fragments: Fragments = fragments.into_iter().collect();
        let rendered = render(location, &fragments);
        validate(&rendered, &fragments)?;
        Ok(Self {
            location,
            fragments,
        })
    }

    /// Build an address from plain keys
    ///
    /// # Errors
    /// Returns error if the keys violate the address invariants
    pub fn from_keys<I, S>(location: Location, keys: I) -> PathResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(location, keys.into_iter().map(|k| Fragment::Key(k.into())))
    }

    /// Storage location
    #[inline]
    #[must_use]
    pub fn location(&self) -> Location {
        self.location
    }

    /// All fragments, including a trailing wildcard
    #[inline]
    #[must_use]
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Key fragments, excluding a trailing wildcard
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.fragments.iter().filter_map(Fragment::as_key).collect()
    }

    /// Number of fragments
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.fragments.len()
    }

    /// Trailing wildcard, if any
    #[inline]
    #[must_use]
    pub fn wildcard(&self) -> Option<&Fragment> {
        self.fragments.last().filter(|f| f.is_wildcard())
    }

    /// Addresses a concrete value (four keys, no wildcard)
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.fragments.len() == TERMINAL_DEPTH && self.wildcard().is_none()
    }

    /// Address one level up, or `None` at the first level
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.fragments.len() <= 1 {
            return None;
        }
        let mut fragments = self.fragments.clone();
        fragments.pop();
        Some(Self {
            location: self.location,
            fragments,
        })
    }

    /// Append a key
    ///
    /// # Errors
    /// Returns error if the address already ends in a wildcard or is terminal
    pub fn child(&self, key: impl Into<String>) -> PathResult<Self> {
        self.push(Fragment::Key(key.into()))
    }

    /// Append a wildcard
    ///
    /// # Errors
    /// Returns error if the address already ends in a wildcard or is terminal
    pub fn with_wildcard(&self, wildcard: Fragment) -> PathResult<Self> {
        self.push(wildcard)
    }

    /// Same address with any trailing wildcard removed
    #[must_use]
    pub fn base(&self) -> Self {
        let mut fragments = self.fragments.clone();
        if fragments.last().is_some_and(Fragment::is_wildcard) {
            fragments.pop();
        }
        Self {
            location: self.location,
            fragments,
        }
    }

    /// Full path string for a dotted key path under this location
    #[must_use]
    pub fn qualify(&self, dotted: &str) -> String {
        format!("{}{LOCATION_SEPARATOR}{dotted}", self.location)
    }

    fn push(&self, fragment: Fragment) -> PathResult<Self> {
        let mut fragments = self.fragments.clone();
        fragments.push(fragment);
        Self::new(self.location, fragments)
    }
}

fn render(location: Location, fragments: &[Fragment]) -> String {
    let joined = fragments
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".");
    format!("{location}{LOCATION_SEPARATOR}{joined}")
}

impl Display for PathAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self.location, &self.fragments))
    }
}

impl FromStr for PathAddress {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (location, fragments) = parse(s)?;
        Ok(Self {
            location,
            fragments,
        })
    }
}

impl TryFrom<String> for PathAddress {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PathAddress> for String {
    fn from(path: PathAddress) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_terminal_path() {
        let (location, fragments) = parse("static#a.b.c.d").unwrap();
        assert_eq!(location, Location::Static);
        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments[3], Fragment::key("d"));
    }

    #[test]
    fn parse_requires_one_separator() {
        assert!(matches!(parse("static.a.b"), Err(PathError::Syntax { .. })));
        assert!(matches!(parse("static#a#b"), Err(PathError::Syntax { .. })));
    }

    #[test]
    fn parse_unknown_location() {
        let result = parse("remote#a.b.c.d");
        assert_eq!(result.unwrap_err(), PathError::UnknownLocation("remote".into()));
    }

    #[test]
    fn parse_empty_fragment() {
        assert!(matches!(parse("page#a..c.d"), Err(PathError::EmptyFragment(_))));
        assert!(matches!(parse("page#"), Err(PathError::EmptyFragment(_))));
    }

    #[test]
    fn parse_too_deep() {
        let result = parse("page#a.b.c.d.e");
        assert!(matches!(result, Err(PathError::TooDeep { depth: 5, .. })));
    }

    #[test]
    fn parse_wildcards() {
        let (_, fragments) = parse("document#a.b.*").unwrap();
        assert_eq!(fragments[2], Fragment::Wildcard);

        let (_, fragments) = parse("document#a.**").unwrap();
        assert_eq!(fragments[1], Fragment::Recursive);
    }

    #[test]
    fn wildcard_must_be_last() {
        let result = parse("static#a.*.c");
        assert!(matches!(result, Err(PathError::WildcardNotLast(_))));
    }

    #[test]
    fn address_accessors() {
        let path: PathAddress = "static#x.y.z.w".parse().unwrap();
        assert!(path.is_terminal());
        assert_eq!(path.depth(), 4);
        assert_eq!(path.keys(), vec!["x", "y", "z", "w"]);
        assert!(path.wildcard().is_none());
    }

    #[test]
    fn address_parent_and_child() {
        let path: PathAddress = "page#a.b.c".parse().unwrap();
        let child = path.child("d").unwrap();
        assert_eq!(child.to_string(), "page#a.b.c.d");
        assert_eq!(child.parent().unwrap(), path);

        // Terminal addresses cannot grow
        assert!(child.child("e").is_err());
    }

    #[test]
    fn address_wildcard_and_base() {
        let path: PathAddress = "page#a.b".parse().unwrap();
        let expanded = path.with_wildcard(Fragment::Recursive).unwrap();
        assert_eq!(expanded.to_string(), "page#a.b.**");
        assert_eq!(expanded.wildcard(), Some(&Fragment::Recursive));
        assert_eq!(expanded.base(), path);
        assert!(!expanded.is_terminal());
    }

    #[test]
    fn address_rejects_separator_in_key() {
        let result = PathAddress::from_keys(Location::Page, ["a.b", "c"]);
        assert!(matches!(result, Err(PathError::Syntax { .. })));
    }

    #[test]
    fn address_display_round_trip() {
        let text = "document#a.b.c.d";
        let path: PathAddress = text.parse().unwrap();
        assert_eq!(path.to_string(), text);
    }

    #[test]
    fn address_serde_as_string() {
        let path: PathAddress = "static#a.b.*".parse().unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"static#a.b.*\"");
        let back: PathAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn qualify_prefixes_location() {
        let path: PathAddress = "static#x.y.*".parse().unwrap();
        assert_eq!(path.qualify("x.y.z"), "static#x.y.z");
    }
}
