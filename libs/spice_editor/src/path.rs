//! Hierarchical designator paths.

use std::fmt::Display;
use std::ops::Index;
use std::str::FromStr;

use arcstr::ArcStr;
use itertools::Itertools;

/// Separates the segments of a designator path in its string form.
///
/// For example, `XU1:XDUT:R1` names `R1` inside the subcircuit instantiated
/// by `XDUT`, which is itself inside the subcircuit instantiated by `XU1`.
pub const SUBCIRCUIT_DIVIDER: char = ':';

/// A path of designators resolving through successive subcircuit bodies.
///
/// Segments are compared case-insensitively when resolved against a deck.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct DesignatorPath(Vec<ArcStr>);

impl DesignatorPath {
    /// Creates a path from the given segments.
    pub fn new(segments: impl IntoIterator<Item = impl Into<ArcStr>>) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The empty path, which names the top level of a deck.
    #[inline]
    pub fn root() -> Self {
        Self::default()
    }

    /// The segments of this path.
    #[inline]
    pub fn segments(&self) -> &[ArcStr] {
        &self.0
    }

    /// The number of segments in this path.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if this path has no segments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The last segment of this path.
    #[inline]
    pub fn leaf(&self) -> Option<&ArcStr> {
        self.0.last()
    }

    /// The path with its last segment removed.
    pub fn parent(&self) -> Self {
        self.prefix(self.len().saturating_sub(1))
    }

    /// The first `len` segments of this path.
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.len())].to_vec())
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<ArcStr>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Returns `true` if both paths name the same designators, ignoring case.
    pub fn matches(&self, other: &DesignatorPath) -> bool {
        self.len() == other.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Joins the segments with the given separator.
    pub fn join(&self, sep: &str) -> String {
        self.0.iter().join(sep)
    }
}

impl Index<usize> for DesignatorPath {
    type Output = ArcStr;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl Display for DesignatorPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join(&SUBCIRCUIT_DIVIDER.to_string()))
    }
}

impl FromStr for DesignatorPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&str> for DesignatorPath {
    fn from(value: &str) -> Self {
        Self::new(
            value
                .split(SUBCIRCUIT_DIVIDER)
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        )
    }
}

impl From<&String> for DesignatorPath {
    fn from(value: &String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&[&str]> for DesignatorPath {
    fn from(value: &[&str]) -> Self {
        Self::new(value.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for DesignatorPath {
    fn from(value: [&str; N]) -> Self {
        Self::new(value)
    }
}

impl From<Vec<ArcStr>> for DesignatorPath {
    fn from(value: Vec<ArcStr>) -> Self {
        Self(value)
    }
}

impl From<&DesignatorPath> for DesignatorPath {
    fn from(value: &DesignatorPath) -> Self {
        value.clone()
    }
}
