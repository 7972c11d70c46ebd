//! Slash-separated locations in the tree

use std::fmt;

use crate::error::{MemoryError, Result};

/// Segment reserved for server-provided data such as the connection flag
pub const INFO_SEGMENT: &str = ".info";

const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']', '/'];

/// A location in the database, as a list of keys from the root
///
/// Parsing is lenient: empty segments are skipped, so `"/a//b/"` and `"a/b"`
/// name the same location. Key validation happens on write.
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(path: &str) -> Self {
        Self {
            segments: split(path),
        }
    }

    /// Location `relative` below this one.
    pub fn child(&self, relative: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(split(relative));
        Self { segments }
    }

    /// Parent location, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// Last segment, `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `other` is this location or lies below it.
    pub fn contains(&self, other: &Path) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Whether a change at one location can affect the other.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// Whether the location is server data below `.info`.
    pub fn is_info(&self) -> bool {
        self.segments.first().map_or(false, |s| s == INFO_SEGMENT)
    }

    /// Check every segment is a key a client may write to.
    pub fn validate(&self) -> Result<()> {
        self.segments.iter().try_for_each(|s| validate_key(s))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Check a single key for forbidden characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(FORBIDDEN) || key.chars().any(char::is_control) {
        return Err(MemoryError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn split(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
