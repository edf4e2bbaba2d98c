//! Version identifier validation.
//!
//! Users type bare dotted versions (`20.11.1`); on disk and on the release
//! server the same version carries a `v` prefix (`v20.11.1`). Validation runs
//! before any I/O and has no side effects.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::errors::NvxError;

/// Longest accepted version argument, in characters.
///
/// Checked before the shape check. This also rejects well-formed versions
/// such as `100.10.10`; keep the bound here and in the test that pins it in
/// sync if it is ever raised.
pub const MAX_VERSION_LEN: usize = 8;

/// Prefix marking a version directory and a release path segment.
pub const DIR_PREFIX: char = 'v';

/// A validated `MAJOR.MINOR.PATCH` runtime version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionId {
    raw: String,
    parsed: Version,
}

impl VersionId {
    /// Validates a user-supplied version argument.
    ///
    /// # Errors
    ///
    /// Returns [`NvxError::InvalidVersionFormat`] if the input is longer than
    /// [`MAX_VERSION_LEN`] characters, or is not three dot-separated groups of
    /// ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, NvxError> {
        if raw.chars().count() > MAX_VERSION_LEN {
            return Err(NvxError::invalid_version(
                raw,
                format!("longer than {MAX_VERSION_LEN} characters"),
            ));
        }

        let shape_error = || NvxError::invalid_version(raw, "expected MAJOR.MINOR.PATCH");

        let groups: Vec<&str> = raw.split('.').collect();
        if groups.len() != 3
            || groups
                .iter()
                .any(|g| g.is_empty() || !g.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(shape_error());
        }

        let mut numbers = [0u64; 3];
        for (slot, group) in numbers.iter_mut().zip(&groups) {
            *slot = group.parse().map_err(|_| shape_error())?;
        }

        Ok(Self {
            raw: raw.to_string(),
            parsed: Version::new(numbers[0], numbers[1], numbers[2]),
        })
    }

    /// Recovers a version from an install directory name such as `v20.11.1`.
    ///
    /// Returns `None` for names that are not version directories.
    #[must_use]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        name.strip_prefix(DIR_PREFIX)
            .and_then(|rest| Self::parse(rest).ok())
    }

    /// The version exactly as the user typed it.
    #[must_use = "returns the version string without side effects"]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Directory and release path segment, e.g. `v20.11.1`.
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{DIR_PREFIX}{}", self.raw)
    }
}

impl FromStr for VersionId {
    type Err = NvxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parsed
            .cmp(&other.parsed)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason_of(input: &str) -> String {
        match VersionId::parse(input) {
            Err(NvxError::InvalidVersionFormat { reason, .. }) => reason,
            other => panic!("expected InvalidVersionFormat for {input:?}, got {other:?}"),
        }
    }

    #[test]
    fn accepts_plain_dotted_versions() {
        for input in ["20.5.1", "0.0.0", "1.2.3", "18.20.4"] {
            let v = VersionId::parse(input).expect("Should accept version");
            assert_eq!(v.as_str(), input);
        }
    }

    #[test]
    fn dir_name_adds_prefix() {
        let v = VersionId::parse("20.11.1").expect("Should accept version");
        assert_eq!(v.dir_name(), "v20.11.1");
        assert_eq!(v.to_string(), "20.11.1");
    }

    #[test]
    fn rejects_wrong_shapes() {
        for input in ["20.5", "20.5.1.2", "v20.5.1", "20.x.1", "", "..", "1..2", " 1.2.3"] {
            assert_eq!(reason_of(input), "expected MAJOR.MINOR.PATCH", "input {input:?}");
        }
    }

    #[test]
    fn rejects_non_ascii_digits() {
        assert_eq!(reason_of("١.٢.٣"), "expected MAJOR.MINOR.PATCH");
    }

    #[test]
    fn length_cap_is_eight_characters() {
        assert_eq!(MAX_VERSION_LEN, 8);
        assert!(VersionId::parse("20.11.10").is_ok());
        assert_eq!(reason_of("20.11.100"), "longer than 8 characters");
    }

    #[test]
    fn length_is_checked_before_shape() {
        assert_eq!(reason_of("not-a-version"), "longer than 8 characters");
    }

    #[test]
    fn long_multi_digit_versions_hit_length_cap() {
        assert!(VersionId::parse("100.0.0").is_ok());
        assert_eq!(reason_of("100.10.10"), "longer than 8 characters");
    }

    #[test]
    fn from_dir_name_requires_prefix() {
        assert_eq!(
            VersionId::from_dir_name("v18.0.0").map(|v| v.to_string()),
            Some("18.0.0".to_string())
        );
        assert!(VersionId::from_dir_name("18.0.0").is_none());
        assert!(VersionId::from_dir_name("current").is_none());
        assert!(VersionId::from_dir_name("vnext").is_none());
    }

    #[test]
    fn ordering_is_numeric() {
        let mut versions: Vec<VersionId> = ["9.0.0", "10.1.0", "10.0.12", "2.3.4"]
            .iter()
            .map(|s| VersionId::parse(s).expect("Should accept version"))
            .collect();
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(VersionId::as_str).collect();
        assert_eq!(sorted, ["2.3.4", "9.0.0", "10.0.12", "10.1.0"]);
    }

    #[test]
    fn leading_zeros_are_accepted_and_preserved() {
        let v = VersionId::parse("01.2.3").expect("Should accept version");
        assert_eq!(v.dir_name(), "v01.2.3");
    }
}
