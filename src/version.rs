//! Version range resolution
//!
//! npm writes ranges in its own dialect: a bare `1.2.3` is exact, comparators
//! are separated by spaces, `||` joins alternatives and `a - b` is a hyphen
//! range. Each alternative is translated into a [`semver::VersionReq`], and
//! the highest available version matching any alternative wins.
//!
//! ```
//! use levitate_pull::version::max_satisfying;
//!
//! let versions = ["1.0.0", "1.4.2", "2.0.0"];
//! assert_eq!(max_satisfying(versions, "^1.0.0").unwrap(), Some("1.4.2".to_string()));
//! ```
//!
//! Pre-release versions follow semver precedence: they only match a
//! comparator that names the same `major.minor.patch` with a pre-release tag.

use semver::{Version, VersionReq};

use crate::core::error::{PullError, Result};

/// A parsed npm range: a disjunction of semver requirements.
#[derive(Debug, Clone)]
pub struct Range {
    alternatives: Vec<VersionReq>,
}

impl Range {
    /// Parse an npm range expression.
    ///
    /// Empty strings, `*`, `x` and `latest` match every release.
    pub fn parse(range: &str) -> Result<Self> {
        let alternatives = range
            .split("||")
            .map(|alt| parse_req(range, &translate(alt)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { alternatives })
    }

    /// Check whether a version satisfies any alternative.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Select the highest version in `available` satisfying `range`.
///
/// Returns `Ok(None)` if nothing matches, and an error if the range itself
/// cannot be parsed. Versions that are not valid semver are ignored. The
/// result does not depend on the order of `available`.
pub fn max_satisfying<I, S>(available: I, range: &str) -> Result<Option<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let range = Range::parse(range)?;

    let mut best: Option<(Version, String)> = None;
    for candidate in available {
        let candidate = candidate.as_ref();
        let Some(version) = parse_version(candidate) else {
            continue;
        };
        if !range.matches(&version) {
            continue;
        }
        // Equal precedence ties go to the smaller string so input order never matters
        let better = match &best {
            Some((current, original)) => {
                version > *current || (version == *current && candidate < original.as_str())
            }
            None => true,
        };
        if better {
            best = Some((version, candidate.to_string()));
        }
    }

    Ok(best.map(|(_, original)| original))
}

/// Like [`max_satisfying`], but a miss is a `NotFound` error naming the package.
pub fn resolve<I, S>(package: &str, available: I, range: &str) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    max_satisfying(available, range)?.ok_or_else(|| {
        PullError::NotFound(format!("no version of {} satisfies '{}'", package, range))
    })
}

/// Parse a published version, tolerating a `v` prefix and missing components.
pub fn parse_version(version: &str) -> Option<Version> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    Version::parse(version)
        .or_else(|_| Version::parse(&pad_version(version)))
        .ok()
}

/// Pad a version string to be semver-compatible (X.Y.Z)
fn pad_version(version: &str) -> String {
    let parts: Vec<&str> = version.split('.').collect();
    match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => version.to_string(),
    }
}

fn parse_req(range: &str, req: &str) -> Result<VersionReq> {
    VersionReq::parse(req).map_err(|e| PullError::InvalidRange {
        range: range.to_string(),
        message: e.to_string(),
    })
}

/// Translate one npm alternative into semver crate syntax.
fn translate(alternative: &str) -> String {
    let alternative = alternative.trim();
    if is_any(alternative) {
        return "*".to_string();
    }

    // Hyphen range: "1.2.3 - 2.3.4" means ">=1.2.3, <=2.3.4"
    if let Some((low, high)) = alternative.split_once(" - ") {
        return format!(">={}, <={}", strip_v(low.trim()), strip_v(high.trim()));
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in alternative.split_whitespace() {
        if is_operator(token) {
            // ">= 1.2.3" with the operator split off
            pending_op = Some(token);
            continue;
        }
        let comparator = match pending_op.take() {
            Some(op) => format!("{}{}", op, strip_v(token)),
            None => normalize_comparator(token),
        };
        comparators.push(comparator);
    }

    if comparators.is_empty() {
        return "*".to_string();
    }
    comparators.join(", ")
}

fn normalize_comparator(token: &str) -> String {
    let op_len = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '^' | '~'))
        .unwrap_or(token.len());
    let (op, version) = token.split_at(op_len);
    let version = strip_v(version);

    if op.is_empty() {
        if is_any(version) {
            return "*".to_string();
        }
        if is_wildcard(version) {
            return truncate_wildcard(version);
        }
        // A bare version is exact in npm, caret in the semver crate
        return format!("={}", version);
    }

    // "~>" is accepted by npm as an alias of "~"; "==" as "="
    let op = match op {
        "~>" => "~",
        "==" => "=",
        other => other,
    };
    format!("{}{}", op, version)
}

fn is_operator(token: &str) -> bool {
    matches!(token, "<" | ">" | "<=" | ">=" | "=" | "==" | "^" | "~" | "~>")
}

fn is_any(s: &str) -> bool {
    matches!(s, "" | "*" | "x" | "X" | "latest")
}

fn is_wildcard(version: &str) -> bool {
    version.split('.').any(is_wild_part)
}

fn is_wild_part(part: &str) -> bool {
    matches!(part, "x" | "X" | "*")
}

/// Everything from the first wildcard part on is free: `1.x.x` is `1.*`, `x.x` is `*`.
fn truncate_wildcard(version: &str) -> String {
    let fixed: Vec<&str> = version
        .split('.')
        .take_while(|part| !is_wild_part(part))
        .collect();
    if fixed.is_empty() {
        "*".to_string()
    } else {
        format!("{}.*", fixed.join("."))
    }
}

fn strip_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn best(versions: &[&str], range: &str) -> Option<String> {
        max_satisfying(versions.iter().copied(), range).unwrap()
    }

    const VERSIONS: &[&str] = &[
        "0.9.0", "1.0.0", "1.2.0", "1.2.5", "1.3.0-beta.1", "1.3.0", "2.0.0-rc.1", "2.0.0",
        "2.1.0",
    ];

    // ==================== Range forms ====================

    #[test]
    fn test_caret_range() {
        assert_eq!(best(VERSIONS, "^1.0.0").as_deref(), Some("1.3.0"));
        assert_eq!(best(VERSIONS, "^2.0.0").as_deref(), Some("2.1.0"));
    }

    #[test]
    fn test_caret_zero_major() {
        assert_eq!(best(&["0.2.3", "0.2.9", "0.3.0"], "^0.2.3").as_deref(), Some("0.2.9"));
    }

    #[test]
    fn test_tilde_range() {
        assert_eq!(best(VERSIONS, "~1.2.0").as_deref(), Some("1.2.5"));
        assert_eq!(best(VERSIONS, "~>1.2.0").as_deref(), Some("1.2.5"));
    }

    #[test]
    fn test_bare_version_is_exact() {
        assert_eq!(best(VERSIONS, "1.2.0").as_deref(), Some("1.2.0"));
        assert_eq!(best(VERSIONS, "1.2.1"), None);
    }

    #[test]
    fn test_partial_bare_version() {
        assert_eq!(best(VERSIONS, "1.2").as_deref(), Some("1.2.5"));
        assert_eq!(best(VERSIONS, "1").as_deref(), Some("1.3.0"));
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(best(VERSIONS, "*").as_deref(), Some("2.1.0"));
        assert_eq!(best(VERSIONS, "").as_deref(), Some("2.1.0"));
        assert_eq!(best(VERSIONS, "1.x").as_deref(), Some("1.3.0"));
        assert_eq!(best(VERSIONS, "1.2.x").as_deref(), Some("1.2.5"));
    }

    #[test]
    fn test_all_wildcard_forms_match_anything() {
        for range in ["x.x", "x.x.x", "X.x", "*.*.*", "*.x"] {
            assert_eq!(best(VERSIONS, range).as_deref(), Some("2.1.0"), "range {}", range);
        }
        assert_eq!(best(VERSIONS, "1.x.x").as_deref(), Some("1.3.0"));
        assert_eq!(best(VERSIONS, "1.*.*").as_deref(), Some("1.3.0"));
    }

    #[test]
    fn test_space_separated_comparators() {
        assert_eq!(best(VERSIONS, ">=1.0.0 <1.3.0").as_deref(), Some("1.2.5"));
        assert_eq!(best(VERSIONS, ">= 1.0.0 < 1.3.0").as_deref(), Some("1.2.5"));
    }

    #[test]
    fn test_or_alternatives() {
        assert_eq!(best(VERSIONS, "^0.9.0 || ~1.2.0").as_deref(), Some("1.2.5"));
        assert_eq!(best(VERSIONS, "1.0.0 || 2.0.0").as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_hyphen_range() {
        assert_eq!(best(VERSIONS, "1.0.0 - 1.2.5").as_deref(), Some("1.2.5"));
        assert_eq!(best(VERSIONS, "1.0.0 - 1.2").as_deref(), Some("1.2.5"));
    }

    #[test]
    fn test_v_prefix_accepted() {
        assert_eq!(best(VERSIONS, "v1.2.0").as_deref(), Some("1.2.0"));
        assert_eq!(best(&["v3.1.0"], "^3.0.0").as_deref(), Some("v3.1.0"));
    }

    // ==================== Pre-releases ====================

    #[test]
    fn test_prerelease_excluded_by_default() {
        assert_eq!(best(&["1.0.0", "1.1.0-beta.1"], "^1.0.0").as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_prerelease_when_requested() {
        assert_eq!(
            best(VERSIONS, ">=2.0.0-rc.1 <2.0.0").as_deref(),
            Some("2.0.0-rc.1")
        );
        assert_eq!(best(VERSIONS, "1.3.0-beta.1").as_deref(), Some("1.3.0-beta.1"));
    }

    #[test]
    fn test_release_beats_prerelease_of_same_triple() {
        assert_eq!(best(&["1.3.0-beta.1", "1.3.0"], ">=1.3.0-beta.1").as_deref(), Some("1.3.0"));
    }

    // ==================== Properties ====================

    #[test]
    fn test_order_independent() {
        let mut shuffled: Vec<&str> = VERSIONS.to_vec();
        shuffled.reverse();
        shuffled.swap(0, 4);
        for range in ["^1.0.0", "~1.2.0", "*", ">=0.9.0 <2.0.0", "2.0.0"] {
            assert_eq!(best(VERSIONS, range), best(&shuffled, range), "range {}", range);
        }
    }

    #[test]
    fn test_equal_precedence_tie_is_order_independent() {
        assert_eq!(best(&["v1.0.0", "1.0.0"], "^1.0.0").as_deref(), Some("1.0.0"));
        assert_eq!(best(&["1.0.0", "v1.0.0"], "^1.0.0").as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_no_match() {
        assert_eq!(best(VERSIONS, "^3.0.0"), None);
        assert_eq!(best(&[], "*"), None);
    }

    #[test]
    fn test_invalid_versions_ignored() {
        assert_eq!(best(&["not-a-version", "1.0.0"], "*").as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_invalid_range_is_error() {
        let result = max_satisfying(VERSIONS.iter().copied(), "github:user/repo");
        assert!(matches!(result, Err(PullError::InvalidRange { .. })));
    }

    #[test]
    fn test_resolve_not_found() {
        let err = resolve("leftpad", ["1.0.0"], "^2.0.0").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("leftpad"));
    }

    #[test]
    fn test_pad_version() {
        assert_eq!(pad_version("1"), "1.0.0");
        assert_eq!(pad_version("1.2"), "1.2.0");
        assert_eq!(pad_version("1.2.3"), "1.2.3");
    }
}
