//! Context URL parsing and path sanitization.
//!
//! Supported input formats:
//!
//! | Format | Example |
//! |--------|---------|
//! | `session@workspace://path` | `laptop@universe://work/acme` |
//! | `workspace://path` | `universe://work/acme` |
//! | `/path` or `path` | `work/acme` (default workspace) |
//!
//! Parsing never touches a [`LayerIndex`](crate::layer_index::LayerIndex);
//! the only layer knowledge here is the fixed list of built-in names, which
//! lets dotted built-ins such as `.trash` survive sanitization.

use std::fmt;
use std::str::FromStr;

use crate::error::TreeError;
use crate::models::is_builtin_name;

/// Workspace used when the input carries no protocol.
pub const DEFAULT_WORKSPACE: &str = "universe";

/// Protocol used when the input carries none.
pub const DEFAULT_PROTOCOL: &str = "universe:";

const BANNED_CHARS: &[char] = &[
    '`', '$', '%', '^', '*', ';', '\'', '"', '<', '>', '{', '}', '[', ']', '\\',
];

/// A parsed, sanitized context URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Url {
    raw: String,
    protocol: String,
    session: Option<String>,
    workspace: String,
    path: String,
    segments: Vec<String>,
}

impl Url {
    /// Validates and parses `raw`.
    pub fn parse(raw: &str) -> Result<Self, TreeError> {
        Self::validate(raw)?;

        let protocol = Self::protocol(raw);
        let scheme = protocol.trim_end_matches(':');
        let (session, workspace) = match scheme.split_once('@') {
            Some((session, workspace)) => (non_empty(session), workspace.to_string()),
            None => (None, scheme.to_string()),
        };
        let workspace = if workspace.is_empty() {
            DEFAULT_WORKSPACE.to_string()
        } else {
            workspace.replace(' ', "_")
        };
        let session = session.map(|s| s.replace(' ', "_"));

        let path = Self::normalize_path(raw);
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            raw: raw.to_string(),
            protocol,
            session,
            workspace,
            path,
            segments,
        })
    }

    /// Rejects empty input and input containing banned characters.
    pub fn validate(raw: &str) -> Result<&str, TreeError> {
        if raw.trim().is_empty() {
            return Err(TreeError::invalid_path(raw, "path must not be empty"));
        }
        if let Some(c) = raw.chars().find(|c| BANNED_CHARS.contains(c)) {
            return Err(TreeError::invalid_path(
                raw,
                format!("unsupported character '{}'", c),
            ));
        }
        Ok(raw)
    }

    /// The lowercased text before the first `:` plus the colon, or
    /// [`DEFAULT_PROTOCOL`]. A colon after the first `/` belongs to the path.
    pub fn protocol(raw: &str) -> String {
        match split_protocol(raw) {
            Some((protocol, _)) => protocol.to_lowercase(),
            None => DEFAULT_PROTOCOL.to_string(),
        }
    }

    /// Sanitizes `raw` into a canonical absolute path. Idempotent.
    pub fn normalize_path(raw: &str) -> String {
        let lowered = raw.to_lowercase().replace('\\', "/");
        let rest = match split_protocol(&lowered) {
            Some((_, rest)) => rest,
            None => lowered.as_str(),
        };
        let cleaned: String = rest
            .chars()
            .filter(|c| !BANNED_CHARS.contains(c))
            .map(|c| if c == ' ' { '_' } else { c })
            .collect();

        let segments: Vec<&str> = cleaned
            .split('/')
            .map(sanitize_segment)
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", segments.join("/"))
        }
    }

    /// Parses `raw` as a standard URL and returns `[host, ...segments]`.
    pub fn segments_from_url(raw: &str) -> Result<Vec<String>, TreeError> {
        let parsed = url::Url::parse(raw)
            .map_err(|e| TreeError::invalid_path(raw, format!("invalid URL: {e}")))?;
        let mut out = Vec::new();
        if let Some(host) = parsed.host_str().filter(|h| !h.is_empty()) {
            out.push(host.to_string());
        }
        if let Some(segments) = parsed.path_segments() {
            out.extend(segments.filter(|s| !s.is_empty()).map(str::to_string));
        }
        Ok(out)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn protocol_str(&self) -> &str {
        &self.protocol
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if this URL's path equals `base` or lies below it.
    pub fn is_within(&self, base: &Url) -> bool {
        self.segments.starts_with(&base.segments)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.trim_start_matches('/');
        match &self.session {
            Some(session) => write!(f, "{}@{}://{}", session, self.workspace, path),
            None => write!(f, "{}://{}", self.workspace, path),
        }
    }
}

impl FromStr for Url {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Url::parse(s)
    }
}

/// Splits `raw` at the protocol colon, if the colon precedes any `/`.
fn split_protocol(raw: &str) -> Option<(&str, &str)> {
    let colon = raw.find(':')?;
    match raw.find('/') {
        Some(slash) if slash < colon => None,
        _ => Some((&raw[..=colon], &raw[colon + 1..])),
    }
}

fn sanitize_segment(segment: &str) -> &str {
    let trimmed = segment.trim();
    if is_builtin_name(trimmed) {
        return trimmed;
    }
    trimmed
        .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
        .trim_end()
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_banned() {
        for bad in ["a`b", "$home", "50%", "x^y", "a*", "a;b", "it's", "\"q\"", "<a>", "{a}", "[a]", "a\\b"] {
            assert!(
                matches!(Url::validate(bad), Err(TreeError::InvalidPath { .. })),
                "expected {:?} to be rejected",
                bad
            );
        }
        assert!(Url::validate("").is_err());
        assert!(Url::validate("work/acme").is_ok());
    }

    #[test]
    fn test_protocol() {
        assert_eq!(Url::protocol("universe://work"), "universe:");
        assert_eq!(Url::protocol("Laptop@Home://work"), "laptop@home:");
        assert_eq!(Url::protocol("/work/acme"), "universe:");
        assert_eq!(Url::protocol("work/a:b"), "universe:");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(Url::normalize_path("universe://Work//Acme/"), "/work/acme");
        assert_eq!(Url::normalize_path("work\\reports with spaces"), "/work/reports_with_spaces");
        assert_eq!(Url::normalize_path("/.hidden/./x"), "/hidden/x");
        assert_eq!(Url::normalize_path("/.trash/x"), "/.trash/x");
        assert_eq!(Url::normalize_path("a<b>/c"), "/ab/c");
        assert_eq!(Url::normalize_path(""), "/");
        assert_eq!(Url::normalize_path("universe://"), "/");
        assert_eq!(Url::normalize_path("///"), "/");
    }

    #[test]
    fn test_normalize_path_idempotent() {
        let inputs = [
            "universe://Work//Acme/",
            "work\\reports with spaces",
            "  . .odd/\t.tab/..dots",
            "/.trash/x",
            "laptop@universe://work/a:b",
            "c:/windows/system32",
            "..",
            "mixed CASE/Path",
        ];
        for input in inputs {
            let once = Url::normalize_path(input);
            assert_eq!(Url::normalize_path(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_parse_full_format() {
        let url = Url::parse("my-laptop@universe://work/acme/devops/jira-1234").unwrap();
        assert_eq!(url.session(), Some("my-laptop"));
        assert_eq!(url.workspace(), "universe");
        assert_eq!(url.path(), "/work/acme/devops/jira-1234");
        assert_eq!(url.segments(), ["work", "acme", "devops", "jira-1234"]);
        assert_eq!(url.to_string(), "my-laptop@universe://work/acme/devops/jira-1234");
    }

    #[test]
    fn test_parse_simple_path() {
        let url: Url = "work/reports".parse().unwrap();
        assert_eq!(url.session(), None);
        assert_eq!(url.workspace(), DEFAULT_WORKSPACE);
        assert_eq!(url.protocol_str(), DEFAULT_PROTOCOL);
        assert_eq!(url.path(), "/work/reports");
        assert_eq!(url.to_string(), "universe://work/reports");
        assert!(!url.is_root());
        assert!(Url::parse("/").unwrap().is_root());
    }

    #[test]
    fn test_is_within() {
        let base = Url::parse("/work").unwrap();
        assert!(Url::parse("/work/acme").unwrap().is_within(&base));
        assert!(Url::parse("/work").unwrap().is_within(&base));
        assert!(!Url::parse("/workshop").unwrap().is_within(&base));
    }

    #[test]
    fn test_segments_from_url() {
        assert_eq!(
            Url::segments_from_url("https://example.com/docs//guide/").unwrap(),
            vec!["example.com", "docs", "guide"]
        );
        assert!(matches!(
            Url::segments_from_url("not a url"),
            Err(TreeError::InvalidPath { .. })
        ));
    }
}
