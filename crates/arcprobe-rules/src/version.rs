//! Comparable firmware versions and build dates
//!
//! Version strings follow PEP 440 ordering: epoch, release, pre-release, post-release,
//! dev release and local label. Anything that is not PEP 440 (Marlin's
//! `bugfix-2.0.x`, for example) becomes a legacy version, which sorts before every
//! PEP 440 version and compares case-insensitively among other legacy versions.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

const VERSION_PATTERN: &str = r"(?ix)^
    v?
    (?:(?P<epoch>[0-9]+)!)?
    (?P<release>[0-9]+(?:\.[0-9]+)*)
    (?P<pre>[-_.]?(?P<pre_l>alpha|a|beta|b|preview|pre|rc|c)[-_.]?(?P<pre_n>[0-9]+)?)?
    (?P<post>(?:-(?P<post_n1>[0-9]+))|(?:[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?))?
    (?P<dev>[-_.]?dev[-_.]?(?P<dev_n>[0-9]+)?)?
    (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
$";

/// Date formats accepted for build dates, tried in order
pub const DATE_FORMATS: [&str; 2] = ["%b %d %Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Date-only formats, interpreted as midnight
pub const DATE_ONLY_FORMATS: [&str; 2] = ["%b %d %Y", "%Y-%m-%d"];

fn version_regex() -> &'static Regex {
    static VERSION_REGEX: OnceLock<Regex> = OnceLock::new();
    VERSION_REGEX.get_or_init(|| Regex::new(VERSION_PATTERN).expect("invalid regex pattern"))
}

/// Pre-release phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreRelease {
    Alpha,
    Beta,
    ReleaseCandidate,
}

impl PreRelease {
    fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "a" | "alpha" => Self::Alpha,
            "b" | "beta" => Self::Beta,
            _ => Self::ReleaseCandidate,
        }
    }
}

/// One segment of a local version label
///
/// Numeric segments sort above alphanumeric ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LocalSegment {
    Text(String),
    Number(u64),
}

/// A PEP 440 version
#[derive(Debug, Clone)]
pub struct ReleaseVersion {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PreRelease, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Option<Vec<LocalSegment>>,
}

// Field order gives the comparison precedence.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    DevOnly,
    Pre(PreRelease, u64),
    Final,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum DevKey {
    Dev(u64),
    Final,
}

impl ReleaseVersion {
    fn parse(text: &str) -> Option<Self> {
        let caps = version_regex().captures(text)?;
        let number = |name: &str| -> Option<Option<u64>> {
            match caps.name(name) {
                Some(m) => m.as_str().parse::<u64>().ok().map(Some),
                None => Some(None),
            }
        };

        let epoch = number("epoch")?.unwrap_or(0);
        let release = caps
            .name("release")?
            .as_str()
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => Some((
                PreRelease::from_label(label.as_str()),
                number("pre_n")?.unwrap_or(0),
            )),
            None => None,
        };

        let post = if caps.name("post").is_some() {
            Some(number("post_n1")?.or(number("post_n2")?).unwrap_or(0))
        } else {
            None
        };

        let dev = if caps.name("dev").is_some() {
            Some(number("dev_n")?.unwrap_or(0))
        } else {
            None
        };

        let local = caps.name("local").map(|m| {
            m.as_str()
                .split(['-', '_', '.'])
                .map(|segment| match segment.parse::<u64>() {
                    Ok(n) if segment.bytes().all(|b| b.is_ascii_digit()) => {
                        LocalSegment::Number(n)
                    }
                    _ => LocalSegment::Text(segment.to_ascii_lowercase()),
                })
                .collect()
        });

        Some(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    /// Release components without trailing zeros, so `2.0` equals `2.0.0`
    fn trimmed_release(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|&part| part != 0)
            .map_or(0, |i| i + 1);
        &self.release[..end]
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (None, _, _) => PreKey::Final,
            (Some((phase, n)), _, _) => PreKey::Pre(phase, n),
        }
    }

    fn dev_key(&self) -> DevKey {
        self.dev.map_or(DevKey::Final, DevKey::Dev)
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.trimmed_release().cmp(other.trimmed_release()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReleaseVersion {}

/// A comparable firmware version
#[derive(Debug, Clone)]
pub enum Version {
    /// Not PEP 440; compared by lowercased text
    Legacy(String),
    /// PEP 440 version
    Release(ReleaseVersion),
}

impl Version {
    /// Parse a version string
    ///
    /// Returns `None` only for empty input; anything that is not PEP 440 is a
    /// legacy version.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(match ReleaseVersion::parse(text) {
            Some(version) => Self::Release(version),
            None => Self::Legacy(text.to_lowercase()),
        })
    }

    /// True if this version did not follow PEP 440
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Legacy(a), Self::Legacy(b)) => a.cmp(b),
            (Self::Legacy(_), Self::Release(_)) => Ordering::Less,
            (Self::Release(_), Self::Legacy(_)) => Ordering::Greater,
            (Self::Release(a), Self::Release(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Parse a firmware build date
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_ONLY_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
