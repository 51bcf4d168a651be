//! Status filters for status handlers.
//!
//! A filter is a list of entries; each entry is an exact code or a range tag:
//!
//! | Tag | Codes |
//! |---|---|
//! | `*` | all |
//! | `info` | 100–199 |
//! | `success` | 200–299 |
//! | `redirect` | 300–399 |
//! | `client-error` | 400–499 |
//! | `server-error` | 500–599 |
//! | `error` | 400–599 |
//!
//! ```rust
//! use waypost::{StatusFilter, StatusRange};
//!
//! let filter: StatusFilter = "404, server-error".parse().unwrap();
//! assert!(filter.matches(http::StatusCode::BAD_GATEWAY));
//! assert!(StatusFilter::from(StatusRange::Any).matches(http::StatusCode::OK));
//! ```

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use http::StatusCode;

use crate::error::Error;

/// A named status range.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StatusRange {
    Any,
    Info,
    Success,
    Redirect,
    ClientError,
    ServerError,
    Error,
}

impl StatusRange {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any         => "*",
            Self::Info        => "info",
            Self::Success     => "success",
            Self::Redirect    => "redirect",
            Self::ClientError => "client-error",
            Self::ServerError => "server-error",
            Self::Error       => "error",
        }
    }

    fn codes(self) -> RangeInclusive<u16> {
        match self {
            Self::Any         => 0..=u16::MAX,
            Self::Info        => 100..=199,
            Self::Success     => 200..=299,
            Self::Redirect    => 300..=399,
            Self::ClientError => 400..=499,
            Self::ServerError => 500..=599,
            Self::Error       => 400..=599,
        }
    }

    pub fn contains(self, status: StatusCode) -> bool {
        self.codes().contains(&status.as_u16())
    }
}

impl FromStr for StatusRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*"            => Ok(Self::Any),
            "info"         => Ok(Self::Info),
            "success"      => Ok(Self::Success),
            "redirect"     => Ok(Self::Redirect),
            "client-error" => Ok(Self::ClientError),
            "server-error" => Ok(Self::ServerError),
            "error"        => Ok(Self::Error),
            _              => Err(Error::InvalidStatusFilter(s.to_owned())),
        }
    }
}

impl fmt::Display for StatusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filter entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusMatch {
    Code(StatusCode),
    Range(StatusRange),
}

impl StatusMatch {
    pub fn matches(self, status: StatusCode) -> bool {
        match self {
            Self::Code(code) => code == status,
            Self::Range(range) => range.contains(status),
        }
    }
}

impl From<StatusCode> for StatusMatch {
    fn from(code: StatusCode) -> Self { Self::Code(code) }
}

impl From<StatusRange> for StatusMatch {
    fn from(range: StatusRange) -> Self { Self::Range(range) }
}

impl FromStr for StatusMatch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.bytes().all(|b| b.is_ascii_digit()) && !s.is_empty() {
            return StatusCode::from_bytes(s.as_bytes())
                .map(Self::Code)
                .map_err(|_| Error::InvalidStatusFilter(s.to_owned()));
        }
        s.parse().map(Self::Range)
    }
}

impl fmt::Display for StatusMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{}", code.as_u16()),
            Self::Range(range) => f.write_str(range.as_str()),
        }
    }
}

/// An ordered set of entries; it matches when any entry does.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StatusFilter(Vec<StatusMatch>);

impl StatusFilter {
    pub fn matches(&self, status: StatusCode) -> bool {
        self.0.iter().any(|entry| entry.matches(status))
    }

    pub fn entries(&self) -> &[StatusMatch] {
        &self.0
    }
}

impl From<StatusCode> for StatusFilter {
    fn from(code: StatusCode) -> Self { Self(vec![code.into()]) }
}

impl From<StatusRange> for StatusFilter {
    fn from(range: StatusRange) -> Self { Self(vec![range.into()]) }
}

impl From<StatusMatch> for StatusFilter {
    fn from(entry: StatusMatch) -> Self { Self(vec![entry]) }
}

impl From<Vec<StatusMatch>> for StatusFilter {
    fn from(entries: Vec<StatusMatch>) -> Self { Self(entries) }
}

impl<T: Into<StatusMatch>, const N: usize> From<[T; N]> for StatusFilter {
    fn from(entries: [T; N]) -> Self {
        Self(entries.into_iter().map(Into::into).collect())
    }
}

/// Parses a comma-separated list such as `"404, client-error"`.
impl FromStr for StatusFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}
