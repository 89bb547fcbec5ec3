//! Media type values.
//!
//! # Responsibilities
//! - Parse `type/subtype;param=value` strings
//! - Structural equality and wildcard compatibility
//! - Pick the more specific of two compatible types
//!
//! # Design Decisions
//! - Type, subtype and parameter names are stored lowercase
//! - `q` and `qs` never live in the parameter map; they are split off
//!   by `parse_with_quality` and carried as `Quality` values
//! - A bare `*` is accepted as `*/*` (some clients send it)

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::media::quality::Quality;

const WILDCARD: &str = "*";

/// Errors raised while parsing a media type or a quality value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaTypeError {
    #[error("empty media type")]
    Empty,

    #[error("media type '{0}' is missing a subtype")]
    MissingSubtype(String),

    #[error("media type '{0}' has a wildcard type with a concrete subtype")]
    WildcardType(String),

    #[error("malformed parameter '{0}'")]
    Parameter(String),

    #[error("invalid quality value '{0}'")]
    Quality(String),
}

/// An immutable `type/subtype` pair with parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaType {
    main: String,
    sub: String,
    params: BTreeMap<String, String>,
}

/// Quality parameters split off a parsed media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QualityParams {
    pub q: Option<Quality>,
    pub qs: Option<Quality>,
}

impl MediaType {
    /// Create a media type without parameters.
    pub fn new(main: impl Into<String>, sub: impl Into<String>) -> Self {
        Self {
            main: main.into().to_ascii_lowercase(),
            sub: sub.into().to_ascii_lowercase(),
            params: BTreeMap::new(),
        }
    }

    /// `*/*`
    pub fn wildcard() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    pub fn application_json() -> Self {
        Self::new("application", "json")
    }

    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Add a parameter, replacing any previous value.
    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn main_type(&self) -> &str {
        &self.main
    }

    pub fn subtype(&self) -> &str {
        &self.sub
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.main == WILDCARD
    }

    pub fn is_wildcard_subtype(&self) -> bool {
        self.sub == WILDCARD
    }

    /// True if either level is a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.is_wildcard_type() || self.is_wildcard_subtype()
    }

    /// 0 for `*/*`, 1 for `type/*`, 2 for `type/subtype`.
    pub fn specificity(&self) -> u8 {
        if self.is_wildcard_type() {
            0
        } else if self.is_wildcard_subtype() {
            1
        } else {
            2
        }
    }

    /// Wildcard-aware compatibility. Parameters are ignored.
    pub fn is_compatible(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() || other.is_wildcard_type() {
            return true;
        }
        self.main == other.main
            && (self.is_wildcard_subtype() || other.is_wildcard_subtype() || self.sub == other.sub)
    }

    /// True if `self` is compatible with `other` and concrete at a level
    /// where `other` is a wildcard, e.g. `text/plain` narrows `text/*`.
    pub fn narrows(&self, other: &MediaType) -> bool {
        self.is_compatible(other) && self.specificity() > other.specificity()
    }

    /// Same type and subtype, ignoring parameters.
    pub fn same_essence(&self, other: &MediaType) -> bool {
        self.main == other.main && self.sub == other.sub
    }

    /// Combine two compatible types, taking the concrete value at each level.
    ///
    /// Parameters come from whichever side is more specific overall (the
    /// left side on a tie).
    pub fn most_specific(&self, other: &MediaType) -> MediaType {
        let main = if self.is_wildcard_type() { &other.main } else { &self.main };
        let sub = if self.is_wildcard_subtype() { &other.sub } else { &self.sub };
        let params = if self.specificity() >= other.specificity() {
            self.params.clone()
        } else {
            other.params.clone()
        };
        MediaType {
            main: main.clone(),
            sub: sub.clone(),
            params,
        }
    }

    /// Parse a media type and split off its `q` and `qs` parameters.
    pub fn parse_with_quality(input: &str) -> Result<(MediaType, QualityParams), MediaTypeError> {
        let mut parts = input.split(';');
        let essence = parts.next().map(str::trim).unwrap_or_default();
        if essence.is_empty() {
            return Err(MediaTypeError::Empty);
        }

        let (main, sub) = match essence.split_once('/') {
            Some((main, sub)) => (main.trim(), sub.trim()),
            None if essence == WILDCARD => (WILDCARD, WILDCARD),
            None => return Err(MediaTypeError::MissingSubtype(essence.to_string())),
        };
        if main.is_empty() || sub.is_empty() {
            return Err(MediaTypeError::MissingSubtype(essence.to_string()));
        }
        if main == WILDCARD && sub != WILDCARD {
            return Err(MediaTypeError::WildcardType(essence.to_string()));
        }

        let mut media = MediaType::new(main, sub);
        let mut quality = QualityParams::default();
        for raw in parts {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (name, value) = raw
                .split_once('=')
                .ok_or_else(|| MediaTypeError::Parameter(raw.to_string()))?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('"');
            if name.is_empty() {
                return Err(MediaTypeError::Parameter(raw.to_string()));
            }
            match name.as_str() {
                "q" => quality.q = Some(value.parse()?),
                "qs" => quality.qs = Some(value.parse()?),
                _ => {
                    media.params.insert(name, value.to_string());
                }
            }
        }

        Ok((media, quality))
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaType::parse_with_quality(s).map(|(media, _)| media)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main, self.sub)?;
        for (name, value) in &self.params {
            write!(f, ";{}={}", name, value)?;
        }
        Ok(())
    }
}
