//! Client and server preference weights.
//!
//! # Responsibilities
//! - Fixed-point quality values (`q`, `qs`) on a 0..=1000 scale
//! - Parse `Accept` header values into ordered `AcceptPreference` lists
//! - Describe what a binding can produce as `ProducePreference` values
//!
//! # Design Decisions
//! - Decimal weights are parsed digit by digit; no floating point
//! - At most three decimals, as HTTP allows
//! - An absent or empty Accept header means `*/*` at full weight

use std::fmt;
use std::str::FromStr;

use crate::media::media_type::{MediaType, MediaTypeError};

/// A weight in thousandths (`0.5` is `Quality(500)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u16);

impl Quality {
    pub const ZERO: Quality = Quality(0);
    pub const MAX: Quality = Quality(1000);

    /// Create a quality value, clamped to the valid range.
    pub fn new(thousandths: u16) -> Self {
        Self(thousandths.min(Self::MAX.0))
    }

    pub fn value(self) -> u16 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::MAX
    }
}

impl FromStr for Quality {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MediaTypeError::Quality(s.to_string());
        let (whole, fraction) = match s.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (s, ""),
        };
        if whole.len() != 1 || fraction.len() > 3 {
            return Err(invalid());
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut value = u16::from(whole.as_bytes()[0] - b'0') * 1000;
        let mut scale = 100;
        for digit in fraction.bytes() {
            value += u16::from(digit - b'0') * scale;
            scale /= 10;
        }
        if value > Quality::MAX.0 {
            return Err(invalid());
        }
        Ok(Quality(value))
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a client's Accept header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptPreference {
    pub media_type: MediaType,
    pub q: Quality,
}

impl AcceptPreference {
    pub fn new(media_type: MediaType, q: Quality) -> Self {
        Self { media_type, q }
    }

    /// `*/*` at full weight, used when the client sends no Accept header.
    pub fn any() -> Self {
        Self::new(MediaType::wildcard(), Quality::MAX)
    }

    /// True if the client explicitly refuses this type (`q=0`).
    pub fn is_refusal(&self) -> bool {
        self.q.is_zero()
    }
}

impl FromStr for AcceptPreference {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (media_type, quality) = MediaType::parse_with_quality(s)?;
        Ok(Self::new(media_type, quality.q.unwrap_or(Quality::MAX)))
    }
}

/// A type a binding declares it can produce, with its server-side weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducePreference {
    pub media_type: MediaType,
    pub qs: Quality,
}

impl ProducePreference {
    pub fn new(media_type: MediaType, qs: Quality) -> Self {
        Self { media_type, qs }
    }

    /// `*/*` at full weight, the implied value of an empty produces list.
    pub fn any() -> Self {
        Self::new(MediaType::wildcard(), Quality::MAX)
    }
}

impl From<MediaType> for ProducePreference {
    fn from(media_type: MediaType) -> Self {
        Self::new(media_type, Quality::MAX)
    }
}

impl FromStr for ProducePreference {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (media_type, quality) = MediaType::parse_with_quality(s)?;
        Ok(Self::new(media_type, quality.qs.unwrap_or(Quality::MAX)))
    }
}

/// Parse every Accept header value into one ordered preference list.
///
/// Input order is preserved; the negotiator never reorders by it.
pub fn parse_accept<'a, I>(values: I) -> Result<Vec<AcceptPreference>, MediaTypeError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut preferences = Vec::new();
    for value in values {
        for item in value.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            preferences.push(item.parse()?);
        }
    }

    if preferences.is_empty() {
        preferences.push(AcceptPreference::any());
    }
    Ok(preferences)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_parsing() {
        assert_eq!("1".parse::<Quality>(), Ok(Quality::MAX));
        assert_eq!("1.000".parse::<Quality>(), Ok(Quality::MAX));
        assert_eq!("0".parse::<Quality>(), Ok(Quality::ZERO));
        assert_eq!("0.5".parse::<Quality>(), Ok(Quality::new(500)));
        assert_eq!("0.25".parse::<Quality>(), Ok(Quality::new(250)));
        assert_eq!("0.001".parse::<Quality>(), Ok(Quality::new(1)));
    }

    #[test]
    fn test_quality_rejects_out_of_range() {
        assert!("1.001".parse::<Quality>().is_err());
        assert!("2".parse::<Quality>().is_err());
        assert!("0.0001".parse::<Quality>().is_err());
        assert!("-0.5".parse::<Quality>().is_err());
        assert!("abc".parse::<Quality>().is_err());
        assert!("".parse::<Quality>().is_err());
    }

    #[test]
    fn test_parse_accept_order_preserved() {
        let prefs = parse_accept(["text/html;q=0.5, application/json", "text/*;q=0"]).unwrap();
        let types: Vec<String> = prefs.iter().map(|p| p.media_type.to_string()).collect();
        assert_eq!(types, vec!["text/html", "application/json", "text/*"]);
        assert_eq!(prefs[0].q, Quality::new(500));
        assert_eq!(prefs[1].q, Quality::MAX);
        assert!(prefs[2].is_refusal());
    }

    #[test]
    fn test_parse_accept_absent() {
        let prefs = parse_accept(std::iter::empty::<&str>()).unwrap();
        assert_eq!(prefs, vec![AcceptPreference::any()]);

        let prefs = parse_accept([" , "]).unwrap();
        assert_eq!(prefs, vec![AcceptPreference::any()]);
    }

    #[test]
    fn test_parse_accept_invalid() {
        assert!(parse_accept(["text/html;q=abc"]).is_err());
    }

    #[test]
    fn test_produce_default_qs() {
        let produce: ProducePreference = "application/xml".parse().unwrap();
        assert_eq!(produce.qs, Quality::MAX);

        let produce: ProducePreference = "application/xml;qs=0.7".parse().unwrap();
        assert_eq!(produce.qs, Quality::new(700));
    }
}
