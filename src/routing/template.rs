//! Path templates.
//!
//! # Responsibilities
//! - Compile `items/{id}` and `files/{path: .+}` into anchored regexes
//! - Match a path prefix and report bound variables plus the remainder
//! - Order sibling templates so the most specific is tried first
//!
//! # Design Decisions
//! - Templates are compiled once at build time; matching never allocates
//!   a new regex
//! - Leading and trailing slashes are not significant
//! - A template only matches whole segments: `item` never matches `items`
//! - Capture groups are named internally, so user patterns may contain
//!   their own groups
//! - Matching runs on the encoded path; bound values are percent-decoded
//!   afterwards, so `%2F` never splits a segment

use std::cmp::Ordering;
use std::fmt;

use percent_encoding::percent_decode_str;
use regex::Regex;
use thiserror::Error;

/// Pattern used for `{name}` without an explicit regex.
const DEFAULT_VARIABLE_PATTERN: &str = "[^/]+";

const REST_GROUP: &str = "rest";

/// Errors raised while compiling a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed '{{' in template '{0}'")]
    Unclosed(String),

    #[error("unexpected '}}' in template '{0}'")]
    Unopened(String),

    #[error("invalid variable name '{name}' in template '{template}'")]
    InvalidName { template: String, name: String },

    #[error("invalid pattern for '{name}' in template '{template}': {message}")]
    InvalidPattern {
        template: String,
        name: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable { name: String, pattern: Option<String> },
}

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    source: String,
    /// `None` for the root template.
    regex: Option<Regex>,
    variables: Vec<String>,
    literal_chars: usize,
    regex_variables: usize,
}

/// Result of matching a template against a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch<'a> {
    /// Bound variables in template order.
    pub values: Vec<(String, String)>,
    /// Unmatched remainder, without a leading slash.
    pub rest: &'a str,
}

impl PathTemplate {
    /// Compile a template.
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let source = template.trim_matches('/').to_string();
        let segments = tokenize(&source)?;

        let mut body = String::new();
        let mut variables = Vec::new();
        let mut literal_chars = 0;
        let mut regex_variables = 0;
        for segment in &segments {
            match segment {
                Segment::Literal(text) => {
                    literal_chars += text.chars().count();
                    body.push_str(&regex::escape(text));
                }
                Segment::Variable { name, pattern } => {
                    if let Some(pattern) = pattern {
                        regex_variables += 1;
                        Regex::new(pattern).map_err(|e| TemplateError::InvalidPattern {
                            template: source.clone(),
                            name: name.clone(),
                            message: e.to_string(),
                        })?;
                    }
                    let pattern = pattern.as_deref().unwrap_or(DEFAULT_VARIABLE_PATTERN);
                    body.push_str(&format!("(?P<v{}>{})", variables.len(), pattern));
                    variables.push(name.clone());
                }
            }
        }

        let regex = if body.is_empty() {
            None
        } else {
            let full = format!("^(?:{})(?:/(?P<{}>.*))?$", body, REST_GROUP);
            let regex = Regex::new(&full).map_err(|e| TemplateError::InvalidPattern {
                template: source.clone(),
                name: String::new(),
                message: e.to_string(),
            })?;
            Some(regex)
        };

        Ok(Self {
            source,
            regex,
            variables,
            literal_chars,
            regex_variables,
        })
    }

    /// The empty template; matches any path and consumes nothing.
    pub fn root() -> Self {
        Self {
            source: String::new(),
            regex: None,
            variables: Vec::new(),
            literal_chars: 0,
            regex_variables: 0,
        }
    }

    /// Normalized source text, without surrounding slashes.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_root(&self) -> bool {
        self.source.is_empty()
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Match the start of `path` (given without a leading slash).
    pub fn match_path<'a>(&self, path: &'a str) -> Option<TemplateMatch<'a>> {
        let Some(regex) = &self.regex else {
            return Some(TemplateMatch {
                values: Vec::new(),
                rest: path,
            });
        };
        let captures = regex.captures(path)?;
        let values = self
            .variables
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                captures.name(&format!("v{}", i)).map(|m| {
                    let value = percent_decode_str(m.as_str()).decode_utf8_lossy();
                    (name.clone(), value.into_owned())
                })
            })
            .collect();
        let rest = captures.name(REST_GROUP).map(|m| m.as_str()).unwrap_or("");
        Some(TemplateMatch { values, rest })
    }

    /// Sibling order: `Less` means `self` is tried first.
    ///
    /// More literal characters first, then more variables, then more
    /// variables with explicit patterns.
    pub fn precedence(&self, other: &Self) -> Ordering {
        other
            .literal_chars
            .cmp(&self.literal_chars)
            .then_with(|| other.variables.len().cmp(&self.variables.len()))
            .then_with(|| other.regex_variables.cmp(&self.regex_variables))
    }
}

impl PartialEq for PathTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for PathTemplate {}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.source)
    }
}

fn tokenize(template: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices();

    while let Some((_, c)) = chars.next() {
        match c {
            '{' => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                let mut depth = 1;
                let mut inner = String::new();
                for (_, c) in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    inner.push(c);
                }
                if depth != 0 {
                    return Err(TemplateError::Unclosed(template.to_string()));
                }
                segments.push(parse_variable(template, &inner)?);
            }
            '}' => return Err(TemplateError::Unopened(template.to_string())),
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn parse_variable(template: &str, inner: &str) -> Result<Segment, TemplateError> {
    let (name, pattern) = match inner.split_once(':') {
        Some((name, pattern)) => (name.trim(), Some(pattern.trim().to_string())),
        None => (inner.trim(), None),
    };
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(TemplateError::InvalidName {
            template: template.to_string(),
            name: name.to_string(),
        });
    }
    Ok(Segment::Variable {
        name: name.to_string(),
        pattern: pattern.filter(|p| !p.is_empty()),
    })
}
