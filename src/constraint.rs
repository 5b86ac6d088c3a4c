//! Per-parameter constraint validators for route patterns.
//!
//! A constraint failure makes the route not match at all (as if the pattern
//! had never been registered), not "match then reject" — so a less specific
//! route registered alongside it gets a chance to match instead.

use regex::Regex;

/// One parameter validator.
#[derive(Clone)]
pub enum Constraint {
    Regex(Regex),
    Int,
    Number,
    Alpha,
    Uuid,
}

impl std::fmt::Debug for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Regex(r) => write!(f, "Constraint::Regex({})", r.as_str()),
            Constraint::Int => write!(f, "Constraint::Int"),
            Constraint::Number => write!(f, "Constraint::Number"),
            Constraint::Alpha => write!(f, "Constraint::Alpha"),
            Constraint::Uuid => write!(f, "Constraint::Uuid"),
        }
    }
}

impl Constraint {
    pub fn int() -> Self {
        Constraint::Int
    }

    pub fn number() -> Self {
        Constraint::Number
    }

    pub fn alpha() -> Self {
        Constraint::Alpha
    }

    pub fn uuid() -> Self {
        Constraint::Uuid
    }

    pub fn regex(pattern: &str) -> anyhow::Result<Self> {
        Ok(Constraint::Regex(Regex::new(pattern).map_err(|e| {
            anyhow::anyhow!("invalid constraint regex {pattern:?}: {e}")
        })?))
    }

    /// Validate one path-segment value against this constraint.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Constraint::Regex(re) => re.is_match(value),
            Constraint::Int => !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()),
            Constraint::Number => value.parse::<f64>().is_ok(),
            Constraint::Alpha => !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphabetic()),
            Constraint::Uuid => is_uuid(value),
        }
    }
}

fn is_uuid(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if *b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}

/// Chainable builder for a route's constraint map, spelled as plain methods
/// since `where` is a reserved word.
#[derive(Default)]
pub struct Constraints(std::collections::HashMap<String, Constraint>);

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn regex(mut self, param: &str, pattern: &str) -> anyhow::Result<Self> {
        self.0.insert(param.to_string(), Constraint::regex(pattern)?);
        Ok(self)
    }

    pub fn int(mut self, param: &str) -> Self {
        self.0.insert(param.to_string(), Constraint::int());
        self
    }

    pub fn number(mut self, param: &str) -> Self {
        self.0.insert(param.to_string(), Constraint::number());
        self
    }

    pub fn alpha(mut self, param: &str) -> Self {
        self.0.insert(param.to_string(), Constraint::alpha());
        self
    }

    pub fn uuid(mut self, param: &str) -> Self {
        self.0.insert(param.to_string(), Constraint::uuid());
        self
    }

    pub fn build(self) -> std::collections::HashMap<String, Constraint> {
        self.0
    }
}
