//! Dependency reference tokens.
//!
//! A later step consumes an identifier produced by an earlier one by
//! embedding a token in its parameters:
//!
//! - `{{step}}`: the step's primary resource id
//! - `{{step.field}}`: a named field of the step's result
//! - `{{step.field.N}}` / `{{step.field}}[N]`: element `N` of a list field
//!
//! The bracket form is normalized to the dotted form before parsing, so both
//! spellings produce the same [`DependencyReference`].

use std::fmt;
use thiserror::Error;

/// Field name used when a token names only a step
pub const PRIMARY_ID_FIELD: &str = "resourceId";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Reference parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Malformed reference {token}: {reason}")]
    Malformed { token: String, reason: String },
}

impl ReferenceError {
    fn malformed(token: &str, reason: impl Into<String>) -> Self {
        ReferenceError::Malformed {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

/// A parsed `{{step.field.index}}` token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyReference {
    pub step_id: String,
    pub field: String,
    pub index: Option<usize>,
}

/// Whether `value` takes part in reference resolution at all.
///
/// Plain literals (anything not shaped like a token) pass through untouched.
pub fn is_reference(value: &str) -> bool {
    let value = value.trim();
    if !value.starts_with(OPEN) {
        return false;
    }
    value.ends_with(CLOSE) || split_bracket_suffix(value).is_some()
}

/// Split `{{inner}}[N]` into (`inner`, `N`).
fn split_bracket_suffix(value: &str) -> Option<(&str, &str)> {
    let close = value.rfind("}}[")?;
    let index = value[close + 3..].strip_suffix(']')?;
    let inner = value.get(OPEN.len()..close)?;
    Some((inner, index))
}

/// Rewrite `{{step.field}}[N]` as `{{step.field.N}}`.
///
/// A bare `{{step}}[N]` indexes the primary id field. Tokens already in
/// dotted form are returned unchanged.
pub fn normalize(value: &str) -> String {
    let value = value.trim();
    if value.starts_with(OPEN) && !value.ends_with(CLOSE) {
        if let Some((inner, index)) = split_bracket_suffix(value) {
            let inner = inner.trim();
            return if inner.contains('.') {
                format!("{OPEN}{inner}.{index}{CLOSE}")
            } else {
                format!("{OPEN}{inner}.{PRIMARY_ID_FIELD}.{index}{CLOSE}")
            };
        }
    }
    value.to_string()
}

impl DependencyReference {
    pub fn new(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            field: PRIMARY_ID_FIELD.to_string(),
            index: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Parse a token in either surface syntax.
    pub fn parse(token: &str) -> Result<Self, ReferenceError> {
        let normalized = normalize(token);
        let inner = normalized
            .strip_prefix(OPEN)
            .and_then(|s| s.strip_suffix(CLOSE))
            .ok_or_else(|| ReferenceError::malformed(token, "expected {{...}}"))?
            .trim();

        let segments: Vec<&str> = inner.split('.').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ReferenceError::malformed(token, "empty segment"));
        }

        match segments.as_slice() {
            [step] => Ok(Self::new(*step)),
            [step, field] => Ok(Self::new(*step).with_field(*field)),
            [step, field, index] => {
                let index = index.parse::<usize>().map_err(|_| {
                    ReferenceError::malformed(token, format!("index '{}' is not a number", index))
                })?;
                Ok(Self::new(*step).with_field(*field).with_index(index))
            }
            _ => Err(ReferenceError::malformed(
                token,
                format!("expected at most 3 segments, found {}", segments.len()),
            )),
        }
    }

    /// Mapping key for indexed access (`step.N`).
    pub fn indexed_key(&self) -> Option<String> {
        self.index.map(|i| format!("{}.{}", self.step_id, i))
    }

    pub fn is_primary_field(&self) -> bool {
        self.field == PRIMARY_ID_FIELD
    }
}

impl fmt::Display for DependencyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{OPEN}{}.{}.{}{CLOSE}", self.step_id, self.field, i),
            None if self.is_primary_field() => write!(f, "{OPEN}{}{CLOSE}", self.step_id),
            None => write!(f, "{OPEN}{}.{}{CLOSE}", self.step_id, self.field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_reference() {
        assert!(is_reference("{{step-vpc}}"));
        assert!(is_reference("{{step-azs.all_zones}}[1]"));
        assert!(!is_reference("vpc-123"));
        assert!(!is_reference("prefix {{step}}"));
        assert!(!is_reference("{{unterminated"));
    }

    #[test]
    fn test_parse_segments() {
        assert_eq!(
            DependencyReference::parse("{{step-vpc}}").unwrap(),
            DependencyReference::new("step-vpc")
        );
        assert_eq!(
            DependencyReference::parse("{{step-subnet.vpcId}}").unwrap(),
            DependencyReference::new("step-subnet").with_field("vpcId")
        );
        assert_eq!(
            DependencyReference::parse("{{ step-azs.all_zones.2 }}").unwrap(),
            DependencyReference::new("step-azs")
                .with_field("all_zones")
                .with_index(2)
        );
    }

    #[test]
    fn test_bracket_and_dot_forms_are_equivalent() {
        let bracket = DependencyReference::parse("{{step-subnets.subnet_ids}}[1]").unwrap();
        let dotted = DependencyReference::parse("{{step-subnets.subnet_ids.1}}").unwrap();
        assert_eq!(bracket, dotted);
        assert_eq!(bracket.indexed_key().as_deref(), Some("step-subnets.1"));
    }

    #[test]
    fn test_bare_bracket_indexes_primary_field() {
        let reference = DependencyReference::parse("{{step-azs}}[0]").unwrap();
        assert!(reference.is_primary_field());
        assert_eq!(reference.index, Some(0));
    }

    #[test]
    fn test_malformed_tokens() {
        for token in [
            "{{step.field.x}}",
            "{{a.b.c.d}}",
            "{{step..1}}",
            "{{}}",
            "not-a-token",
        ] {
            assert!(
                matches!(DependencyReference::parse(token), Err(ReferenceError::Malformed { .. })),
                "expected {} to be malformed",
                token
            );
        }
    }

    #[test]
    fn test_display_round_trips_canonical_form() {
        let reference = DependencyReference::parse("{{a.b}}[3]").unwrap();
        assert_eq!(reference.to_string(), "{{a.b.3}}");
        assert_eq!(DependencyReference::new("a").to_string(), "{{a}}");
    }
}
