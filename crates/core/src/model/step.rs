use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const IA_PREFIX: &str = "ia-";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepIdError {
    #[error("step id cannot be empty")]
    Empty,

    #[error("malformed step id: {raw}")]
    Malformed { raw: String },

    #[error("unknown workshop: {raw}")]
    UnknownWorkshop { raw: String },
}

//
// ─── WORKSHOP ──────────────────────────────────────────────────────────────────
//

/// The two workshop products sharing the progress engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workshop {
    /// AllStarTeams.
    Ast,
    /// Imaginal Agility.
    Ia,
}

impl Workshop {
    pub const ALL: [Workshop; 2] = [Workshop::Ast, Workshop::Ia];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Workshop::Ast => "ast",
            Workshop::Ia => "ia",
        }
    }
}

impl fmt::Display for Workshop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Workshop {
    type Err = StepIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ast" | "allstarteams" => Ok(Workshop::Ast),
            "ia" | "imaginal-agility" | "imaginal_agility" => Ok(Workshop::Ia),
            _ => Err(StepIdError::UnknownWorkshop { raw: s.to_owned() }),
        }
    }
}

//
// ─── STEP ID ───────────────────────────────────────────────────────────────────
//

/// Workshop-namespaced step identifier (`"2-3"`, `"ia-3-2"`).
///
/// The workshop is implied by the prefix and the section is everything before
/// the last `-<n>` segment.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepId(String);

impl StepId {
    /// Parse and validate a step id.
    ///
    /// # Errors
    ///
    /// Returns `StepIdError::Empty` for blank input and `StepIdError::Malformed`
    /// when the id is not `<n>-<n>` or `ia-<n>-<n>`.
    pub fn parse(raw: &str) -> Result<Self, StepIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StepIdError::Empty);
        }

        let body = trimmed.strip_prefix(IA_PREFIX).unwrap_or(trimmed);
        let mut parts = body.split('-');
        let valid = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(module), Some(step), None) if is_number(module) && is_number(step)
        );
        if !valid {
            return Err(StepIdError::Malformed {
                raw: trimmed.to_owned(),
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn workshop(&self) -> Workshop {
        if self.0.starts_with(IA_PREFIX) {
            Workshop::Ia
        } else {
            Workshop::Ast
        }
    }

    /// Coarse grouping the step belongs to (`"2-3"` -> `"2"`).
    #[must_use]
    pub fn section(&self) -> &str {
        self.0.rsplit_once('-').map_or(self.0.as_str(), |(head, _)| head)
    }
}

fn is_number(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Debug for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StepId({})", self.0)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StepId {
    type Err = StepIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StepId {
    type Error = StepIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StepId> for String {
    fn from(value: StepId) -> Self {
        value.0
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ast_and_ia_ids() {
        let ast = StepId::parse("2-3").unwrap();
        assert_eq!(ast.workshop(), Workshop::Ast);
        assert_eq!(ast.section(), "2");

        let ia = StepId::parse(" ia-3-2 ").unwrap();
        assert_eq!(ia.as_str(), "ia-3-2");
        assert_eq!(ia.workshop(), Workshop::Ia);
        assert_eq!(ia.section(), "ia-3");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!(StepId::parse("   "), Err(StepIdError::Empty));
        for raw in ["2", "2-", "-3", "a-b", "2-3-4", "ia-2", "xx-1-1"] {
            assert!(
                matches!(StepId::parse(raw), Err(StepIdError::Malformed { .. })),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn serde_uses_plain_string() {
        let id = StepId::parse("1-1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1-1\"");
        let back: StepId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<StepId>("\"nope\"").is_err());
    }

    #[test]
    fn workshop_parses_aliases() {
        assert_eq!("AST".parse::<Workshop>().unwrap(), Workshop::Ast);
        assert_eq!("imaginal_agility".parse::<Workshop>().unwrap(), Workshop::Ia);
        assert!("xyz".parse::<Workshop>().is_err());
        assert_eq!(serde_json::to_string(&Workshop::Ia).unwrap(), "\"ia\"");
    }
}
