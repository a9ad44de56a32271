use serde::{Deserialize, Serialize};

/// Self-declared category of a passenger or driver, used by the safety filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl Gender {
    /// Unset declarations count as `Other`.
    pub fn or_default(declared: Option<Gender>) -> Gender {
        declared.unwrap_or_default()
    }
}
