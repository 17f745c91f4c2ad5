//! Create-form contents and their validation.

use serde::{Deserialize, Serialize};

use crate::error::{DraftField, ValidationError};

/// Raw create-form input, exactly as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandDraft {
    pub name: String,
    pub category: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub name: String,
    pub category_code: u64,
    pub value: u64,
}

impl CommandDraft {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            value: value.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.category.is_empty() && self.value.is_empty()
    }

    pub fn validate(&self) -> Result<ValidatedDraft, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::new(DraftField::Name, "must not be empty"));
        }

        Ok(ValidatedDraft {
            name: name.to_string(),
            category_code: parse_unsigned(DraftField::Category, &self.category)?,
            value: parse_unsigned(DraftField::Value, &self.value)?,
        })
    }
}

fn parse_unsigned(field: DraftField, raw: &str) -> Result<u64, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    raw.parse::<u64>().map_err(|_| {
        ValidationError::new(
            field,
            format!("'{raw}' is not a non-negative integer"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_trimmed_integers() {
        let draft = CommandDraft::new("  Lights on ", " 3", "42 ");
        let validated = draft.validate().expect("valid draft");
        assert_eq!(validated.name, "Lights on");
        assert_eq!(validated.category_code, 3);
        assert_eq!(validated.value, 42);
    }

    #[test]
    fn rejects_each_empty_field() {
        let cases = [
            (CommandDraft::new("", "1", "1"), DraftField::Name),
            (CommandDraft::new("a", "", "1"), DraftField::Category),
            (CommandDraft::new("a", "1", "   "), DraftField::Value),
        ];
        for (draft, field) in cases {
            let err = draft.validate().expect_err("must reject");
            assert_eq!(err.field, field);
        }
    }

    #[test]
    fn rejects_negative_and_non_numeric_values() {
        let err = CommandDraft::new("a", "1", "-5")
            .validate()
            .expect_err("negative");
        assert_eq!(err.field, DraftField::Value);

        let err = CommandDraft::new("a", "x1", "5")
            .validate()
            .expect_err("non numeric");
        assert_eq!(err.field, DraftField::Category);
        assert!(err.to_string().contains("x1"));
    }
}
