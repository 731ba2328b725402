use std::ops::RangeInclusive;

use serde::Serialize;

/// One offending input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Malformed or out-of-range input, rejected before any storage access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("invalid input: {}", summarize(.fields))]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|error| error.field == field)
    }
}

fn summarize(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|error| format!("{} {}", error.field, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accumulates field errors so callers learn about every bad field at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
        self
    }

    pub fn positive(&mut self, field: &str, value: i64) -> &mut Self {
        if value <= 0 {
            self.reject(field, format!("must be a positive integer, got {value}"));
        }
        self
    }

    pub fn in_range(&mut self, field: &str, value: i64, range: RangeInclusive<i64>) -> &mut Self {
        if !range.contains(&value) {
            self.reject(
                field,
                format!(
                    "must be between {} and {}, got {value}",
                    range.start(),
                    range.end()
                ),
            );
        }
        self
    }

    pub fn at_least(&mut self, field: &str, value: i64, min: i64) -> &mut Self {
        if value < min {
            self.reject(field, format!("must be at least {min}, got {value}"));
        }
        self
    }

    pub fn required<T>(&mut self, field: &str, value: Option<&T>) -> &mut Self {
        if value.is_none() {
            self.reject(field, "is required");
        }
        self
    }

    pub fn non_empty<T>(&mut self, field: &str, values: &[T]) -> &mut Self {
        if values.is_empty() {
            self.reject(field, "must contain at least one entry");
        }
        self
    }

    pub fn not_blank(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.reject(field, "must not be blank");
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                fields: std::mem::take(&mut self.errors),
            })
        }
    }
}

/// Parse a path or query identifier, rejecting non-numeric and non-positive values.
pub fn parse_id(field: &str, raw: &str) -> Result<i64, ValidationError> {
    let value = raw.trim().parse::<i64>().map_err(|_| {
        ValidationError::single(field, format!("must be numeric, got '{}'", raw.trim()))
    })?;
    Validator::new().positive(field, value).finish()?;
    Ok(value)
}

/// Parse a comma separated identifier list. An empty string is an empty list.
pub fn parse_id_list(field: &str, raw: &str) -> Result<Vec<i64>, ValidationError> {
    let mut validator = Validator::new();
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        match part.parse::<i64>() {
            Ok(value) if value > 0 => ids.push(value),
            Ok(value) => {
                validator.reject(field, format!("must contain positive integers, got {value}"));
            }
            Err(_) => {
                validator.reject(field, format!("must contain numbers, got '{part}'"));
            }
        }
    }
    validator.finish()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_collects_every_field() {
        let error = Validator::new()
            .positive("assignmentId", 0)
            .in_range("subLevel", 4, 1..=3)
            .at_least("mainLevel", 1, 1)
            .finish()
            .expect_err("two fields invalid");

        assert_eq!(error.fields.len(), 2);
        assert!(error.has_field("assignmentId"));
        assert!(error.has_field("subLevel"));
        assert!(!error.has_field("mainLevel"));
        assert!(error.to_string().contains("subLevel must be between 1 and 3"));
    }

    #[test]
    fn parse_id_rejects_non_numeric_and_negative_values() {
        assert_eq!(parse_id("matrixId", " 42 "), Ok(42));
        assert!(parse_id("matrixId", "abc")
            .expect_err("non numeric")
            .has_field("matrixId"));
        assert!(parse_id("matrixId", "-3").is_err());
    }

    #[test]
    fn parse_id_list_handles_empty_and_bad_entries() {
        assert_eq!(parse_id_list("userIds", ""), Ok(Vec::new()));
        assert_eq!(parse_id_list("userIds", "3, 5,8"), Ok(vec![3, 5, 8]));
        let error = parse_id_list("userIds", "3,x,0").expect_err("bad entries");
        assert_eq!(error.fields.len(), 2);
    }
}
