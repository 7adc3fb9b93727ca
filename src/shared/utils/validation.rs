use std::sync::OnceLock;

use regex::Regex;

use crate::shared::errors::AppError;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"))
}

pub struct Validator;

impl Validator {
    pub fn validate_username(username: &str) -> Result<(), AppError> {
        if username.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Username cannot be empty".to_string(),
            ));
        }
        if username.len() > 255 {
            return Err(AppError::InvalidInput(
                "Username too long (max 255 characters)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_age(age: i32) -> Result<(), AppError> {
        if age < 0 {
            return Err(AppError::InvalidInput("Age cannot be negative".to_string()));
        }
        Ok(())
    }

    pub fn validate_team_name(name: &str) -> Result<(), AppError> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Team name cannot be empty".to_string(),
            ));
        }
        if name.len() > 100 {
            return Err(AppError::InvalidInput(
                "Team name too long (max 100 characters)".to_string(),
            ));
        }
        Ok(())
    }

    /// Names spliced into SQL text (aliases, json keys) must be plain identifiers.
    pub fn validate_identifier(name: &str) -> Result<(), AppError> {
        if !identifier_pattern().is_match(name) {
            return Err(AppError::InvalidInput(format!(
                "`{}` is not a valid identifier",
                name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(Validator::validate_username("member1").is_ok());
        assert!(Validator::validate_username("   ").is_err());
        assert!(Validator::validate_username(&"x".repeat(256)).is_err());
    }

    #[test]
    fn identifiers() {
        assert!(Validator::validate_identifier("team_name").is_ok());
        assert!(Validator::validate_identifier("name; drop").is_err());
        assert!(Validator::validate_identifier("1abc").is_err());
    }
}
