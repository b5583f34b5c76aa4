//! Validation helpers for DTOs.

use validator::ValidationError;

const SESSION_ID_MAX: usize = 64;
const TEAM_NAME_MAX: usize = 40;
const USERNAME_MAX: usize = 40;

/// Validates a client-minted game session identifier.
///
/// Session ids are opaque, but they travel in URLs and event payloads, so
/// they are restricted to 1..=64 URL-safe characters.
pub fn validate_session_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > SESSION_ID_MAX {
        let mut err = ValidationError::new("session_id_length");
        err.message = Some(
            format!(
                "session id must be 1 to {} characters (got {})",
                SESSION_ID_MAX,
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        let mut err = ValidationError::new("session_id_format");
        err.message =
            Some("session id may contain only letters, digits, '-', '_', '.', ':'".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a team display name: non-blank, at most 40 characters.
pub fn validate_team_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("team_name_blank");
        err.message = Some("team name must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > TEAM_NAME_MAX {
        let mut err = ValidationError::new("team_name_length");
        err.message = Some(format!("team name must be at most {TEAM_NAME_MAX} characters").into());
        return Err(err);
    }

    Ok(())
}

/// Validates a display name supplied through the identity headers.
pub fn validate_username(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("username_blank");
        err.message = Some("username must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > USERNAME_MAX {
        let mut err = ValidationError::new("username_length");
        err.message = Some(format!("username must be at most {USERNAME_MAX} characters").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_accept_url_safe_characters() {
        assert!(validate_session_id("s1").is_ok());
        assert!(validate_session_id("battle-2024_10.final:a").is_ok());
    }

    #[test]
    fn session_ids_reject_blank_and_oversized() {
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id(&"x".repeat(65)).is_err());
        assert!(validate_session_id("has space").is_err());
        assert!(validate_session_id("emoji🎮").is_err());
    }

    #[test]
    fn team_names_must_have_substance() {
        assert!(validate_team_name("Alpha").is_ok());
        assert!(validate_team_name("   ").is_err());
        assert!(validate_team_name(&"a".repeat(41)).is_err());
    }

    #[test]
    fn usernames_follow_the_same_rules() {
        assert!(validate_username("ada").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username(&"b".repeat(41)).is_err());
    }
}
