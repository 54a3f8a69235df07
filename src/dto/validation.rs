//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::{
    generator::providers::AiMode,
    state::session::{ContentPack, GameplayMode, JOIN_CODE_LENGTH},
};

/// Validates that a join code is exactly six characters from the unambiguous
/// code alphabet (uppercase letters and digits, minus `I`, `O`, `0`, `1`).
///
/// # Examples
///
/// ```ignore
/// validate_join_code("ABC234") // Ok
/// validate_join_code("abc234") // Err - lowercase
/// validate_join_code("ABC10")  // Err - too short, ambiguous digits
/// ```
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != JOIN_CODE_LENGTH {
        let mut err = ValidationError::new("join_code_length");
        err.message = Some(
            format!(
                "Join code must be exactly {JOIN_CODE_LENGTH} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() && !"IO".contains(c) || ('2'..='9').contains(&c))
    {
        let mut err = ValidationError::new("join_code_format");
        err.message =
            Some("Join code must contain only unambiguous uppercase letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a gameplay mode wire identifier.
pub fn validate_mode_tag(mode: &str) -> Result<(), ValidationError> {
    if GameplayMode::parse(mode).is_none() {
        let mut err = ValidationError::new("unknown_mode");
        err.message = Some(format!("Unknown gameplay mode '{mode}'").into());
        return Err(err);
    }
    Ok(())
}

/// Validates a list of content-pack wire identifiers.
pub fn validate_pack_tags(packs: &Vec<String>) -> Result<(), ValidationError> {
    for pack in packs {
        if ContentPack::parse(pack).is_none() {
            let mut err = ValidationError::new("unknown_pack");
            err.message = Some(format!("Unknown content pack '{pack}'").into());
            return Err(err);
        }
    }
    Ok(())
}

/// Validates an AI-mode wire identifier.
pub fn validate_ai_mode_tag(mode: &str) -> Result<(), ValidationError> {
    if AiMode::parse(mode).is_none() {
        let mut err = ValidationError::new("unknown_ai_mode");
        err.message = Some(format!("Unknown AI mode '{mode}'").into());
        return Err(err);
    }
    Ok(())
}

/// Validates a team wire label (`A` or `B`).
pub fn validate_team_tag(team: &str) -> Result<(), ValidationError> {
    if team != "A" && team != "B" {
        let mut err = ValidationError::new("unknown_team");
        err.message = Some("Team must be 'A' or 'B'".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_join_code_valid() {
        assert!(validate_join_code("ABC234").is_ok());
        assert!(validate_join_code("ZZZZZZ").is_ok());
        assert!(validate_join_code("234567").is_ok());
    }

    #[test]
    fn test_validate_join_code_invalid() {
        assert!(validate_join_code("ABC23").is_err()); // too short
        assert!(validate_join_code("abc234").is_err()); // lowercase
        assert!(validate_join_code("ABC10X").is_err()); // ambiguous digits
        assert!(validate_join_code("ABCIO2").is_err()); // ambiguous letters
        assert!(validate_join_code("").is_err());
    }

    #[test]
    fn test_validate_tags() {
        assert!(validate_mode_tag("team_battle").is_ok());
        assert!(validate_mode_tag("chaos").is_err());
        assert!(validate_pack_tags(&vec!["blitz".into(), "expert".into()]).is_ok());
        assert!(validate_pack_tags(&vec!["mystery".into()]).is_err());
        assert!(validate_ai_mode_tag("hybrid").is_ok());
        assert!(validate_ai_mode_tag("psychic").is_err());
        assert!(validate_team_tag("A").is_ok());
        assert!(validate_team_tag("C").is_err());
    }
}
