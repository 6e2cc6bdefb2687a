//! Validation helpers for DTOs.

use uuid::Uuid;
use validator::ValidationError;

use crate::state::{game_record::SUBSTITUTE_PLAYER_ID, handicap::MatchFormat};

/// Rejects the reserved substitute id where a real member must act.
pub fn validate_member_id(id: &Uuid) -> Result<(), ValidationError> {
    if *id == SUBSTITUTE_PLAYER_ID {
        let mut err = ValidationError::new("member_id_reserved");
        err.message = Some("The nil id is reserved for substitutes and cannot act".into());
        return Err(err);
    }
    Ok(())
}

/// Checks a lineup has exactly one slot per seat of `format`.
pub fn validate_lineup_size(format: MatchFormat, slots: usize) -> Result<(), ValidationError> {
    let expected = format.players_per_side();
    if slots != expected {
        let mut err = ValidationError::new("lineup_size");
        err.message = Some(format!("Lineup must seat {expected} players (got {slots})").into());
        return Err(err);
    }
    Ok(())
}

/// Checks a single player's handicap lies in the range of `format`.
///
/// ```ignore
/// validate_handicap(MatchFormat::ThreeVThree, 2)  // Ok
/// validate_handicap(MatchFormat::ThreeVThree, 3)  // Err
/// validate_handicap(MatchFormat::FiveVFive, 55)   // Ok
/// ```
pub fn validate_handicap(format: MatchFormat, handicap: i32) -> Result<(), ValidationError> {
    let (min, max) = format.handicap_range();
    if !(min..=max).contains(&handicap) {
        let mut err = ValidationError::new("handicap_range");
        err.message =
            Some(format!("Handicap must be within {min}..={max} (got {handicap})").into());
        return Err(err);
    }
    Ok(())
}
