//! Vote values and the toggle policy behind the up/down arrows.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// A viewer's opinion on a post. `None` is never stored: casting it
/// deletes the viewer's vote row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteValue {
    Up,
    Down,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid vote value. Must be 1, -1 or 0.")]
pub struct InvalidVoteValue(pub i64);

impl VoteValue {
    pub fn as_i16(self) -> i16 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
            VoteValue::None => 0,
        }
    }

    /// Reads a stored row value; anything other than +1/-1 counts as no vote.
    pub fn from_stored(value: i16) -> Self {
        match value {
            1 => VoteValue::Up,
            -1 => VoteValue::Down,
            _ => VoteValue::None,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            0 => Ok(VoteValue::None),
            other => Err(InvalidVoteValue(other)),
        }
    }
}

impl Serialize for VoteValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.as_i16())
    }
}

/// Vote to submit when the viewer clicks `clicked` while holding `current`.
///
/// Clicking the arrow that is already lit retracts the vote; any other
/// click switches to the clicked direction.
pub fn toggle(current: VoteValue, clicked: VoteValue) -> VoteValue {
    if clicked == VoteValue::None || current == clicked {
        VoteValue::None
    } else {
        clicked
    }
}
