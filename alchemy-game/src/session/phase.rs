//! Session phases and the admissible transitions between them.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    #[default]
    Loading,
    Welcome,
    Playing,
    /// Target found; the player may keep exploring until acknowledging.
    Admire,
    Complete,
    GameOver,
    Error,
}

impl SessionPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Welcome => "welcome",
            Self::Playing => "playing",
            Self::Admire => "admire",
            Self::Complete => "complete",
            Self::GameOver => "game over",
            Self::Error => "error",
        }
    }

    /// Whether `self -> next` is an edge of the session state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Loading, Self::Welcome | Self::Error)
                | (Self::Welcome, Self::Playing)
                | (Self::Playing, Self::Admire | Self::GameOver | Self::Welcome)
                | (Self::Admire, Self::Complete)
                | (Self::Complete | Self::GameOver, Self::Welcome)
        )
    }

    /// Element selection is open while playing and while admiring the result.
    #[must_use]
    pub const fn accepts_selection(self) -> bool {
        matches!(self, Self::Playing | Self::Admire)
    }

    #[must_use]
    pub const fn accepts_combine(self) -> bool {
        matches!(self, Self::Playing)
    }

    /// The session is over and can only be reset.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Complete | Self::GameOver)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use SessionPhase::*;
        assert!(Loading.can_transition_to(Welcome));
        assert!(Loading.can_transition_to(Error));
        assert!(Welcome.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Admire));
        assert!(Playing.can_transition_to(GameOver));
        assert!(Admire.can_transition_to(Complete));
        assert!(GameOver.can_transition_to(Welcome));
        assert!(!Admire.can_transition_to(Welcome));
        assert!(!Welcome.can_transition_to(Complete));
        assert!(!Complete.can_transition_to(Playing));
    }

    #[test]
    fn serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::GameOver).unwrap(),
            "\"GAME_OVER\""
        );
        assert_eq!(SessionPhase::GameOver.to_string(), "game over");
    }
}
