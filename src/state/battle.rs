use thiserror::Error;

/// Lifecycle phases a game session moves through while a team battle forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattlePhase {
    /// Only side A exists (or no team at all); the opponent slot is open.
    Unpaired,
    /// Both sides exist and are still filling their rosters.
    PairedForming,
    /// Both captains flagged ready; the countdown is about to start.
    BothReady,
    /// The synchronized countdown is running.
    Countdown,
    /// The countdown completed and the match runner took over.
    Started,
}

/// Events that can move a session between battle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleEvent {
    /// An opponent invitation was accepted and side B was created.
    OpponentJoined,
    /// The second ready flag was set while the first was still up.
    BothTeamsReady,
    /// The countdown timer task has been spawned.
    CountdownStarted,
    /// The countdown timer reached zero.
    CountdownFinished,
    /// A ready flag was cleared or a roster shrank before the timer fired.
    CountdownAborted,
    /// One side disbanded; the pairing no longer exists.
    BattleDissolved,
}

/// Error returned when an event cannot be applied in the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the session was in when the invalid event was received.
    pub from: BattlePhase,
    /// The event that cannot be applied from this phase.
    pub event: BattleEvent,
}

impl BattlePhase {
    /// Compute the phase reached by applying `event`, rejecting invalid moves.
    pub fn apply(self, event: BattleEvent) -> Result<BattlePhase, InvalidTransition> {
        use BattleEvent::*;
        use BattlePhase::*;

        let next = match (self, event) {
            (Unpaired, OpponentJoined) => PairedForming,
            (PairedForming, BothTeamsReady) => BothReady,
            (BothReady, CountdownStarted) => Countdown,
            (Countdown, CountdownFinished) => Started,
            (BothReady | Countdown, CountdownAborted) => PairedForming,
            (PairedForming | BothReady | Countdown | Started, BattleDissolved) => Unpaired,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }

    /// Whether both sides of the battle currently exist.
    pub fn is_paired(self) -> bool {
        !matches!(self, BattlePhase::Unpaired)
    }

    /// Whether the roster is locked because the battle is imminent or running.
    pub fn is_locked(self) -> bool {
        matches!(self, BattlePhase::Countdown | BattlePhase::Started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(phase: BattlePhase, event: BattleEvent) -> BattlePhase {
        phase.apply(event).unwrap()
    }

    #[test]
    fn full_happy_path_to_started() {
        let mut phase = BattlePhase::Unpaired;
        phase = apply(phase, BattleEvent::OpponentJoined);
        assert_eq!(phase, BattlePhase::PairedForming);
        phase = apply(phase, BattleEvent::BothTeamsReady);
        assert_eq!(phase, BattlePhase::BothReady);
        phase = apply(phase, BattleEvent::CountdownStarted);
        assert_eq!(phase, BattlePhase::Countdown);
        phase = apply(phase, BattleEvent::CountdownFinished);
        assert_eq!(phase, BattlePhase::Started);
    }

    #[test]
    fn countdown_abort_falls_back_to_forming() {
        let phase = apply(BattlePhase::Countdown, BattleEvent::CountdownAborted);
        assert_eq!(phase, BattlePhase::PairedForming);

        let phase = apply(BattlePhase::BothReady, BattleEvent::CountdownAborted);
        assert_eq!(phase, BattlePhase::PairedForming);
    }

    #[test]
    fn dissolving_returns_to_unpaired_from_any_paired_phase() {
        for phase in [
            BattlePhase::PairedForming,
            BattlePhase::BothReady,
            BattlePhase::Countdown,
            BattlePhase::Started,
        ] {
            assert_eq!(
                apply(phase, BattleEvent::BattleDissolved),
                BattlePhase::Unpaired
            );
        }
    }

    #[test]
    fn second_opponent_join_is_rejected() {
        let err = BattlePhase::PairedForming
            .apply(BattleEvent::OpponentJoined)
            .unwrap_err();
        assert_eq!(err.from, BattlePhase::PairedForming);
        assert_eq!(err.event, BattleEvent::OpponentJoined);
    }

    #[test]
    fn countdown_cannot_finish_twice() {
        let phase = apply(BattlePhase::Countdown, BattleEvent::CountdownFinished);
        let err = phase.apply(BattleEvent::CountdownFinished).unwrap_err();
        assert_eq!(err.from, BattlePhase::Started);
    }

    #[test]
    fn ready_event_requires_pairing() {
        assert!(
            BattlePhase::Unpaired
                .apply(BattleEvent::BothTeamsReady)
                .is_err()
        );
    }

    #[test]
    fn lock_covers_countdown_and_started_only() {
        assert!(BattlePhase::Countdown.is_locked());
        assert!(BattlePhase::Started.is_locked());
        assert!(!BattlePhase::PairedForming.is_locked());
        assert!(!BattlePhase::BothReady.is_locked());
        assert!(!BattlePhase::Unpaired.is_locked());
    }
}
