// Local and remote fighter state
// Local hands change only through input (and their own decay timers); remote
// hands change only through decoded protocol messages and never decay here.

use tracing::debug;

use crate::condition::{Condition, FighterState, Side};
use crate::decay_timer::{DecayFired, PunchTimers};
use crate::fields;

/// A local hand transition that has to be sent to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionChange {
    pub side: Side,
    pub condition: Condition,
}

#[derive(Debug)]
pub struct LocalFighter {
    state: FighterState,
    timers: PunchTimers,
}

impl LocalFighter {
    pub fn new(timers: PunchTimers) -> Self {
        Self {
            state: FighterState::default(),
            timers,
        }
    }

    pub fn state(&self) -> FighterState {
        self.state
    }

    #[cfg(test)]
    pub fn is_decay_armed(&self, side: Side) -> bool {
        self.timers.is_armed(side)
    }

    /// Applies a local hand input. A punch (re)arms the decay timer for that
    /// hand; anything else cancels it. Returns the change to transmit, or
    /// `None` when the hand already held that condition.
    pub fn apply_input(&mut self, side: Side, condition: Condition) -> Option<ConditionChange> {
        if condition == Condition::Punch {
            self.timers.arm(side);
        } else {
            self.timers.cancel(side);
        }

        let previous = self.state.set(side, condition);
        if previous == condition {
            return None;
        }

        debug!(
            { fields::SIDE } = %side,
            { fields::CONDITION } = %condition,
            previous = %previous,
            "Local hand changed"
        );
        Some(ConditionChange { side, condition })
    }

    /// Key release: only reverts the hand if it still holds what that key set.
    pub fn release(&mut self, side: Side, held: Condition) -> Option<ConditionChange> {
        if held == Condition::Neutral || self.state.get(side) != held {
            return None;
        }
        self.apply_input(side, Condition::Neutral)
    }

    /// Handles a decay fire. Behaves exactly like a local Neutral input when
    /// the fire belongs to the live timer of that hand.
    pub fn apply_decay(&mut self, fired: DecayFired) -> Option<ConditionChange> {
        if !self.timers.claim(fired) {
            return None;
        }

        let previous = self.state.set(fired.side, Condition::Neutral);
        if previous == Condition::Neutral {
            return None;
        }

        debug!({ fields::SIDE } = %fired.side, "Punch decayed to neutral");
        Some(ConditionChange {
            side: fired.side,
            condition: Condition::Neutral,
        })
    }

    /// Stops both timers but leaves the hands as they are.
    pub fn cancel_decay(&mut self) {
        self.timers.cancel_all();
    }

    /// Cancels both timers and returns both hands to neutral without emitting.
    pub fn reset(&mut self) {
        self.timers.cancel_all();
        self.state = FighterState::default();
    }
}

#[derive(Debug, Default)]
pub struct RemoteFighter {
    state: FighterState,
}

impl RemoteFighter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FighterState {
        self.state
    }

    /// Sets the hand unconditionally. Decay for the far side is the peer's job:
    /// it sends its own Neutral when its timer fires.
    pub fn apply_update(&mut self, side: Side, condition: Condition) -> bool {
        let previous = self.state.set(side, condition);
        previous != condition
    }

    pub fn reset(&mut self) {
        self.state = FighterState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decay_timer::DEFAULT_PUNCH_DECAY;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::advance;

    fn local() -> (LocalFighter, mpsc::UnboundedReceiver<DecayFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            LocalFighter::new(PunchTimers::new(DEFAULT_PUNCH_DECAY, tx)),
            rx,
        )
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_repeated_input_emits_once() {
        let (mut fighter, _rx) = local();
        for condition in [Condition::Block, Condition::Punch, Condition::Neutral] {
            for side in Side::BOTH {
                let first = fighter.apply_input(side, condition);
                let second = fighter.apply_input(side, condition);
                assert_eq!(first, Some(ConditionChange { side, condition }));
                assert_eq!(second, None);
            }
        }
    }

    #[tokio::test]
    async fn test_neutral_on_neutral_is_silent() {
        let (mut fighter, _rx) = local();
        assert_eq!(fighter.apply_input(Side::Left, Condition::Neutral), None);
        assert!(fighter.state().is_neutral());
    }

    #[tokio::test(start_paused = true)]
    async fn test_punch_decays_to_neutral() {
        let (mut fighter, mut rx) = local();
        assert_eq!(
            fighter.apply_input(Side::Left, Condition::Punch),
            Some(ConditionChange {
                side: Side::Left,
                condition: Condition::Punch
            })
        );
        assert!(fighter.is_decay_armed(Side::Left));

        advance(DEFAULT_PUNCH_DECAY).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(
            fighter.apply_decay(fired),
            Some(ConditionChange {
                side: Side::Left,
                condition: Condition::Neutral
            })
        );
        assert_eq!(fighter.state().left, Condition::Neutral);
        assert_eq!(fighter.apply_decay(fired), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_preempts_decay() {
        let (mut fighter, mut rx) = local();
        fighter.apply_input(Side::Right, Condition::Punch);
        advance(Duration::from_millis(100)).await;
        fighter.apply_input(Side::Right, Condition::Block);
        assert!(!fighter.is_decay_armed(Side::Right));

        advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(fighter.state().right, Condition::Block);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repunch_restarts_decay_without_event() {
        let (mut fighter, mut rx) = local();
        fighter.apply_input(Side::Left, Condition::Punch);
        advance(Duration::from_millis(200)).await;
        assert_eq!(fighter.apply_input(Side::Left, Condition::Punch), None);

        advance(Duration::from_millis(100)).await;
        settle().await;
        assert!(rx.try_recv().is_err(), "restarted timer must not fire early");

        advance(Duration::from_millis(150)).await;
        let fired = rx.recv().await.unwrap();
        assert!(fighter.apply_decay(fired).is_some());
    }

    #[tokio::test]
    async fn test_release_only_reverts_matching_condition() {
        let (mut fighter, _rx) = local();
        fighter.apply_input(Side::Left, Condition::Block);

        assert_eq!(fighter.release(Side::Left, Condition::Punch), None);
        assert_eq!(fighter.state().left, Condition::Block);

        assert_eq!(
            fighter.release(Side::Left, Condition::Block),
            Some(ConditionChange {
                side: Side::Left,
                condition: Condition::Neutral
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_timers() {
        let (mut fighter, mut rx) = local();
        fighter.apply_input(Side::Left, Condition::Punch);
        fighter.apply_input(Side::Right, Condition::Punch);
        fighter.reset();
        assert!(fighter.state().is_neutral());

        advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remote_updates_are_per_hand() {
        let mut remote = RemoteFighter::new();
        assert!(remote.apply_update(Side::Right, Condition::Block));
        assert!(!remote.apply_update(Side::Right, Condition::Block));
        assert_eq!(remote.state().left, Condition::Neutral);
        assert_eq!(remote.state().right, Condition::Block);

        remote.reset();
        assert!(remote.state().is_neutral());
    }
}
