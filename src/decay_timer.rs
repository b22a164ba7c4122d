// Punch-decay timers
// One abortable tokio task per hand. A firing timer does not touch state itself:
// it posts a DecayFired back into the session loop, which claims it against the
// generation currently armed for that hand. A timer that was replaced or
// cancelled can therefore never apply its effect, even if its message was
// already queued when the cancel happened.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::condition::Side;
use crate::fields;

/// Default delay before a punch reverts to neutral.
pub const DEFAULT_PUNCH_DECAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecayFired {
    pub side: Side,
    pub generation: u64,
}

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Debug)]
pub struct PunchTimers {
    delay: Duration,
    fired_tx: mpsc::UnboundedSender<DecayFired>,
    armed: [Option<ArmedTimer>; 2],
    next_generation: u64,
}

impl PunchTimers {
    pub fn new(delay: Duration, fired_tx: mpsc::UnboundedSender<DecayFired>) -> Self {
        Self {
            delay,
            fired_tx,
            armed: [None, None],
            next_generation: 1,
        }
    }

    /// Arms (or re-arms) the timer for `side`, cancelling any live one first.
    pub fn arm(&mut self, side: Side) -> u64 {
        self.cancel(side);

        let generation = self.next_generation;
        self.next_generation += 1;

        // Deadline is fixed here, not when the task is first polled.
        let sleep = tokio::time::sleep(self.delay);
        let fired_tx = self.fired_tx.clone();
        let task = tokio::spawn(async move {
            sleep.await;
            // Receiver gone means the session was torn down.
            let _ = fired_tx.send(DecayFired { side, generation });
        });

        trace!(
            { fields::SIDE } = %side,
            { fields::GENERATION } = generation,
            { fields::DELAY_MS } = self.delay.as_millis() as u64,
            "Punch decay armed"
        );
        self.armed[side.index()] = Some(ArmedTimer { generation, task });
        generation
    }

    /// Returns true if a live timer was cancelled.
    pub fn cancel(&mut self, side: Side) -> bool {
        match self.armed[side.index()].take() {
            Some(timer) => {
                timer.task.abort();
                trace!(
                    { fields::SIDE } = %side,
                    { fields::GENERATION } = timer.generation,
                    "Punch decay cancelled"
                );
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for side in Side::BOTH {
            self.cancel(side);
        }
    }

    /// Consumes a fire notification. Only the live generation for that side is
    /// accepted, and accepting it disarms the side.
    pub fn claim(&mut self, fired: DecayFired) -> bool {
        let slot = &mut self.armed[fired.side.index()];
        let live = matches!(slot, Some(timer) if timer.generation == fired.generation);
        if live {
            *slot = None;
        } else {
            trace!(
                { fields::SIDE } = %fired.side,
                { fields::GENERATION } = fired.generation,
                "Stale punch decay ignored"
            );
        }
        live
    }

    #[cfg(test)]
    pub fn is_armed(&self, side: Side) -> bool {
        self.armed[side.index()].is_some()
    }
}

impl Drop for PunchTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn timers() -> (PunchTimers, mpsc::UnboundedReceiver<DecayFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PunchTimers::new(DEFAULT_PUNCH_DECAY, tx), rx)
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let (mut timers, mut rx) = timers();
        let generation = timers.arm(Side::Left);

        advance(Duration::from_millis(249)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        advance(Duration::from_millis(1)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(
            fired,
            DecayFired {
                side: Side::Left,
                generation
            }
        );
        assert!(timers.claim(fired));
        assert!(!timers.is_armed(Side::Left));
        assert!(!timers.claim(fired), "a fire is claimed at most once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let (mut timers, mut rx) = timers();
        let first = timers.arm(Side::Right);
        advance(Duration::from_millis(200)).await;
        let second = timers.arm(Side::Right);
        assert_ne!(first, second);

        // The first deadline passes without a fire.
        advance(Duration::from_millis(100)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        advance(Duration::from_millis(150)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.generation, second);
        assert!(timers.claim(fired));

        advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (mut timers, mut rx) = timers();
        timers.arm(Side::Left);
        assert!(timers.cancel(Side::Left));
        assert!(!timers.cancel(Side::Left));

        advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_fire_is_stale_after_cancel() {
        let (mut timers, mut rx) = timers();
        timers.arm(Side::Left);
        advance(DEFAULT_PUNCH_DECAY).await;
        let fired = rx.recv().await.unwrap();

        // Cancelled after the message was queued but before it was handled.
        timers.cancel(Side::Left);
        assert!(!timers.claim(fired));

        timers.arm(Side::Left);
        assert!(!timers.claim(fired), "old generation never matches a new timer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sides_are_independent() {
        let (mut timers, mut rx) = timers();
        timers.arm(Side::Left);
        let right = timers.arm(Side::Right);
        timers.cancel(Side::Left);

        advance(DEFAULT_PUNCH_DECAY).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.side, Side::Right);
        assert_eq!(fired.generation, right);
        settle().await;
        assert!(rx.try_recv().is_err());
    }
}
