// Render boundary: read-only snapshots pushed out of the core.
// Presentation lives elsewhere; the binary only ships a tracing-backed sink.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::condition::{Color, FighterState};
use crate::connection::LinkStatus;
use crate::fields;
use crate::phase::GamePhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub phase: GamePhase,
    pub local_color: Color,
    pub opponent_color: Color,
    pub local: FighterState,
    pub remote: FighterState,
    /// Display flags for the losing fighter's head.
    pub local_lost: bool,
    pub remote_lost: bool,
    pub link: LinkStatus,
    pub punch_blocked: Option<Color>,
}

pub trait RenderSink {
    fn render(&mut self, snapshot: &Snapshot);
}

/// Renders the current snapshot, then every published change until the
/// session drops its sender.
pub async fn drive_renderer<S: RenderSink>(mut snapshots: watch::Receiver<Snapshot>, mut sink: S) {
    let current = *snapshots.borrow_and_update();
    sink.render(&current);
    while snapshots.changed().await.is_ok() {
        let snapshot = *snapshots.borrow_and_update();
        sink.render(&snapshot);
    }
}

/// Logs phase changes at info and everything else at debug.
#[derive(Debug, Default)]
pub struct LogRenderer {
    last: Option<Snapshot>,
}

impl RenderSink for LogRenderer {
    fn render(&mut self, snapshot: &Snapshot) {
        let phase_changed = self.last.map(|last| last.phase) != Some(snapshot.phase);
        let link_changed = self.last.map(|last| last.link) != Some(snapshot.link);

        if phase_changed {
            info!(
                { fields::PHASE } = snapshot.phase.name(),
                { fields::LOCAL_COLOR } = %snapshot.local_color,
                { fields::OPPONENT_COLOR } = %snapshot.opponent_color,
                local_lost = snapshot.local_lost,
                remote_lost = snapshot.remote_lost,
                "Phase"
            );
        }
        if link_changed {
            info!({ fields::LINK_STATUS } = ?snapshot.link, "Link");
        }
        debug!(
            local_left = %snapshot.local.left,
            local_right = %snapshot.local.right,
            remote_left = %snapshot.remote.left,
            remote_right = %snapshot.remote.right,
            punch_blocked = ?snapshot.punch_blocked,
            "Fighters"
        );

        self.last = Some(*snapshot);
    }
}
