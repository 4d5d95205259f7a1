//! Klingel- und Gesprächszähler

use crate::bus::{EngineInput, TimerKind};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Anzeige-Takt beider Zähler
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Formatiert eine Dauer für die Anzeige
///
/// Unter einer Minute `00:SS`, unter einer Stunde `MM:SS`, unter einem Tag
/// `HH:MM:SS`. Ab einem Tag wird `00:00:00` angezeigt.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();

    if secs < 60 {
        format!("00:{:02}", secs)
    } else if secs < 3_600 {
        format!("{:02}:{:02}", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{:02}:{:02}:{:02}", secs / 3_600, (secs % 3_600) / 60, secs % 60)
    } else {
        "00:00:00".to_string()
    }
}

/// Periodischer Zähler, der Ticks in die Eingangs-Queue legt
///
/// Wird beim Drop abgebrochen, ein Zähler kann also nie seine Session
/// überleben.
pub struct TickTimer {
    started: Instant,
    task: JoinHandle<()>,
}

impl TickTimer {
    pub fn start(
        session_id: Uuid,
        timer: TimerKind,
        period: Duration,
        tx: mpsc::UnboundedSender<EngineInput>,
    ) -> Self {
        let started = Instant::now();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(started + period, period);
            loop {
                interval.tick().await;
                if tx.send(EngineInput::Tick { session_id, timer }).is_err() {
                    break;
                }
            }
        });

        Self { started, task }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn formatted(&self) -> String {
        format_duration(self.elapsed())
    }
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for TickTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickTimer")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}
