//! Best-effort alert delivery.
//!
//! When a reminder fires, the scheduler hands an AlertNote to every
//! configured channel. Channels are independent: one failing (no
//! desktop notification service, audio unavailable) never blocks the
//! others, and never blocks the event broadcast — the sweep ignores
//! every deliver() result.

use std::io::{self, Write};
use std::time::Duration;
use uuid::Uuid;

/// How long a platform notification sticks around before auto-dismiss.
const DISMISS_AFTER: Duration = Duration::from_secs(30);

const ICON: &str = "appointment-soon";

/// Everything a channel gets to show for one fired reminder.
#[derive(Debug, Clone)]
pub struct AlertNote {
    pub title: String,
    pub body: String,
    /// Stable per-reminder id so a re-shown alert replaces the old one
    /// instead of stacking up.
    pub tag: u32,
    pub timeout: Duration,
}

impl AlertNote {
    pub fn new(reminder_id: Uuid, task_title: &str, message: &str) -> Self {
        AlertNote {
            title: format!("Reminder: {task_title}"),
            body: message.to_string(),
            tag: dedupe_tag(reminder_id),
            timeout: DISMISS_AFTER,
        }
    }
}

/// Fold a reminder id into the u32 the notification service uses for
/// replacement. Collisions only cost a replaced banner, nothing else.
fn dedupe_tag(id: Uuid) -> u32 {
    let bytes = id.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// One delivery channel. Implementations do their own failure handling
/// where they can; whatever error escapes is dropped by the caller.
pub trait AlertChannel: Send + Sync {
    fn deliver(&self, note: &AlertNote) -> io::Result<()>;
}

/// System-level alert via the desktop notification service.
pub struct DesktopAlert;

impl AlertChannel for DesktopAlert {
    fn deliver(&self, note: &AlertNote) -> io::Result<()> {
        notify_rust::Notification::new()
            .summary(&note.title)
            .body(&note.body)
            .icon(ICON)
            .id(note.tag)
            .timeout(notify_rust::Timeout::Milliseconds(
                note.timeout.as_millis() as u32
            ))
            .show()
            .map(|_| ())
            .map_err(io::Error::other)
    }
}

/// Audible cue: the terminal bell. Each delivery emits the cue from
/// scratch; there is no playback position to resume.
pub struct TerminalBell;

impl AlertChannel for TerminalBell {
    fn deliver(&self, _note: &AlertNote) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(b"\x07")?;
        out.flush()
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_carries_title_message_and_timeout() {
        let note = AlertNote::new(Uuid::new_v4(), "Pay rent", "Time to work on: Pay rent");
        assert_eq!(note.title, "Reminder: Pay rent");
        assert_eq!(note.body, "Time to work on: Pay rent");
        assert_eq!(note.timeout, Duration::from_secs(30));
    }

    #[test]
    fn dedupe_tag_is_stable_per_reminder() {
        let id = Uuid::new_v4();
        assert_eq!(dedupe_tag(id), dedupe_tag(id));

        let other = Uuid::new_v4();
        // Not a guarantee, but a collision here would mean the first
        // four random bytes matched.
        assert_ne!(dedupe_tag(id), dedupe_tag(other));
    }

    #[test]
    fn bell_delivery_succeeds() {
        let note = AlertNote::new(Uuid::new_v4(), "t", "m");
        TerminalBell.deliver(&note).unwrap();
    }
}
