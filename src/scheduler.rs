//! The reminder scheduler: a fixed-cadence poll over the planner.
//!
//! Each tick scans for due reminders and runs the fire cycle per hit:
//! FireReminder through the normal dispatch path (flips the guard
//! flags, flushes the snapshot, broadcasts ReminderFired), then
//! best-effort delivery through the configured alert channels.
//!
//! There is no retry or backoff. Due-ness only moves forward in time,
//! so anything a missed tick skips is still due on the next one.

use crate::app::{dispatch, SharedState};
use crate::notify::{AlertChannel, AlertNote};
use crate::planner::{Command, Event};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct ReminderScheduler {
    shutdown: watch::Sender<bool>,
    ticker: JoinHandle<()>,
}

impl ReminderScheduler {
    /// Spawn the tick loop. The first check runs immediately; after
    /// that the cadence is `every`.
    pub fn start(
        state: SharedState,
        channels: Vec<Box<dyn AlertChannel>>,
        every: Duration,
    ) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);

        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        sweep(&state, &channels, Utc::now());
                    }
                    _ = stopped.changed() => break,
                }
            }
        });

        ReminderScheduler { shutdown, ticker }
    }

    /// Stop the tick loop and wait for it to wind down.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.ticker.await;
    }
}

/// One poll: fire every reminder due at `now`. Returns how many fired.
///
/// The broadcast inside dispatch() is the always-delivered in-context
/// prompt; the alert channels run after it and their failures are
/// dropped on the floor.
pub fn sweep(state: &SharedState, channels: &[Box<dyn AlertChannel>], now: DateTime<Utc>) -> usize {
    let due = { state.planner.read().unwrap().due_reminders(now) };

    let mut fired = 0;
    for reminder_id in due {
        match dispatch(state, Command::FireReminder { reminder_id }) {
            Ok(Event::ReminderFired {
                task_title,
                message,
                ..
            }) => {
                info!(%reminder_id, task = %task_title, "reminder fired");
                let note = AlertNote::new(reminder_id, &task_title, &message);
                for channel in channels {
                    let _ = channel.deliver(&note);
                }
                fired += 1;
            }
            Ok(_) => {}
            // Lost a race with an acknowledge between scan and apply;
            // nothing to do.
            Err(e) => debug!(%reminder_id, "fire skipped: {e}"),
        }
    }
    fired
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppState;
    use crate::persist::SaveFile;
    use crate::planner::{Planner, Priority};
    use chrono::{NaiveDate, TimeZone};
    use std::fs;
    use std::io;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    fn temp_state(name: &str) -> (SharedState, String) {
        let path = format!("/tmp/nudge_sched_{name}_{}.redb", std::process::id());
        let _ = fs::remove_file(&path);
        let sf = SaveFile::open(&path).unwrap();
        (AppState::new(Planner::new(), sf), path)
    }

    fn add_task(state: &SharedState, title: &str, remind_at: DateTime<Utc>) -> (Uuid, Uuid) {
        let event = dispatch(
            state,
            Command::CreateTask {
                title: title.into(),
                description: None,
                due_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                priority: Priority::Medium,
                category: "work".into(),
                optimal_time: None,
                remind_at,
            },
        )
        .unwrap();

        match event {
            Event::TaskCreated { task, reminder } => (task.id, reminder.id),
            _ => panic!("expected TaskCreated"),
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    /// Channel that records what it was asked to deliver.
    struct Recorder(Arc<Mutex<Vec<AlertNote>>>);

    impl AlertChannel for Recorder {
        fn deliver(&self, note: &AlertNote) -> io::Result<()> {
            self.0.lock().unwrap().push(note.clone());
            Ok(())
        }
    }

    /// Channel that always fails, standing in for a blocked platform.
    struct Broken;

    impl AlertChannel for Broken {
        fn deliver(&self, _note: &AlertNote) -> io::Result<()> {
            Err(io::Error::other("no notification service"))
        }
    }

    #[test]
    fn sweep_fires_due_reminders_exactly_once() {
        let (state, path) = temp_state("once");
        let (task_id, _) = add_task(&state, "Standup", at(10, 0));

        // Before the trigger: nothing happens.
        assert_eq!(sweep(&state, &[], at(9, 59)), 0);

        // At the trigger: one fire cycle.
        assert_eq!(sweep(&state, &[], at(10, 0)), 1);
        assert!(state.planner.read().unwrap().tasks[&task_id].notified);

        // Any later tick: already shown, nothing fires again.
        assert_eq!(sweep(&state, &[], at(10, 0)), 0);
        assert_eq!(sweep(&state, &[], at(12, 0)), 0);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn broken_channel_never_blocks_the_others() {
        let (state, path) = temp_state("broken");
        add_task(&state, "Call home", at(10, 0));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let channels: Vec<Box<dyn AlertChannel>> =
            vec![Box::new(Broken), Box::new(Recorder(seen.clone()))];

        assert_eq!(sweep(&state, &channels, at(10, 0)), 1);

        let notes = seen.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].title.contains("Call home"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn fired_reminder_reaches_broadcast_subscribers() {
        let (state, path) = temp_state("broadcast");
        let (_, reminder_id) = add_task(&state, "Review", at(10, 0));
        let mut events = state.events_tx.subscribe();

        sweep(&state, &[], at(10, 0));

        match events.try_recv().unwrap() {
            Event::ReminderFired { reminder_id: id, task_title, .. } => {
                assert_eq!(id, reminder_id);
                assert_eq!(task_title, "Review");
            }
            other => panic!("expected ReminderFired, got {other:?}"),
        }

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn acknowledged_reminders_are_skipped() {
        let (state, path) = temp_state("acked");
        let (_, reminder_id) = add_task(&state, "Old news", at(10, 0));

        dispatch(
            &state,
            Command::AcknowledgeReminder {
                reminder_id,
                response: None,
            },
        )
        .unwrap();

        assert_eq!(sweep(&state, &[], at(10, 0)), 0);

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn scheduler_lifecycle_fires_and_stops() {
        let (state, path) = temp_state("lifecycle");
        // Reminder already due: the immediate first tick picks it up.
        let (task_id, _) = add_task(&state, "Overdue", at(10, 0));

        // Subscribe before starting so the first tick can't outrun us.
        let mut events = state.events_tx.subscribe();
        let scheduler =
            ReminderScheduler::start(state.clone(), Vec::new(), Duration::from_millis(10));
        let fired = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match events.recv().await {
                    Ok(Event::ReminderFired { task_id: id, .. }) => break id,
                    Ok(_) => continue,
                    Err(e) => panic!("event channel closed: {e}"),
                }
            }
        })
        .await
        .expect("scheduler never fired");
        assert_eq!(fired, task_id);

        // Teardown is explicit and deterministic.
        scheduler.stop().await;

        let _ = fs::remove_file(&path);
    }
}
