//! Shared application state and the command dispatch path.
//!
//! The presentation layer (CLI, scheduler) only ever calls dispatch();
//! it never reaches into the planner directly for writes.

use crate::persist::SaveFile;
use crate::planner::{Command, Event, Planner, PlannerError};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub struct AppState {
    pub planner: RwLock<Planner>,
    pub save_file: SaveFile,
    /// Domain events, published after every successful mutation. This
    /// is the in-context prompt channel: subscribers refresh their view
    /// from it, and fired reminders always land here regardless of what
    /// the best-effort alert channels manage to deliver.
    pub events_tx: broadcast::Sender<Event>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(planner: Planner, save_file: SaveFile) -> SharedState {
        let (events_tx, _) = broadcast::channel(256);
        Arc::new(AppState {
            planner: RwLock::new(planner),
            save_file,
            events_tx,
        })
    }
}

/// Apply a command to the planner, flush the snapshot, broadcast the
/// event. All synchronous under the write lock — microseconds at this
/// scale, and the single lock is what makes mutations atomic relative
/// to each other.
pub fn dispatch(state: &SharedState, cmd: Command) -> Result<Event, PlannerError> {
    let event = {
        let mut planner = state.planner.write().unwrap();
        match planner.apply(cmd) {
            Ok(event) => {
                // Flush the whole snapshot (sync, small).
                if let Err(e) = state.save_file.flush(&planner) {
                    warn!("save file flush failed: {e}");
                }
                event
            }
            Err(e) => {
                debug!("command rejected: {e}");
                return Err(e);
            }
        }
    };

    // No subscribers is fine — one-shot CLI commands run without any.
    let _ = state.events_tx.send(event.clone());
    Ok(event)
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Priority;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::fs;

    fn temp_state(name: &str) -> (SharedState, String) {
        let path = format!("/tmp/nudge_app_{name}_{}.redb", std::process::id());
        let _ = fs::remove_file(&path);
        let sf = SaveFile::open(&path).unwrap();
        let planner = sf.load_planner().unwrap();
        (AppState::new(planner, sf), path)
    }

    fn create_cmd(title: &str) -> Command {
        Command::CreateTask {
            title: title.into(),
            description: None,
            due_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            priority: Priority::Medium,
            category: "work".into(),
            optimal_time: None,
            remind_at: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn dispatch_persists_and_broadcasts() {
        let (state, path) = temp_state("dispatch");
        let mut events = state.events_tx.subscribe();

        let event = dispatch(&state, create_cmd("Ship it")).unwrap();
        let task_id = match &event {
            Event::TaskCreated { task, .. } => task.id,
            _ => panic!("expected TaskCreated"),
        };

        // Broadcast carries the same event.
        match events.try_recv().unwrap() {
            Event::TaskCreated { task, .. } => assert_eq!(task.id, task_id),
            _ => panic!("expected TaskCreated on the channel"),
        }

        // And the snapshot already has it.
        let reloaded = state.save_file.load_planner().unwrap();
        assert!(reloaded.tasks.contains_key(&task_id));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn rejected_commands_neither_persist_nor_broadcast() {
        let (state, path) = temp_state("rejected");
        let mut events = state.events_tx.subscribe();

        let result = dispatch(&state, create_cmd("  "));
        assert_eq!(result.unwrap_err(), PlannerError::EmptyTitle);
        assert!(events.try_recv().is_err());

        let reloaded = state.save_file.load_planner().unwrap();
        assert!(reloaded.tasks.is_empty());

        let _ = fs::remove_file(&path);
    }
}
