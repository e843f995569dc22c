use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ── Entity types ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// A task. Gets exactly one reminder attached at creation time;
/// `notified` flips when that reminder's notification goes out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub priority: Priority,
    pub category: String,
    /// Suggested time of day to do the work. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimal_time: Option<NaiveTime>,
    /// When the attached reminder triggers.
    pub remind_at: DateTime<Utc>,
    pub completed: bool,
    pub notified: bool,
}

/// A one-shot alert tied to a task.
///
/// Lifecycle: pending → shown (`notification_shown`) → acknowledged
/// (`interacted`). Both flags are monotonic — they never flip back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub task_id: Uuid,
    pub at: DateTime<Utc>,
    pub message: String,
    pub interacted: bool,
    pub notification_shown: bool,
    /// Free-text note captured when the user acknowledges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub title: String,
    pub target_date: NaiveDate,
    /// Clamped at `target`. Only ever moves up.
    pub progress: u32,
    pub target: u32,
    pub unit: String,
    /// Ids of tasks counted toward this goal. Task deletion strips
    /// its id from here, so no dangling references survive.
    #[serde(default)]
    pub tasks: Vec<Uuid>,
}

// ── Commands ──────────────────────────────────────────────────

/// A command is something the caller wants to happen. The planner
/// validates it, applies it, and returns an Event (or an error).
#[derive(Debug, Clone)]
pub enum Command {
    CreateTask {
        title: String,
        description: Option<String>,
        due_date: NaiveDate,
        priority: Priority,
        category: String,
        optimal_time: Option<NaiveTime>,
        remind_at: DateTime<Utc>,
    },
    CreateGoal {
        title: String,
        target_date: NaiveDate,
        target: u32,
        unit: String,
    },
    ToggleTask {
        task_id: Uuid,
    },
    DeleteTask {
        task_id: Uuid,
    },
    DeleteGoal {
        goal_id: Uuid,
    },
    AdvanceGoal {
        goal_id: Uuid,
    },
    LinkTask {
        goal_id: Uuid,
        task_id: Uuid,
    },
    AcknowledgeReminder {
        reminder_id: Uuid,
        response: Option<String>,
    },
    /// Scheduler-internal: record that the notification for this
    /// reminder went out. Guarded so it can succeed at most once.
    FireReminder {
        reminder_id: Uuid,
    },
}

// ── Events ────────────────────────────────────────────────────

/// An event is what actually happened. Broadcast to all subscribers
/// (the in-context prompt path) after the snapshot is flushed.
#[derive(Debug, Clone)]
pub enum Event {
    TaskCreated {
        task: Task,
        reminder: Reminder,
    },
    TaskToggled {
        task_id: Uuid,
        completed: bool,
    },
    TaskDeleted {
        task_id: Uuid,
    },
    GoalCreated {
        goal: Goal,
    },
    GoalDeleted {
        goal_id: Uuid,
    },
    GoalAdvanced {
        goal_id: Uuid,
        progress: u32,
    },
    TaskLinked {
        goal_id: Uuid,
        task_id: Uuid,
    },
    ReminderAcknowledged {
        reminder_id: Uuid,
        task_id: Uuid,
    },
    ReminderFired {
        reminder_id: Uuid,
        task_id: Uuid,
        task_title: String,
        message: String,
    },
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerError {
    TaskNotFound,
    GoalNotFound,
    ReminderNotFound,
    /// Title was empty or all whitespace.
    EmptyTitle,
    /// Goal target must be at least 1.
    ZeroTarget,
    /// Goal progress already reached its target.
    GoalAlreadyMet,
    /// Task id already present in the goal's task set.
    AlreadyLinked,
    /// Reminder was acknowledged before.
    AlreadyAcknowledged,
    /// Notification already went out for this reminder.
    AlreadyShown,
}

impl std::fmt::Display for PlannerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlannerError::TaskNotFound => write!(f, "task not found"),
            PlannerError::GoalNotFound => write!(f, "goal not found"),
            PlannerError::ReminderNotFound => write!(f, "reminder not found"),
            PlannerError::EmptyTitle => write!(f, "title must not be empty"),
            PlannerError::ZeroTarget => write!(f, "target must be at least 1"),
            PlannerError::GoalAlreadyMet => write!(f, "goal already at target"),
            PlannerError::AlreadyLinked => write!(f, "task already linked to goal"),
            PlannerError::AlreadyAcknowledged => write!(f, "reminder already acknowledged"),
            PlannerError::AlreadyShown => write!(f, "notification already shown"),
        }
    }
}

impl std::error::Error for PlannerError {}

// ── The Planner ───────────────────────────────────────────────

/// The authoritative application state. Lives in memory. Loaded from
/// the save file on boot. All mutations go through apply() which
/// validates, mutates, and returns an Event for broadcast. A failed
/// command leaves the state untouched.
#[derive(Debug, Default)]
pub struct Planner {
    pub tasks: HashMap<Uuid, Task>,
    pub goals: HashMap<Uuid, Goal>,
    pub reminders: HashMap<Uuid, Reminder>,
}

impl Planner {
    pub fn new() -> Self {
        Planner::default()
    }

    /// Apply a command. This is THE mutation codepath — every state
    /// change, including the scheduler's fire cycle, goes through here.
    pub fn apply(&mut self, cmd: Command) -> Result<Event, PlannerError> {
        match cmd {
            Command::CreateTask {
                title,
                description,
                due_date,
                priority,
                category,
                optimal_time,
                remind_at,
            } => {
                let title = title.trim().to_string();
                if title.is_empty() {
                    return Err(PlannerError::EmptyTitle);
                }

                let task = Task {
                    id: Uuid::new_v4(),
                    title: title.clone(),
                    description: description.filter(|d| !d.trim().is_empty()),
                    due_date,
                    priority,
                    category,
                    optimal_time,
                    remind_at,
                    completed: false,
                    notified: false,
                };

                // One reminder per task, created together with it.
                let reminder = Reminder {
                    id: Uuid::new_v4(),
                    task_id: task.id,
                    at: remind_at,
                    message: format!("Time to work on: {title}"),
                    interacted: false,
                    notification_shown: false,
                    response: None,
                };

                self.tasks.insert(task.id, task.clone());
                self.reminders.insert(reminder.id, reminder.clone());
                Ok(Event::TaskCreated { task, reminder })
            }

            Command::CreateGoal {
                title,
                target_date,
                target,
                unit,
            } => {
                let title = title.trim().to_string();
                if title.is_empty() {
                    return Err(PlannerError::EmptyTitle);
                }
                if target == 0 {
                    return Err(PlannerError::ZeroTarget);
                }

                let goal = Goal {
                    id: Uuid::new_v4(),
                    title,
                    target_date,
                    progress: 0,
                    target,
                    unit,
                    tasks: Vec::new(),
                };

                self.goals.insert(goal.id, goal.clone());
                Ok(Event::GoalCreated { goal })
            }

            Command::ToggleTask { task_id } => {
                let task = self.tasks.get_mut(&task_id).ok_or(PlannerError::TaskNotFound)?;
                task.completed = !task.completed;
                let completed = task.completed;

                // Completing a task counts as acknowledging its reminders.
                if completed {
                    for reminder in self.reminders.values_mut() {
                        if reminder.task_id == task_id {
                            reminder.interacted = true;
                        }
                    }
                }

                Ok(Event::TaskToggled { task_id, completed })
            }

            Command::DeleteTask { task_id } => {
                if self.tasks.remove(&task_id).is_none() {
                    return Err(PlannerError::TaskNotFound);
                }

                self.reminders.retain(|_, r| r.task_id != task_id);
                for goal in self.goals.values_mut() {
                    goal.tasks.retain(|id| *id != task_id);
                }

                Ok(Event::TaskDeleted { task_id })
            }

            Command::DeleteGoal { goal_id } => {
                if self.goals.remove(&goal_id).is_none() {
                    return Err(PlannerError::GoalNotFound);
                }
                Ok(Event::GoalDeleted { goal_id })
            }

            Command::AdvanceGoal { goal_id } => {
                let goal = self.goals.get_mut(&goal_id).ok_or(PlannerError::GoalNotFound)?;
                if goal.progress >= goal.target {
                    return Err(PlannerError::GoalAlreadyMet);
                }
                goal.progress += 1;
                Ok(Event::GoalAdvanced {
                    goal_id,
                    progress: goal.progress,
                })
            }

            Command::LinkTask { goal_id, task_id } => {
                if !self.tasks.contains_key(&task_id) {
                    return Err(PlannerError::TaskNotFound);
                }
                let goal = self.goals.get_mut(&goal_id).ok_or(PlannerError::GoalNotFound)?;
                if goal.tasks.contains(&task_id) {
                    return Err(PlannerError::AlreadyLinked);
                }
                goal.tasks.push(task_id);
                Ok(Event::TaskLinked { goal_id, task_id })
            }

            Command::AcknowledgeReminder {
                reminder_id,
                response,
            } => {
                let reminder = self
                    .reminders
                    .get_mut(&reminder_id)
                    .ok_or(PlannerError::ReminderNotFound)?;
                if reminder.interacted {
                    return Err(PlannerError::AlreadyAcknowledged);
                }

                reminder.interacted = true;
                reminder.response = response.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
                let task_id = reminder.task_id;

                // Acknowledging the reminder completes the task.
                if let Some(task) = self.tasks.get_mut(&task_id) {
                    task.completed = true;
                }

                Ok(Event::ReminderAcknowledged { reminder_id, task_id })
            }

            Command::FireReminder { reminder_id } => {
                let reminder = self
                    .reminders
                    .get_mut(&reminder_id)
                    .ok_or(PlannerError::ReminderNotFound)?;
                if reminder.interacted {
                    return Err(PlannerError::AlreadyAcknowledged);
                }
                if reminder.notification_shown {
                    return Err(PlannerError::AlreadyShown);
                }

                let task_id = reminder.task_id;
                let task = self.tasks.get_mut(&task_id).ok_or(PlannerError::TaskNotFound)?;

                reminder.notification_shown = true;
                task.notified = true;

                Ok(Event::ReminderFired {
                    reminder_id,
                    task_id,
                    task_title: task.title.clone(),
                    message: reminder.message.clone(),
                })
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Reminders whose trigger time has arrived and that still need a
    /// notification: not interacted, not shown, owning task present.
    /// Monotonic in `now` — a due reminder stays due until fired.
    pub fn due_reminders(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut due: Vec<&Reminder> = self
            .reminders
            .values()
            .filter(|r| {
                !r.interacted
                    && !r.notification_shown
                    && r.at <= now
                    && self.tasks.contains_key(&r.task_id)
            })
            .collect();
        due.sort_by_key(|r| r.at);
        due.iter().map(|r| r.id).collect()
    }

    /// Open tasks, soonest due date first, higher priority breaking ties.
    pub fn pending_tasks(&self) -> Vec<&Task> {
        let mut pending: Vec<&Task> = self.tasks.values().filter(|t| !t.completed).collect();
        pending.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then(b.priority.cmp(&a.priority))
        });
        pending
    }

    pub fn completed_tasks(&self) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.completed).collect()
    }

    /// Reminders that went out but were never acknowledged. Reminders
    /// that have not fired yet are pending, not active.
    pub fn active_reminders(&self) -> Vec<&Reminder> {
        self.reminders
            .values()
            .filter(|r| r.notification_shown && !r.interacted)
            .collect()
    }

    /// Acknowledged reminders, for the history view.
    pub fn reminder_history(&self) -> Vec<&Reminder> {
        self.reminders.values().filter(|r| r.interacted).collect()
    }

    /// Goals, nearest target date first.
    pub fn goals_by_date(&self) -> Vec<&Goal> {
        let mut goals: Vec<&Goal> = self.goals.values().collect();
        goals.sort_by_key(|g| g.target_date);
        goals
    }
}

// ── Tests ──────────────────────────────────────────────────────
