use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use nudge::app::{dispatch, AppState, SharedState};
use nudge::notify::{AlertChannel, DesktopAlert, TerminalBell};
use nudge::persist::SaveFile;
use nudge::planner::{Command, Event, Priority};
use nudge::scheduler::ReminderScheduler;

#[derive(Parser)]
#[command(name = "nudge", version, about = "Task reminders on a polling scheduler")]
struct Cli {
    /// Path to the save file.
    #[arg(long, global = true, default_value = "nudge.redb")]
    data: PathBuf,

    /// Scheduler poll interval in seconds.
    #[arg(long, global = true, default_value = "30")]
    tick_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reminder daemon until interrupted.
    Run,

    /// Add a task; its reminder is created with it.
    Add {
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// Due date, YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        due: Option<NaiveDate>,

        #[arg(long, value_enum, default_value = "medium")]
        priority: PriorityArg,

        #[arg(long, default_value = "general")]
        category: String,

        /// Suggested time of day to do the work, HH:MM.
        #[arg(long)]
        optimal: Option<NaiveTime>,

        /// When to remind (UTC), "YYYY-MM-DDTHH:MM" or RFC 3339.
        /// Defaults to one hour from now.
        #[arg(long, value_parser = parse_when)]
        at: Option<DateTime<Utc>>,
    },

    /// Add a goal.
    Goal {
        title: String,

        /// How many units count as done.
        #[arg(long)]
        target: u32,

        #[arg(long, default_value = "tasks")]
        unit: String,

        /// Target date, YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        by: Option<NaiveDate>,
    },

    /// Show tasks, goals, and reminders awaiting acknowledgment.
    List,

    /// Toggle a task's completion flag.
    Done { task_id: Uuid },

    /// Delete a task (its reminder goes with it).
    Rm { task_id: Uuid },

    /// Delete a goal.
    RmGoal { goal_id: Uuid },

    /// Bump a goal's progress by one.
    Advance { goal_id: Uuid },

    /// Count a task toward a goal.
    Link { goal_id: Uuid, task_id: Uuid },

    /// Acknowledge a fired reminder, optionally with a response note.
    Ack {
        reminder_id: Uuid,

        #[arg(long)]
        response: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Low,
    Medium,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::High => Priority::High,
        }
    }
}

/// Accept RFC 3339 or the shorter "YYYY-MM-DDTHH:MM" (taken as UTC).
fn parse_when(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("unrecognized timestamp {s:?}: {e}"))
}

fn boot(data: &Path) -> SharedState {
    let save_file = SaveFile::open(data).expect("failed to open save file");
    let planner = save_file.load_planner().expect("failed to read save file");

    info!(
        tasks = planner.tasks.len(),
        goals = planner.goals.len(),
        reminders = planner.reminders.len(),
        "planner loaded"
    );

    AppState::new(planner, save_file)
}

/// Dispatch one command and bail with a readable message if rejected.
fn run_command(state: &SharedState, cmd: Command) -> Event {
    match dispatch(state, cmd) {
        Ok(event) => event,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let state = boot(&cli.data);
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::Run => {
            // In-context prompt: fired reminders always land on the
            // terminal, whatever the alert channels manage.
            let mut events = state.events_tx.subscribe();
            let printer = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if let Event::ReminderFired {
                        reminder_id,
                        task_title,
                        message,
                        ..
                    } = event
                    {
                        println!("⏰ {task_title}: {message}");
                        println!("   acknowledge with: nudge ack {reminder_id}");
                    }
                }
            });

            let channels: Vec<Box<dyn AlertChannel>> =
                vec![Box::new(TerminalBell), Box::new(DesktopAlert)];
            let scheduler = ReminderScheduler::start(
                state.clone(),
                channels,
                Duration::from_secs(cli.tick_secs),
            );
            info!(every_secs = cli.tick_secs, "scheduler running, ctrl-c to stop");

            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            scheduler.stop().await;
            printer.abort();
            info!("scheduler stopped");
        }

        Commands::Add {
            title,
            description,
            due,
            priority,
            category,
            optimal,
            at,
        } => {
            let event = run_command(
                &state,
                Command::CreateTask {
                    title,
                    description,
                    due_date: due.unwrap_or(today),
                    priority: priority.into(),
                    category,
                    optimal_time: optimal,
                    remind_at: at.unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1)),
                },
            );
            if let Event::TaskCreated { task, reminder } = event {
                println!("added task {} ({})", task.id, task.title);
                println!("reminder set for {}", reminder.at.format("%Y-%m-%d %H:%M UTC"));
            }
        }

        Commands::Goal {
            title,
            target,
            unit,
            by,
        } => {
            let event = run_command(
                &state,
                Command::CreateGoal {
                    title,
                    target_date: by.unwrap_or(today),
                    target,
                    unit,
                },
            );
            if let Event::GoalCreated { goal } = event {
                println!("added goal {} ({})", goal.id, goal.title);
            }
        }

        Commands::List => {
            let planner = state.planner.read().unwrap();

            let pending = planner.pending_tasks();
            println!("{} open task(s)", pending.len());
            for task in pending {
                let bell = if task.notified { " 🔔" } else { "" };
                println!(
                    "  {}  [{}] {} (due {}, remind {}){bell}",
                    task.id,
                    task.priority,
                    task.title,
                    task.due_date,
                    task.remind_at.format("%Y-%m-%d %H:%M"),
                );
            }

            let completed = planner.completed_tasks();
            if !completed.is_empty() {
                println!("{} completed task(s)", completed.len());
            }

            let goals = planner.goals_by_date();
            if !goals.is_empty() {
                println!("{} goal(s)", goals.len());
                for goal in goals {
                    println!(
                        "  {}  {} — {}/{} {} by {}",
                        goal.id, goal.title, goal.progress, goal.target, goal.unit, goal.target_date,
                    );
                }
            }

            let active = planner.active_reminders();
            if !active.is_empty() {
                println!("{} reminder(s) awaiting acknowledgment", active.len());
                for reminder in active {
                    println!("  {}  {}", reminder.id, reminder.message);
                }
            }

            let history = planner.reminder_history();
            if !history.is_empty() {
                println!("{} acknowledged reminder(s)", history.len());
                for reminder in history {
                    match &reminder.response {
                        Some(response) => {
                            println!("  {}  {} ({response})", reminder.id, reminder.message)
                        }
                        None => println!("  {}  {}", reminder.id, reminder.message),
                    }
                }
            }
        }

        Commands::Done { task_id } => {
            if let Event::TaskToggled { completed, .. } =
                run_command(&state, Command::ToggleTask { task_id })
            {
                println!("task marked {}", if completed { "done" } else { "open" });
            }
        }

        Commands::Rm { task_id } => {
            run_command(&state, Command::DeleteTask { task_id });
            println!("task deleted");
        }

        Commands::RmGoal { goal_id } => {
            run_command(&state, Command::DeleteGoal { goal_id });
            println!("goal deleted");
        }

        Commands::Advance { goal_id } => {
            if let Event::GoalAdvanced { progress, .. } =
                run_command(&state, Command::AdvanceGoal { goal_id })
            {
                println!("progress: {progress}");
            }
        }

        Commands::Link { goal_id, task_id } => {
            run_command(&state, Command::LinkTask { goal_id, task_id });
            println!("task linked");
        }

        Commands::Ack {
            reminder_id,
            response,
        } => {
            run_command(
                &state,
                Command::AcknowledgeReminder {
                    reminder_id,
                    response,
                },
            );
            println!("reminder acknowledged, task completed");
        }
    }
}
