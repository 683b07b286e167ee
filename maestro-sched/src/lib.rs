//! MAESTRO Scheduler - Recurring Work
//!
//! Converts a frequency specification into concrete future run times and
//! fires tasks through the injected agent invoker. A polling loop wakes on a
//! fixed interval; every due task is fired independently (fire-and-continue),
//! so a slow task never blocks other due tasks in the same tick.
//!
//! # Usage
//!
//! ```ignore
//! use maestro_sched::{Frequency, Scheduler, SchedulerConfig};
//! use tokio::sync::watch;
//!
//! let scheduler = Arc::new(Scheduler::new(invoker, SchedulerConfig::default()));
//! let task_id = scheduler.schedule(
//!     "daily-digest",
//!     "report_agent",
//!     json!({"channel": "email"}),
//!     Frequency::Daily { hour: 9, minute: 0 },
//!     None,
//! )?;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

mod frequency;
mod scheduler;

pub use frequency::Frequency;
pub use scheduler::{
    ScheduledTask, Scheduler, SchedulerConfig, SchedulerMetrics, SchedulerSnapshot,
};
