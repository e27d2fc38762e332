//! Per-subsystem worker threads
//!
//! The task manager keeps one worker thread per subsystem that asked for
//! one. Work is sent over a crossbeam channel and the result comes back on
//! a one-shot channel, so a caller can hand the physics step to its worker
//! and wait for it. Subsystems without a worker run their work inline on
//! the calling thread; graphics never gets a worker because its context is
//! owned by the thread that drives the frame.
//!
//! A panicking task is caught on the worker and reported as
//! [`TaskError::Panicked`]; the worker keeps serving later tasks.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use thiserror::Error;

/// Engine subsystem a task belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subsystem {
    /// Audio device updates
    Audio,
    /// Input polling
    Input,
    /// Physics stepping
    Physics,
    /// Graphics context work; always inline
    Graphics,
    /// Script execution
    Scripting,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Audio => "audio",
            Self::Input => "input",
            Self::Physics => "physics",
            Self::Graphics => "graphics",
            Self::Scripting => "scripting",
        };
        f.write_str(name)
    }
}

/// A task did not produce a result
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task panicked
    #[error("{subsystem} task '{task}' panicked")]
    Panicked {
        /// Subsystem the task ran on
        subsystem: Subsystem,
        /// Task label
        task: String,
    },

    /// The worker went away before the task finished
    #[error("{subsystem} worker stopped before '{task}' finished")]
    WorkerStopped {
        /// Subsystem the task was sent to
        subsystem: Subsystem,
        /// Task label
        task: String,
    },
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(subsystem: Subsystem) -> std::io::Result<Self> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let handle = thread::Builder::new()
            .name(format!("dream-{subsystem}"))
            .spawn(move || {
                for job in receiver {
                    job();
                }
                log::debug!("{subsystem} worker exiting");
            })?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        // Closing the channel ends the worker loop
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Worker thread panicked while stopping");
            }
        }
    }
}

/// Pending result of a submitted task
pub struct TaskHandle<R> {
    subsystem: Subsystem,
    task: String,
    receiver: Receiver<thread::Result<R>>,
}

impl<R> TaskHandle<R> {
    /// Subsystem the task was sent to
    pub const fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// Block until the task finishes
    pub fn wait(self) -> Result<R, TaskError> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(TaskError::Panicked {
                subsystem: self.subsystem,
                task: self.task,
            }),
            Err(_) => Err(TaskError::WorkerStopped {
                subsystem: self.subsystem,
                task: self.task,
            }),
        }
    }
}

/// Owner of the subsystem workers
pub struct TaskManager {
    workers: HashMap<Subsystem, Worker>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::inline()
    }
}

impl TaskManager {
    /// Start a worker for each listed subsystem. A worker that cannot be
    /// spawned is logged and its subsystem runs inline. Graphics is always
    /// inline.
    pub fn new(subsystems: &[Subsystem]) -> Self {
        let mut workers = HashMap::new();
        for &subsystem in subsystems {
            if subsystem == Subsystem::Graphics || workers.contains_key(&subsystem) {
                continue;
            }
            match Worker::spawn(subsystem) {
                Ok(worker) => {
                    log::debug!("Started {subsystem} worker");
                    workers.insert(subsystem, worker);
                }
                Err(e) => log::warn!("Cannot start {subsystem} worker, running inline: {e}"),
            }
        }
        Self { workers }
    }

    /// A manager that runs everything on the calling thread
    pub fn inline() -> Self {
        Self {
            workers: HashMap::new(),
        }
    }

    /// Whether a subsystem has its own thread
    pub fn has_worker(&self, subsystem: Subsystem) -> bool {
        self.workers.contains_key(&subsystem)
    }

    /// Number of running workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Send a task to its subsystem's worker, or run it now when the
    /// subsystem has none
    pub fn submit<R, F>(&self, subsystem: Subsystem, task: &str, work: F) -> TaskHandle<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (result_tx, result_rx) = channel::bounded(1);
        let job = move || {
            let result = panic::catch_unwind(AssertUnwindSafe(work));
            // The submitter may have stopped waiting
            let _ = result_tx.send(result);
        };

        match self.workers.get(&subsystem).and_then(|w| w.sender.as_ref()) {
            Some(sender) => {
                if let Err(channel::SendError(job)) = sender.send(Box::new(job)) {
                    log::warn!("{subsystem} worker is gone, running '{task}' inline");
                    job();
                }
            }
            None => job(),
        }

        TaskHandle {
            subsystem,
            task: task.to_string(),
            receiver: result_rx,
        }
    }

    /// Submit a task and wait for its result
    pub fn run<R, F>(&self, subsystem: Subsystem, task: &str, work: F) -> Result<R, TaskError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        self.submit(subsystem, task, work).wait()
    }

    /// Stop every worker, waiting for queued tasks to finish
    pub fn shutdown(&mut self) {
        for (subsystem, mut worker) in self.workers.drain() {
            log::debug!("Stopping {subsystem} worker");
            worker.stop();
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_runs_on_named_worker() {
        let tasks = TaskManager::new(&[Subsystem::Physics]);
        assert!(tasks.has_worker(Subsystem::Physics));
        let name = tasks
            .run(Subsystem::Physics, "name", || thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("dream-physics"));
    }

    #[test]
    fn test_graphics_and_missing_workers_run_inline() {
        let tasks = TaskManager::new(&[Subsystem::Graphics]);
        assert!(!tasks.has_worker(Subsystem::Graphics));
        let caller = thread::current().id();
        let ran_on = tasks.run(Subsystem::Graphics, "id", || thread::current().id()).unwrap();
        assert_eq!(ran_on, caller);
        assert_eq!(tasks.run(Subsystem::Audio, "sum", || 2 + 2), Ok(4));
    }

    #[test]
    fn test_panic_is_reported_and_worker_survives() {
        let tasks = TaskManager::new(&[Subsystem::Scripting]);
        let result: Result<(), TaskError> = tasks.run(Subsystem::Scripting, "boom", || panic!("boom"));
        assert_eq!(
            result,
            Err(TaskError::Panicked {
                subsystem: Subsystem::Scripting,
                task: "boom".to_string()
            })
        );
        assert_eq!(tasks.run(Subsystem::Scripting, "after", || 7), Ok(7));
    }

    #[test]
    fn test_tasks_on_one_worker_run_in_order() {
        let mut tasks = TaskManager::new(&[Subsystem::Audio]);
        let handles: Vec<_> = (0..5).map(|i| tasks.submit(Subsystem::Audio, "n", move || i)).collect();
        let results: Vec<i32> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        tasks.shutdown();
        assert_eq!(tasks.worker_count(), 0);
    }
}
