//! Command router
//!
//! Routes incoming commands to the appropriate executor. Manages the
//! command lifecycle, idempotency deduplication, and rate limiting, and
//! fans status transitions out to registered listeners.
//!
//! The command table and idempotency index are never pruned: the gateway
//! is a single-process service whose state is expected to be cleared by
//! restart, and later status queries depend on indefinite retention.

use crate::model::{Command, CommandStatus};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Trailing admission window for the rate limiter.
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Pluggable handler for one command type.
///
/// `execute` is invoked outside the router's lock with a snapshot of the
/// freshly admitted command. Implementations perform their side effect on
/// whatever execution context they need (typically a spawned task) and
/// report the terminal outcome through the completion token; the router
/// makes no guarantee about which thread calls `execute`.
pub trait CommandExecutor<W>: Send + Sync {
    /// The command type this executor handles (e.g. `RESET_FUSE`).
    fn command_type(&self) -> &'static str;

    fn execute(&self, command: &Command, world: Arc<W>, completion: CommandCompletion);
}

/// Synchronous status-change hook. Subscribers must not block: the hook
/// may fire from a time-sensitive execution context.
pub type StatusListener = Box<dyn Fn(&Command) + Send + Sync>;

/// Result of a submission attempt.
///
/// `RateLimited` and `UnknownType` are synthetic rejections: no command is
/// stored, no id is allocated, and nothing can be queried later.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Admitted and dispatched; carries the RUNNING snapshot. The terminal
    /// state arrives asynchronously -- poll or subscribe for it.
    Accepted(Command),
    /// Idempotency hit; carries the existing command's current snapshot.
    Duplicate(Command),
    RateLimited,
    UnknownType(String),
}

struct RouterState {
    /// All commands, keyed by command id.
    commands: HashMap<String, Command>,
    /// Idempotency key -> command id.
    idempotency_index: HashMap<String, String>,
    /// Admission timestamps of recent commands, pruned lazily.
    recent_command_times: Vec<Instant>,
}

/// Lock-guarded command state plus the listener set, shared between the
/// router and outstanding completion tokens.
pub(crate) struct RouterCore {
    state: Mutex<RouterState>,
    listeners: RwLock<Vec<StatusListener>>,
    rate_limit: u32,
}

impl RouterCore {
    /// Listeners are invoked after the state lock is released so a
    /// subscriber can safely call back into the router.
    fn notify(&self, command: &Command) {
        for listener in self.listeners.read().iter() {
            listener(command);
        }
    }

    /// Apply a status transition and broadcast it. Transitions are
    /// strictly forward-moving; anything after a terminal state is
    /// dropped. Returns the updated snapshot.
    fn update_status(
        &self,
        command_id: &str,
        status: CommandStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Option<Command> {
        let snapshot = {
            let mut state = self.state.lock();
            let command = match state.commands.get_mut(command_id) {
                Some(command) => command,
                None => {
                    warn!(command = command_id, "status update for unknown command");
                    return None;
                }
            };
            if command.status.is_terminal() {
                warn!(
                    command = command_id,
                    current = %command.status,
                    rejected = %status,
                    "ignoring status update after terminal state"
                );
                return None;
            }
            command.status = status;
            if result.is_some() {
                command.result = result;
            }
            if error.is_some() {
                command.error = error;
            }
            command.clone()
        };

        info!(command = command_id, status = %snapshot.status, "command status changed");
        self.notify(&snapshot);
        Some(snapshot)
    }
}

/// One-shot token through which an executor reports a command's terminal
/// outcome. Consuming the token re-acquires the router's lock, so
/// executors never touch the command record directly.
pub struct CommandCompletion {
    core: Arc<RouterCore>,
    command_id: String,
}

impl CommandCompletion {
    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    pub fn succeed(self, result: Option<Value>) {
        self.core
            .update_status(&self.command_id, CommandStatus::Succeeded, result, None);
    }

    pub fn fail(self, error: impl Into<String>) {
        self.core.update_status(
            &self.command_id,
            CommandStatus::Failed,
            None,
            Some(error.into()),
        );
    }
}

/// The command router.
///
/// `W` is the execution-context handle passed through to executors (the
/// simulated plant in this repository; whatever world type an embedding
/// application provides otherwise).
pub struct CommandRouter<W> {
    core: Arc<RouterCore>,
    executors: RwLock<HashMap<String, Arc<dyn CommandExecutor<W>>>>,
    world: RwLock<Option<Arc<W>>>,
}

impl<W: Send + Sync + 'static> CommandRouter<W> {
    /// `rate_limit` is the process-global admission ceiling per second --
    /// all clients share one window.
    pub fn new(rate_limit: u32) -> Self {
        Self {
            core: Arc::new(RouterCore {
                state: Mutex::new(RouterState {
                    commands: HashMap::new(),
                    idempotency_index: HashMap::new(),
                    recent_command_times: Vec::new(),
                }),
                listeners: RwLock::new(Vec::new()),
                rate_limit,
            }),
            executors: RwLock::new(HashMap::new()),
            world: RwLock::new(None),
        }
    }

    /// Attach the execution-context handle passed to executors.
    pub fn set_world(&self, world: Arc<W>) {
        *self.world.write() = Some(world);
    }

    /// Register an executor for its command type. Re-registering a type
    /// overwrites the prior mapping.
    pub fn register_executor(&self, executor: Arc<dyn CommandExecutor<W>>) {
        let command_type = executor.command_type();
        self.executors
            .write()
            .insert(command_type.to_string(), executor);
        info!(command_type, "registered executor");
    }

    pub fn add_status_listener(&self, listener: StatusListener) {
        self.core.listeners.write().push(listener);
    }

    /// Submit a new command.
    ///
    /// Checks run in order: idempotency (a hit returns the existing
    /// command's current state, consuming no rate slot), rate limit, then
    /// type validation. An admitted command is stored QUEUED, moved to
    /// RUNNING, and handed to its executor without waiting for the
    /// terminal state.
    pub fn submit(
        &self,
        idempotency_key: &str,
        command_type: &str,
        payload: Option<Value>,
    ) -> SubmitOutcome {
        let executor = self.executors.read().get(command_type).cloned();

        let (queued, executor) = {
            let mut state = self.core.state.lock();

            if let Some(existing_id) = state.idempotency_index.get(idempotency_key) {
                if let Some(existing) = state.commands.get(existing_id) {
                    debug!(
                        idempotency_key,
                        command = %existing.id,
                        "idempotency hit, returning existing command"
                    );
                    return SubmitOutcome::Duplicate(existing.clone());
                }
            }

            let now = Instant::now();
            let window_start = now - RATE_WINDOW;
            state.recent_command_times.retain(|t| *t >= window_start);
            if state.recent_command_times.len() >= self.core.rate_limit as usize {
                warn!(command_type, limit = self.core.rate_limit, "rate limit exceeded");
                return SubmitOutcome::RateLimited;
            }

            let Some(executor) = executor else {
                warn!(command_type, "no executor registered for command type");
                return SubmitOutcome::UnknownType(command_type.to_string());
            };

            let command = Command {
                id: format!("cmd-{}", Uuid::new_v4().simple()),
                idempotency_key: idempotency_key.to_string(),
                command_type: command_type.to_string(),
                payload,
                status: CommandStatus::Queued,
                result: None,
                error: None,
            };
            state.commands.insert(command.id.clone(), command.clone());
            state
                .idempotency_index
                .insert(idempotency_key.to_string(), command.id.clone());
            state.recent_command_times.push(now);
            (command, executor)
        };

        info!(command = %queued.id, command_type, "command queued");
        self.core.notify(&queued);

        let running = match self
            .core
            .update_status(&queued.id, CommandStatus::Running, None, None)
        {
            Some(running) => running,
            // Unreachable for a freshly queued command; keep the snapshot usable.
            None => queued,
        };

        let completion = CommandCompletion {
            core: self.core.clone(),
            command_id: running.id.clone(),
        };
        match self.world.read().clone() {
            Some(world) => executor.execute(&running, world, completion),
            None => {
                warn!(command = %running.id, "no execution context attached");
                completion.fail("world not available");
            }
        }

        SubmitOutcome::Accepted(running)
    }

    /// Look up a command by id, returning its current snapshot.
    pub fn get(&self, command_id: &str) -> Option<Command> {
        self.core.state.lock().commands.get(command_id).cloned()
    }
}
