//! In-memory managed resources.
//!
//! A [`Resource`] is the thing a WebSocket session attaches to. It carries the
//! suspension flag checked when a session opens, the deletion token every
//! session watches, and the registry used to force-close sessions in bulk.
//! Power state and the console backlog give inbound events something to act on.

mod manager;
mod registry;

pub use manager::ResourceManager;
pub use registry::SessionRegistry;

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tether_core::messages::{CONSOLE_OUTPUT, STATUS};
use tether_core::{HandlerError, OutboundMessage, ResourceId};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Capacity of the per-resource event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Power state of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Not running.
    Offline,
    /// Running and accepting console input.
    Running,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => f.write_str("offline"),
            Self::Running => f.write_str("running"),
        }
    }
}

/// A requested power transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerAction {
    /// Offline → Running.
    Start,
    /// Running → Offline.
    Stop,
    /// Any → Running.
    Restart,
    /// Running → Offline, without a graceful stop.
    Kill,
}

impl FromStr for PowerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "kill" => Ok(Self::Kill),
            other => Err(format!("unknown power action '{other}'")),
        }
    }
}

impl PowerAction {
    fn target(self) -> PowerState {
        match self {
            Self::Start | Self::Restart => PowerState::Running,
            Self::Stop | Self::Kill => PowerState::Offline,
        }
    }
}

/// Point-in-time view of a resource, used by the admin API and `send stats`.
#[derive(Clone, Debug, Serialize)]
pub struct ResourceSnapshot {
    /// Resource id.
    pub id: ResourceId,
    /// Current power state.
    pub state: PowerState,
    /// Whether the resource is suspended.
    pub suspended: bool,
    /// Open WebSocket sessions.
    pub sessions: usize,
    /// Lines currently held in the console backlog.
    pub console_lines: usize,
}

/// A managed resource.
pub struct Resource {
    id: ResourceId,
    suspended: AtomicBool,
    state: RwLock<PowerState>,
    console: Mutex<VecDeque<String>>,
    backlog_capacity: usize,
    events: broadcast::Sender<OutboundMessage>,
    deletion: CancellationToken,
    sessions: SessionRegistry,
}

impl Resource {
    /// Create an offline, unsuspended resource.
    ///
    /// `backlog_capacity` bounds the console backlog; a zero capacity is
    /// treated as one line.
    pub fn new(id: ResourceId, backlog_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let backlog_capacity = backlog_capacity.max(1);
        Self {
            id,
            suspended: AtomicBool::new(false),
            state: RwLock::new(PowerState::Offline),
            console: Mutex::new(VecDeque::with_capacity(backlog_capacity)),
            backlog_capacity,
            events,
            deletion: CancellationToken::new(),
            sessions: SessionRegistry::new(),
        }
    }

    /// Resource id.
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Sessions attached to this resource.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Token cancelled when the resource is deleted.
    pub fn deletion_token(&self) -> CancellationToken {
        self.deletion.clone()
    }

    /// Whether [`Resource::delete`] has run.
    pub fn is_deleted(&self) -> bool {
        self.deletion.is_cancelled()
    }

    /// Whether new sessions are refused and power/console actions rejected.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Mark the resource suspended.
    ///
    /// Open sessions are not closed; they end the next time a handler reports
    /// the suspension. New sessions are rejected with close code 4409.
    pub fn suspend(&self) {
        if !self.suspended.swap(true, Ordering::AcqRel) {
            info!(resource_id = %self.id, "resource suspended");
        }
    }

    /// Clear the suspension flag.
    pub fn unsuspend(&self) {
        if self.suspended.swap(false, Ordering::AcqRel) {
            info!(resource_id = %self.id, "resource unsuspended");
        }
    }

    /// Cancel the deletion token and every registered session.
    ///
    /// Returns the number of sessions that were cancelled through the registry.
    pub fn delete(&self) -> usize {
        self.deletion.cancel();
        let cancelled = self.sessions.cancel_all();
        info!(resource_id = %self.id, sessions = cancelled, "resource deleted");
        cancelled
    }

    /// Current power state.
    pub fn power_state(&self) -> PowerState {
        *self.state.read()
    }

    /// Apply a power action and return the resulting state.
    pub fn power(&self, action: PowerAction) -> Result<PowerState, HandlerError> {
        if self.is_suspended() {
            return Err(HandlerError::Suspended);
        }
        let target = action.target();
        let previous = std::mem::replace(&mut *self.state.write(), target);
        debug!(resource_id = %self.id, ?action, %previous, %target, "power action applied");

        if previous != target || action == PowerAction::Restart {
            self.push_console_line(format!("[tether] server marked as {target}"));
        }
        self.publish(OutboundMessage::event(STATUS, vec![target.to_string()]));
        Ok(target)
    }

    /// Write a line of console input.
    pub fn send_command(&self, line: &str) -> Result<(), HandlerError> {
        if self.is_suspended() {
            return Err(HandlerError::Suspended);
        }
        if self.power_state() != PowerState::Running {
            return Err(HandlerError::NotRunning);
        }
        self.push_console_line(format!("> {line}"));
        Ok(())
    }

    /// Append a console line, evicting the oldest beyond capacity, and publish it.
    pub fn push_console_line(&self, line: String) {
        {
            let mut console = self.console.lock();
            if console.len() == self.backlog_capacity {
                let _ = console.pop_front();
            }
            console.push_back(line.clone());
        }
        self.publish(OutboundMessage::event(CONSOLE_OUTPUT, vec![line]));
    }

    /// The last `n` console lines, oldest first.
    pub fn backlog(&self, n: usize) -> Vec<String> {
        let console = self.console.lock();
        let skip = console.len().saturating_sub(n);
        console.iter().skip(skip).cloned().collect()
    }

    /// Subscribe to status and console events.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.events.subscribe()
    }

    /// Capture the current state.
    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            id: self.id.clone(),
            state: self.power_state(),
            suspended: self.is_suspended(),
            sessions: self.sessions.len(),
            console_lines: self.console.lock().len(),
        }
    }

    fn publish(&self, event: OutboundMessage) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
