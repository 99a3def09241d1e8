use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Run state shared by the publisher and subscriber workers.
///
/// Transitions follow `Stopped -> Starting -> Running -> Stopping -> Stopped`;
/// a failed start goes straight from `Starting` back to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Stopped as u8),
        }
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.get() == LifecycleState::Running
    }

    /// Atomically moves `from -> to`. Returns false (and changes nothing) when
    /// the current state is not `from`.
    pub fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn set(&self, to: LifecycleState) {
        self.state.store(to as u8, Ordering::SeqCst);
    }
}
