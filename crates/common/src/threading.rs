use anyhow::{Result, anyhow};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Reserved,
    Running,
    Joined,
    Detached,
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub name: String,
    pub status: ThreadStatus,
}

#[derive(Default)]
struct ThreadRegistryInner {
    next_id: AtomicUsize,
    slots: Mutex<Vec<Slot>>,
}

struct Slot {
    id: Option<usize>,
    name: String,
    status: ThreadStatus,
    reserved: bool,
}

impl ThreadRegistryInner {
    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().expect("thread registry mutex poisoned")
    }

    /// Records how a thread ended. Reserved slots stay listed with their final
    /// status; ad-hoc slots are dropped unless the thread panicked.
    fn finish(&self, id: usize, status: ThreadStatus) {
        let mut slots = self.slots();
        let Some(pos) = slots.iter().position(|s| s.id == Some(id)) else {
            return;
        };
        if slots[pos].reserved || status == ThreadStatus::Panicked {
            slots[pos].status = status;
        } else {
            slots.swap_remove(pos);
        }
    }
}

/// Named registry of the worker threads owned by publishers, subscribers and
/// the server loop. Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct ThreadRegistry {
    inner: Arc<ThreadRegistryInner>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slots<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        registry.reserve_slots(names);
        registry
    }

    pub fn reserve_slots<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut slots = self.inner.slots();
        for name in names {
            let name = name.into();
            if slots.iter().any(|s| s.name == name) {
                continue;
            }
            slots.push(Slot {
                id: None,
                name,
                status: ThreadStatus::Reserved,
                reserved: true,
            });
        }
    }

    pub fn spawn<F>(&self, name: impl Into<String>, f: F) -> Result<ThreadHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);

        {
            let mut slots = self.inner.slots();
            match slots
                .iter_mut()
                .find(|s| s.name == name && s.status != ThreadStatus::Running)
            {
                Some(slot) => {
                    slot.id = Some(id);
                    slot.status = ThreadStatus::Running;
                }
                None => slots.push(Slot {
                    id: Some(id),
                    name: name.clone(),
                    status: ThreadStatus::Running,
                    reserved: false,
                }),
            }
        }

        let builder = thread::Builder::new().name(name.clone());
        let join_handle = match builder.spawn(f) {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.finish(id, ThreadStatus::Detached);
                return Err(anyhow!("failed to spawn thread '{name}': {e}"));
            }
        };

        Ok(ThreadHandle {
            name,
            id,
            handle: Some(join_handle),
            inner: Arc::clone(&self.inner),
        })
    }

    /// Number of slots currently listed, reserved or not.
    pub fn slot_count(&self) -> usize {
        self.inner.slots().len()
    }

    pub fn snapshot(&self) -> Vec<ThreadSnapshot> {
        self.inner
            .slots()
            .iter()
            .map(|s| ThreadSnapshot {
                name: s.name.clone(),
                status: s.status,
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .slots()
            .iter()
            .filter(|s| s.status == ThreadStatus::Running)
            .count()
    }

    pub fn active_thread_names(&self) -> Vec<String> {
        self.inner
            .slots()
            .iter()
            .filter(|s| s.status == ThreadStatus::Running)
            .map(|s| s.name.clone())
            .collect()
    }
}

pub struct ThreadHandle {
    name: String,
    id: usize,
    handle: Option<JoinHandle<()>>,
    inner: Arc<ThreadRegistryInner>,
}

impl ThreadHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    pub fn join(mut self) -> std::thread::Result<()> {
        let result = match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        };
        let status = if result.is_ok() {
            ThreadStatus::Joined
        } else {
            ThreadStatus::Panicked
        };
        self.inner.finish(self.id, status);
        result
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        // Dropping the JoinHandle detaches the thread; we intentionally do not block here.
        if self.handle.is_some() {
            self.inner.finish(self.id, ThreadStatus::Detached);
        }
    }
}
