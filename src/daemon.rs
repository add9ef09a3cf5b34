//! Background callback dispatcher.
//!
//! A [`Daemon`] owns one worker thread that runs every registered callback
//! once per pass and immediately starts the next pass; there is no period
//! and no sleeping. The fan-out ring registers its min-tail sweep here so
//! producers keep learning how much space the slowest subscriber has freed.
//!
//! Registration goes through a [`DaemonHandle`], a cheap clone of the shared
//! registry, so containers can deregister themselves on drop without
//! borrowing the daemon. [`global_daemon`] exposes the lazily-created
//! process-wide instance; tests that want isolation construct their own
//! `Daemon` and pass its handle around instead.
//!
//! Callbacks must be short, must not panic, and must not call back into
//! `add_callback`/`remove_callback`: the registry mutex is held for the
//! whole pass, so a reentrant call self-deadlocks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

/// Opaque token identifying a registered callback.
pub type CallbackKey = u64;

type Callback = Box<dyn FnMut() + Send>;

struct Registry {
    callbacks: HashMap<CallbackKey, Callback>,
    next_key: CallbackKey,
}

struct Shared {
    should_run: AtomicBool,
    registry: Mutex<Registry>,
}

impl Shared {
    fn run_pass(&self) {
        let mut registry = self.registry.lock().unwrap();
        for callback in registry.callbacks.values_mut() {
            callback();
        }
    }
}

/// Owner of the worker thread. Dropping it stops the loop and joins the
/// worker; any callbacks still registered are simply never run again.
pub struct Daemon {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Spawns the worker thread and starts dispatching immediately.
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            should_run: AtomicBool::new(true),
            registry: Mutex::new(Registry {
                callbacks: HashMap::new(),
                next_key: 0,
            }),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("ringfan-daemon".into())
            .spawn(move || {
                while worker_shared.should_run.load(Ordering::SeqCst) {
                    worker_shared.run_pass();
                }
            })
            .expect("failed to spawn daemon worker");

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// A clonable handle onto this daemon's registry.
    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Registers `callback` to run once per pass. See [`DaemonHandle::add_callback`].
    pub fn add_callback(&self, callback: impl FnMut() + Send + 'static) -> CallbackKey {
        self.handle().add_callback(callback)
    }

    /// Deregisters a callback. See [`DaemonHandle::remove_callback`].
    pub fn remove_callback(&self, key: CallbackKey) {
        self.handle().remove_callback(key);
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.shared.should_run.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Shared registry access for registering and removing callbacks.
#[derive(Clone)]
pub struct DaemonHandle {
    shared: Arc<Shared>,
}

impl DaemonHandle {
    /// Appends `callback` under a fresh key and returns the key.
    ///
    /// The callback starts running on the worker's next pass.
    pub fn add_callback(&self, callback: impl FnMut() + Send + 'static) -> CallbackKey {
        let mut registry = self.shared.registry.lock().unwrap();
        let key = registry.next_key;
        registry.next_key += 1;
        registry.callbacks.insert(key, Box::new(callback));
        key
    }

    /// Removes the callback registered under `key`; unknown keys are
    /// ignored. If the callback is executing right now it finishes the
    /// current pass but is not scheduled again.
    pub fn remove_callback(&self, key: CallbackKey) {
        let mut registry = self.shared.registry.lock().unwrap();
        registry.callbacks.remove(&key);
    }
}

/// The process-wide daemon, created on first use. Its worker runs until
/// process exit.
pub fn global_daemon() -> DaemonHandle {
    static GLOBAL: OnceLock<Daemon> = OnceLock::new();
    GLOBAL.get_or_init(Daemon::new).handle()
}
