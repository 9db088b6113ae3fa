use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender, TrySendError};
use tracing::debug;

use crate::pool::resource_pool::ResourcePool;

/// Background thread sweeping idle pool entries on a fixed interval,
/// independent of caller threads. The sweep itself takes the pool's creation
/// mutex, so it never races a concurrent creation of the same key.
pub struct PoolSweeper {
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl PoolSweeper {
    pub fn start(pool: Arc<ResourcePool>) -> Self {
        let (shutdown, wake) = channel::bounded::<()>(1);
        let interval = pool.config().sweep_interval;
        let thread = std::thread::spawn(move || {
            loop {
                match wake.recv_timeout(interval) {
                    // A message or a dropped sender both mean shutdown.
                    Ok(()) | Err(channel::RecvTimeoutError::Disconnected) => break,
                    Err(channel::RecvTimeoutError::Timeout) => {
                        pool.sweep_idle();
                    }
                }
            }
            debug!("pool sweeper stopped");
        });
        PoolSweeper {
            shutdown,
            thread: Some(thread),
        }
    }

    /// Stop the sweeper and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        match self.shutdown.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => {}
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PoolSweeper {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
