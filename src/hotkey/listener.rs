//! OS thread running `rdev::listen`.
//!
//! `rdev::listen` cannot be interrupted.  Dropping [`HotkeyListener`] only
//! sets a flag that makes the callback discard events; the thread stays
//! parked in the OS event loop until the process exits.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use super::{HotkeyEvent, KeyLatch};

pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    _thread: std::thread::JoinHandle<()>,
}

impl HotkeyListener {
    /// Spawn the `hotkey-listener` thread watching `key`.
    ///
    /// Events go out with `blocking_send`, so `tx` may be consumed by an async
    /// task.  Fails only if the OS refuses to create the thread.
    pub fn start(key: rdev::Key, tx: mpsc::Sender<HotkeyEvent>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let mut latch = KeyLatch::new(key);
                let result = rdev::listen(move |event| {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Some(ev) = latch.on_event(&event.event_type) {
                        let _ = tx.blocking_send(ev);
                    }
                });

                if let Err(e) = result {
                    log::error!("hotkey-listener: rdev::listen exited with error: {e:?}");
                }
            })?;

        log::info!("hotkey-listener: watching {key:?}");
        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
