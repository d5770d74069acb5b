//! `ThreadHost`/`QueueThreadHost`/`CallbackThreadHost` from
//! `support/thread_host.py`: a wake-on-event worker thread. Rust has no use
//! for the Python hierarchy's template-method subclassing, so the callback
//! is just passed straight into the constructor.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

struct WakeGate {
    woken: Mutex<bool>,
    cvar: Condvar,
}

impl WakeGate {
    fn new() -> Self {
        WakeGate {
            woken: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    fn wake(&self) {
        *self.woken.lock().unwrap() = true;
        self.cvar.notify_one();
    }

    fn wait(&self) {
        let mut woken = self.woken.lock().unwrap();
        while !*woken {
            woken = self.cvar.wait(woken).unwrap();
        }
        *woken = false;
    }

    fn wait_timeout(&self, timeout: Duration) {
        let woken = self.woken.lock().unwrap();
        let (mut woken, _) = self.cvar.wait_timeout_while(woken, timeout, |w| !*w).unwrap();
        *woken = false;
    }
}

/// Handed to a `ThreadHost` action so it can emulate `wait_stop(timeout=...)`:
/// block for up to `timeout` waiting to be woken, but return early — and keep
/// returning `true` — once the host has been told to stop.
#[derive(Clone)]
pub struct StopToken {
    gate: Arc<WakeGate>,
    stop: Arc<AtomicBool>,
}

impl StopToken {
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Sleeps for `timeout`, unless woken or stopped sooner. Returns whether
    /// the host should stop.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            return true;
        }
        self.gate.wait_timeout(timeout);
        self.stop.load(Ordering::SeqCst)
    }
}

/// A thread that sleeps until woken, runs one `action`, then sleeps again —
/// `ThreadHost`/`CallbackThreadHost`. The action receives a `StopToken` so it
/// can run its own inner loop (e.g. one animation frame per iteration) and
/// still notice a shutdown promptly, the way `_winkwink_thread_callback` polls
/// `wait_stop` between frames instead of a plain `time.sleep`.
pub struct ThreadHost {
    gate: Arc<WakeGate>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadHost {
    pub fn spawn(
        name: impl Into<String>,
        mut action: impl FnMut(&StopToken) + Send + 'static,
    ) -> Self {
        let gate = Arc::new(WakeGate::new());
        let stop = Arc::new(AtomicBool::new(false));
        let (t_gate, t_stop) = (gate.clone(), stop.clone());
        let handle = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let token = StopToken {
                    gate: t_gate.clone(),
                    stop: t_stop.clone(),
                };
                while !t_stop.load(Ordering::SeqCst) {
                    t_gate.wait();
                    if t_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    action(&token);
                }
            })
            .expect("failed to spawn thread host worker");
        ThreadHost {
            gate,
            stop,
            handle: Some(handle),
        }
    }

    pub fn wake(&self) {
        self.gate.wake();
    }
}

impl Drop for ThreadHost {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.gate.wake();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// `QueueThreadHost`/`CallbackQueueThreadHost`: items pushed from any thread
/// drain on the worker thread, in push order, until the queue is empty.
pub struct QueueThreadHost<T: Send + 'static> {
    queue: Arc<Mutex<Vec<T>>>,
    host: ThreadHost,
}

impl<T: Send + 'static> QueueThreadHost<T> {
    pub fn spawn(
        name: impl Into<String>,
        mut on_item: impl FnMut(T) + Send + 'static,
        mut on_cleared: impl FnMut() + Send + 'static,
    ) -> Self {
        let queue: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));
        let worker_queue = queue.clone();
        let host = ThreadHost::spawn(name, move |_token| loop {
            let item = worker_queue.lock().unwrap().pop();
            match item {
                Some(item) => on_item(item),
                None => {
                    on_cleared();
                    break;
                }
            }
        });
        QueueThreadHost { queue, host }
    }

    pub fn push_operation(&self, item: T) {
        // Preserve push order: the worker pops from the front.
        self.queue.lock().unwrap().insert(0, item);
        self.host.wake();
    }
}

/// Blocks the calling thread until `SIGINT` (Ctrl-C) arrives, or `timeout`
/// elapses if given — `misc/signal.py`'s `GracefulSignal`, generalised
/// slightly since `ctrlc` installs a process-wide handler rather than a
/// scoped one.
pub struct ShutdownSignal {
    triggered: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn install() -> Result<Self, ctrlc::Error> {
        let triggered = Arc::new((Mutex::new(false), Condvar::new()));
        let handler_state = triggered.clone();
        ctrlc::set_handler(move || {
            let (lock, cvar) = &*handler_state;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        })?;
        Ok(ShutdownSignal { triggered })
    }

    pub fn wait(&self) {
        let (lock, cvar) = &*self.triggered;
        let mut triggered = lock.lock().unwrap();
        while !*triggered {
            triggered = cvar.wait(triggered).unwrap();
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.triggered;
        let triggered = lock.lock().unwrap();
        let (triggered, _) = cvar.wait_timeout_while(triggered, timeout, |t| !*t).unwrap();
        *triggered
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.0.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    #[test]
    fn thread_host_runs_action_once_per_wake() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let host = ThreadHost::spawn("test-host", move |_token| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        host.wake();
        host.wake();
        std::thread::sleep(StdDuration::from_millis(100));
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn queue_thread_host_drains_in_order_and_calls_cleared() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cleared = Arc::new(AtomicUsize::new(0));
        let (s, c) = (seen.clone(), cleared.clone());
        let host = QueueThreadHost::spawn(
            "queue-test",
            move |item: u32| s.lock().unwrap().push(item),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );
        host.push_operation(1);
        host.push_operation(2);
        host.push_operation(3);
        std::thread::sleep(StdDuration::from_millis(150));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert!(cleared.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn stop_token_reports_stopped_once_host_is_dropped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let stopped_seen = Arc::new(AtomicBool::new(false));
        let (r, s) = (runs.clone(), stopped_seen.clone());
        let host = ThreadHost::spawn("stop-token-test", move |token| {
            r.fetch_add(1, Ordering::SeqCst);
            while !token.wait(StdDuration::from_millis(5)) {}
            s.store(true, Ordering::SeqCst);
        });
        host.wake();
        std::thread::sleep(StdDuration::from_millis(20));
        drop(host);
        assert!(runs.load(Ordering::SeqCst) >= 1);
        assert!(stopped_seen.load(Ordering::SeqCst));
    }
}
