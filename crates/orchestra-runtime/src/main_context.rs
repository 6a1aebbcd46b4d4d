//! The designated construction thread.
//!
//! Service construction and `did_resolve` always run on one thread, the
//! *main context*, whichever thread asked for the instance.  The context is a
//! single-consumer job queue:
//!
//! - [`MainContext::spawn`] starts a dedicated thread that drains the queue.
//! - [`MainContext::bind_current`] designates the calling thread instead and
//!   hands back a [`MainLoop`] that the host pumps from its own event loop.
//!
//! [`MainContext::run_sync`] runs inline on the designated thread and
//! otherwise enqueues the job and blocks until it completes.  It must never be
//! called while holding a lock that the main thread might also need.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, ThreadId};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Failure of a cross-thread call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MainContextError {
    /// The job panicked.  The context itself keeps running.
    #[error("job panicked on the main context: {0}")]
    Panicked(String),

    /// Nothing drains the queue any more.
    #[error("main context is no longer running")]
    Disconnected,
}

struct Inner {
    name: String,
    thread: ThreadId,
    sender: Sender<Job>,
}

/// Handle to the main context.  Cheap to clone.
#[derive(Clone)]
pub struct MainContext {
    inner: Arc<Inner>,
}

impl MainContext {
    /// Starts a dedicated thread named `name`.
    ///
    /// The thread exits once every handle has been dropped.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            for job in receiver {
                job();
            }
            trace!("Main context queue closed");
        })?;
        let thread = handle.thread().id();
        debug!(thread = %name, "Main context started");

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                thread,
                sender,
            }),
        })
    }

    /// Designates the calling thread.
    ///
    /// Jobs submitted from other threads wait until the returned loop is
    /// pumped on this thread.
    pub fn bind_current() -> (Self, MainLoop) {
        let (sender, receiver) = mpsc::channel::<Job>();
        let current = thread::current();
        let name = current.name().unwrap_or("main").to_string();
        let context = Self {
            inner: Arc::new(Inner {
                name,
                thread: current.id(),
                sender,
            }),
        };
        let main_loop = MainLoop {
            receiver,
            _not_send: PhantomData,
        };
        (context, main_loop)
    }

    /// Thread name, for logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns `true` when called on the designated thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread
    }

    /// Runs `f` on the main context and returns its result.
    pub fn run_sync<F, R>(&self, f: F) -> Result<R, MainContextError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| MainContextError::Panicked(panic_message(payload.as_ref())));
        }

        let (done_tx, done_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(f));
            let _ = done_tx.send(result);
        });
        self.inner
            .sender
            .send(job)
            .map_err(|_| MainContextError::Disconnected)?;

        match done_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(MainContextError::Panicked(panic_message(payload.as_ref()))),
            // The job was dropped without running.
            Err(_) => Err(MainContextError::Disconnected),
        }
    }
}

impl fmt::Debug for MainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainContext")
            .field("name", &self.inner.name)
            .field("thread", &self.inner.thread)
            .finish()
    }
}

/// Pump for a context created by [`MainContext::bind_current`].
///
/// Not `Send`: it must stay on the bound thread.
pub struct MainLoop {
    receiver: Receiver<Job>,
    _not_send: PhantomData<*const ()>,
}

impl MainLoop {
    /// Runs every queued job without blocking.  Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Runs jobs until every [`MainContext`] handle is dropped.
    pub fn run(&self) {
        for job in self.receiver.iter() {
            job();
        }
    }

    /// Runs jobs until none arrives for `idle`.  Returns how many ran.
    pub fn run_until_idle(&self, idle: Duration) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.recv_timeout(idle) {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return ran,
            }
        }
    }
}

impl fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLoop").finish_non_exhaustive()
    }
}

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawned_context_runs_jobs_on_its_thread() {
        let ctx = MainContext::spawn("orchestra-test-main").unwrap();
        assert!(!ctx.is_current());
        assert_eq!(ctx.name(), "orchestra-test-main");

        let name = ctx
            .run_sync(|| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("orchestra-test-main"));
    }

    #[test]
    fn test_nested_call_runs_inline() {
        let ctx = MainContext::spawn("orchestra-test-nested").unwrap();
        let inner = ctx.clone();
        let value = ctx
            .run_sync(move || {
                assert!(inner.is_current());
                inner.run_sync(|| 41).map(|v| v + 1)
            })
            .unwrap();
        assert_eq!(value, Ok(42));
    }

    #[test]
    fn test_panic_is_reported_and_context_survives() {
        let ctx = MainContext::spawn("orchestra-test-panic").unwrap();
        let err = ctx.run_sync(|| -> u8 { panic!("boom") }).unwrap_err();
        assert_eq!(err, MainContextError::Panicked("boom".into()));
        assert_eq!(ctx.run_sync(|| 7).unwrap(), 7);
    }

    #[test]
    fn test_bound_context_is_pumped_by_its_owner() {
        let (tx, rx) = mpsc::channel();
        let owner = thread::spawn(move || {
            let (ctx, main_loop) = MainContext::bind_current();
            tx.send((ctx, thread::current().id())).unwrap();
            main_loop.run();
        });

        let (ctx, owner_id) = rx.recv().unwrap();
        let ran_on = ctx.run_sync(|| thread::current().id()).unwrap();
        assert_eq!(ran_on, owner_id);

        drop(ctx);
        owner.join().unwrap();
    }

    #[test]
    fn test_run_pending_and_idle() {
        let (ctx, main_loop) = MainContext::bind_current();
        assert!(ctx.is_current());
        assert_eq!(ctx.run_sync(|| 5).unwrap(), 5);
        assert_eq!(main_loop.run_pending(), 0);

        let remote = ctx.clone();
        let caller = thread::spawn(move || remote.run_sync(|| "queued"));
        assert_eq!(main_loop.run_until_idle(Duration::from_secs(1)), 1);
        assert_eq!(caller.join().unwrap(), Ok("queued"));
    }

    #[test]
    fn test_dropped_loop_disconnects() {
        let (ctx, main_loop) = MainContext::bind_current();
        drop(main_loop);
        let err = thread::spawn(move || ctx.run_sync(|| ()))
            .join()
            .unwrap()
            .unwrap_err();
        assert_eq!(err, MainContextError::Disconnected);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&3_u8), "non-string panic payload");
    }
}
