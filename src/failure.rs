//! Capturing errors raised from inside an instance's user function.
//!
//! An instance's entry function can fail in two ways: it can return an
//! `Err` from a fallible step, or it can panic. Both are unified into a
//! single [`Failure`] value that is handed to the process's error handler.
//! The panic-capture half of this mirrors the teacher crate's own
//! `panic.rs`: a thread-local slot is populated by a panic hook and
//! consulted immediately after `catch_unwind` returns.
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};

static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static PANIC_INFO: RefCell<Option<Failure>> = RefCell::new(None);
}

/// A captured failure from inside an instance's user function.
///
/// This is produced either from an `Err` value returned by the entry
/// function or from a caught panic.
#[derive(Clone)]
pub struct Failure {
    msg: String,
    #[cfg(feature = "backtrace")]
    backtrace: Option<std::sync::Arc<backtrace::Backtrace>>,
}

impl Failure {
    /// Creates a failure carrying a plain message, with no captured
    /// backtrace (used for ordinary `Err` returns, which have no panic
    /// payload to attach one to).
    pub fn new(msg: impl Into<String>) -> Failure {
        Failure {
            msg: msg.into(),
            #[cfg(feature = "backtrace")]
            backtrace: None,
        }
    }

    /// Returns the message describing the failure.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the captured backtrace, if any. Only panics captured while
    /// the `backtrace` feature is enabled carry one.
    #[cfg(feature = "backtrace")]
    pub fn backtrace(&self) -> Option<&backtrace::Backtrace> {
        self.backtrace.as_deref()
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Failure").field("message", &self.msg).finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

/// Installs the process-wide panic hook that feeds [`take_panic`].
///
/// Safe to call more than once; only the first call installs the hook.
pub fn ensure_panic_hook_installed() {
    if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    let next = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        record_panic(info);
        next(info);
    }));
}

fn record_panic(info: &panic::PanicInfo<'_>) {
    PANIC_INFO.with(|pi| {
        #[allow(unused_mut)]
        let mut failure = failure_from_payload(info.payload());
        #[cfg(feature = "backtrace")]
        {
            failure.backtrace = Some(std::sync::Arc::new(backtrace::Backtrace::new()));
        }
        *pi.borrow_mut() = Some(failure);
    });
}

fn failure_from_payload(payload: &(dyn Any + Send + 'static)) -> Failure {
    let msg = match payload.downcast_ref::<&'static str>() {
        Some(s) => (*s).to_string(),
        None => match payload.downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "instance panicked with a non-string payload".to_string(),
        },
    };
    Failure::new(msg)
}

/// Clears any failure left over from a previous step, so a stale entry
/// can never be attributed to the wrong call.
pub fn reset() {
    PANIC_INFO.with(|pi| *pi.borrow_mut() = None);
}

/// Runs `f`, catching any panic and returning it as a [`Failure`] instead
/// of unwinding further.
pub fn catch<F, R>(f: F) -> Result<R, Failure>
where
    F: FnOnce() -> R + panic::UnwindSafe,
{
    reset();
    match panic::catch_unwind(f) {
        Ok(value) => Ok(value),
        Err(payload) => Err(PANIC_INFO
            .with(|pi| pi.borrow_mut().take())
            .unwrap_or_else(|| failure_from_payload(&*payload))),
    }
}
