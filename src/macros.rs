//! A convenience macro for wrapping and spawning a process in one call.
//!
//! The teacher crate's own `spawn!`/`spawn_async!` forward an arbitrary
//! argument list into the spawned closure via token-munging recursive
//! macros, because an OS-process boundary needs every argument captured
//! and re-encoded explicitly. Instances here are plain Rust closures
//! running in-process, so an ordinary `move` closure already captures
//! whatever it needs — there is no argument-forwarding problem left to
//! solve. `spawn!` is kept only as sugar over `ProcessBuilder` for the
//! common one-instance, no-builder-ceremony case.

/// Wraps an entry closure into a freshly created, freshly wrapped, single
/// instance running on the default pool.
///
/// ```
/// # use procrt::{spawn, context::StepDirective};
/// let process = spawn!(|_msg| Ok(StepDirective::Stop));
/// process.spawn(1).unwrap();
/// ```
#[macro_export]
macro_rules! spawn {
    ($entry:expr) => {{
        $crate::ProcessBuilder::new()
            .pool($crate::pool::default_pool())
            .wrap(std::sync::Arc::new($entry))
            .expect("spawn!: process was already wrapped")
    }};
}
