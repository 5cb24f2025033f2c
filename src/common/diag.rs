//! Diagnostic sink for programmer bugs.
//!
//! The IR core has no recoverable errors: every malformed request
//! (type mismatch, double SSA assignment, instruction after a terminator)
//! indicates a broken caller, not bad input. Those all funnel through
//! [`raise`], which reports a `[BUG]` line and terminates the process.
//! Tests flip [`panic_on_bug`] so the termination becomes a catchable
//! panic instead of an abort.

use std::fmt;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

static PANIC_ON_BUG: AtomicBool = AtomicBool::new(false);

/// Make [`raise`] panic instead of aborting the process.
///
/// Intended for test harnesses, which pair it with
/// `#[should_panic(expected = "[BUG]")]`.
pub fn panic_on_bug(enable: bool) {
    PANIC_ON_BUG.store(enable, Ordering::SeqCst);
}

/// Report an unrecoverable programmer bug and terminate.
pub fn raise(message: fmt::Arguments<'_>) -> ! {
    eprintln!("[BUG] {message}");
    if PANIC_ON_BUG.load(Ordering::SeqCst) {
        panic!("[BUG] {message}");
    }
    process::abort();
}

/// Report a programmer bug through the diagnostic sink and terminate.
#[macro_export]
macro_rules! bug {
    ($($arg:tt)*) => {
        $crate::common::diag::raise(format_args!($($arg)*))
    };
}
