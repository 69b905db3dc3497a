//! Trace-level diagnostics.
//!
//! The tracker owns no I/O, so unlike the kernel's `terminal::log!` (which
//! writes straight to a serial port) this crate routes formatted messages
//! through a pluggable sink. An embedder installs one with [`set_sink`];
//! by default messages are dropped.

use core::fmt::Arguments;
use core::sync::atomic::{AtomicPtr, Ordering};

type SinkFn = fn(Arguments);

static SINK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Installs the process-wide diagnostics sink. Call once at startup; later
/// calls replace the previous sink.
pub fn set_sink(sink: SinkFn) {
    SINK.store(sink as *mut (), Ordering::Release);
}

#[doc(hidden)]
pub fn _trace(args: Arguments) {
    let ptr = SINK.load(Ordering::Acquire);
    if ptr.is_null() {
        return;
    }
    // SAFETY: the only value ever stored is a `SinkFn` cast through
    // `set_sink`, and function pointers are `Copy`/`'static`.
    let sink: SinkFn = unsafe { core::mem::transmute(ptr) };
    sink(args);
}

/// Emits a `file!()`/`line!()`-tagged trace message through the installed
/// sink. A no-op if no sink has been installed.
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::diag::_trace(format_args!("{}:{} {}", file!(), line!(), format_args!($($arg)*)))
    };
}

pub(crate) use trace;
