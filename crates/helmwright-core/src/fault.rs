//! Catch-and-convert barrier around lifecycle entry points.
//!
//! A panic inside one resource operation becomes a [`CoreError::Internal`]
//! carrying the panic message and a backtrace taken at the panic site, so the
//! caller can keep driving other resources.

use crate::CoreError;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use tracing::error;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static CAPTURED: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chain a hook that records panics raised inside a barrier and defers to the
/// previous hook everywhere else.
fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if DEPTH.with(Cell::get) > 0 {
                let trace = Backtrace::force_capture();
                CAPTURED.with(|c| *c.borrow_mut() = Some(trace.to_string()));
            } else {
                previous(info);
            }
        }));
    });
}

/// Run `f`, converting a panic into [`CoreError::Internal`].
pub fn barrier<T>(
    operation: &str,
    f: impl FnOnce() -> Result<T, CoreError>,
) -> Result<T, CoreError> {
    install_hook();
    DEPTH.with(|d| d.set(d.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    DEPTH.with(|d| d.set(d.get() - 1));

    match result {
        Ok(r) => r,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let backtrace = CAPTURED.with(|c| c.borrow_mut().take()).unwrap_or_default();
            error!(operation, "unhandled error: {message}");
            Err(CoreError::Internal {
                operation: operation.to_owned(),
                message,
                backtrace,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
