//! Shim to ensure that panics always reach the log together with a backtrace.
//!
//! Payout jobs run on detached tokio tasks, so without this a panic there would only show up on
//! stderr.

use std::{backtrace, panic};

use tracing::*;

fn handle_panic(info: &panic::PanicHookInfo<'_>) {
    let bt = backtrace::Backtrace::force_capture();
    let location = info.location().map(|l| l.to_string());

    let reason = info
        .payload()
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str));

    match reason {
        Some(reason) => error!(%reason, ?location, "thread panicking\n{bt}"),
        None => error!(?location, "thread panicking\n{bt}"),
    }
}

/// Sets a panic hook to (1) log the backtrace and (2) call the previous hook.
pub fn set_panic_hook() {
    let old_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        handle_panic(info);
        old_hook(info);
    }));
}
