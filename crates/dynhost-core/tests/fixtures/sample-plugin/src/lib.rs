//! Sample plugin artifact.
//!
//! Declares module `sample` with a data export `Version`, a callable `Run`,
//! and an initializer that must run before either is used.

use std::sync::atomic::{AtomicU32, Ordering};

dynhost_core::export_module! {
    path: "sample",
    symbols: ["Version" => Data, "Run" => Callable, "Calls" => Data],
}

#[export_name = "sample.Version"]
pub static VERSION: u32 = 3;

/// Set to 1 by the initializer, then bumped by every `Run`.
#[export_name = "sample.Calls"]
pub static CALLS: AtomicU32 = AtomicU32::new(0);

#[export_name = "sample.init"]
pub extern "C" fn init() {
    CALLS.store(1, Ordering::SeqCst);
}

#[export_name = "sample.Run"]
pub extern "C" fn run(x: u32) -> u32 {
    CALLS.fetch_add(1, Ordering::SeqCst);
    x + VERSION
}
