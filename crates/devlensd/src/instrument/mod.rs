//! Instrumentation adapters.
//!
//! Thin call-site helpers that derive event fields (timing, origin, status)
//! and hand them to the store. None of them block or return errors; with no
//! active session their events are dropped by the store.

mod hooks;
mod spans;
mod suspense;

pub use hooks::{ErrorHandler, HookRegistry, LogHandler};
pub use spans::{instrument_fetch, FetchSpan, RenderSpan, ServerActionSpan};
pub use suspense::{StreamingTracker, SuspenseToken, SuspenseTracker};
