//! Worker primitives shared by the engine: classified thread spawning,
//! hierarchical work contexts, once-closed completion signals and panic
//! containment.

mod class;
mod context;
mod latch;
mod panic;
mod spawn;

pub use class::TaskClass;
pub use context::{Expired, WorkContext};
pub use latch::DoneLatch;
pub use panic::{catch_panic, panic_message};
pub use spawn::{current_class, spawn_named_thread, spawn_thread};
pub use tokio_util::sync::CancellationToken;
