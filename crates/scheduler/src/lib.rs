//! Pageflow Scheduler Library
//!
//! Scheduling primitives for the progressive viewer: cooperative
//! cancellation with a single in-flight render per key, the virtual page
//! window, and the idle-time slot used by background warm-up.
//!
//! # Example
//!
//! ```
//! use pageflow_scheduler::{compute_mounted_pages, RenderTaskRegistry, WindowConfig};
//!
//! let registry = RenderTaskRegistry::new();
//! let mounted = compute_mounted_pages(10, 50, None, 0, &WindowConfig::default());
//!
//! for page in &mounted {
//!     let ticket = registry.begin(*page);
//!     // ... render, checking ticket.token.is_cancelled() ...
//!     if registry.finish(&ticket) {
//!         // publish the result
//!     }
//! }
//! ```

mod cancel;
mod idle;
mod viewport;

pub use cancel::{CancellationToken, RenderTaskRegistry, RenderTicket};
pub use idle::{BackgroundScheduler, IdleHandle, IdleQueue};
pub use viewport::{clamp_page, compute_mounted_pages, WindowConfig, WindowState};
