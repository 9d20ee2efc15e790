//! Public API for progress notifications
//!
//! External modules should import from here rather than directly from internal modules.
//!
//! # Examples
//! ```no_run
//! # use metaingest::notifications::api::{ProgressHub, WILDCARD_KEY};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = ProgressHub::default();
//! let everything = hub.get_subscriber(WILDCARD_KEY)?;
//! while let Some(progress) = everything.recv().await {
//!     println!("{}: {} items", progress.scan_id, progress.processed_count);
//! }
//! # Ok(())
//! # }
//! ```

pub use crate::notifications::error::{HubError, HubResult};
pub use crate::notifications::event::Progress;
pub use crate::notifications::hub::{ProgressHub, ProgressSubscriber, WILDCARD_KEY};
