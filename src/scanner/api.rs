//! Scanner API
//!
//! Public exports for starting and observing scans.

pub use crate::scanner::controller::{ScanController, ScanControllerBuilder};
pub use crate::scanner::error::{ScanError, ScanResult};
pub use crate::scanner::types::{Scan, ScanId, ScanParams, ScanStatus};
