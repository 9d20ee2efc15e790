//! Test modules for the collectors
//!
//! `scripted` is shared with the scanner tests.

mod paged;
