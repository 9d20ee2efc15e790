//! Test modules for the store implementations
