pub mod app;
pub mod collector;
pub mod core;
pub mod notifications;
pub mod scanner;
pub mod store;
pub mod transport;
