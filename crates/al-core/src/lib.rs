//! ADC logger core library.
//!
//! - Line parser for `A<int>;E<int>;D<int>;` telemetry
//! - Fixed-quota sample collector
//! - Line sources (serial tty, capture files, closures)
//! - Cooperative cancellation
//! - Interactive session orchestration
//! - Configuration, structured logging, exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod cancel;
pub mod collect;
pub mod config;
pub mod exit_codes;
pub mod logging;
pub mod parse;
pub mod session;
pub mod transport;
