//! Domain Layer - Core streaming types and business logic.
//!
//! Pure types with no I/O: market data events, subscription state, and the
//! connection lifecycle.

/// Connection lifecycle state machine.
pub mod connection;

/// Symbols, stream kinds, and market events.
pub mod market;

/// Desired/acknowledged subscription tracking.
pub mod subscription;
