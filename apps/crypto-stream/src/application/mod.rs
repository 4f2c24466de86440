//! Application Layer - Use cases and port definitions.
//!
//! Ports describe what the core needs from the outside (a transport) and
//! what it offers (handler callbacks). Services route decoded messages.

/// Port interfaces for the transport and handlers.
pub mod ports;

/// Message dispatch and handler registry.
pub mod services;
