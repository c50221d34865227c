//! Timechain - a minimal replicated ledger ordered by wall-clock time
//!
//! Every block's sequence number is the seconds elapsed since genesis; the
//! node with the highest sequence wins, and nodes converge by gossiping
//! their heads over TCP.
//!
//! # Architecture
//!
//! ## Core Blockchain
//! - [`blockchain`] - Block model, hashing, validation and the chain head
//!
//! ## Mining
//! - [`miner`] - Periodic block production
//!
//! ## State Management
//! - [`persistence`] - Block store (JSON files, SQLite, memory)
//!
//! ## Networking & Integration
//! - [`network`] - Peer gossip
//! - `api` - Read-only HTTP query surface (feature `api`)
//! - [`node`] - Bootstrap and startup orchestration
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`metrics`] - Node statistics over the `metrics` facade

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;

// ============================================================================
// Mining
// ============================================================================
pub mod miner;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Networking
// ============================================================================
pub mod network;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
pub mod metrics;
