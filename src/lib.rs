//! chain-bootstrap - genesis, key, delegation and transaction tooling for a
//! permissioned PBFT chain
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Command Layer
//! - [`command`] - Operator intents, one variant per sub-command
//! - [`dispatch`] - Runs one command against the collaborators below
//! - [`cli`] - clap front end for the `chain-cli` binary
//!
//! ## Protocol Providers
//! - [`ops`] - Per-protocol key and certificate formats, submission
//!
//! ## Cryptography & Keys
//! - [`crypto`] - secp256k1 keys, tagged signatures, addresses
//! - [`keys`] - Key generation, passphrase protection, key files
//! - [`delegation`] - Heavyweight delegation certificates
//!
//! ## Ledger Construction
//! - [`transaction`] - Transaction types and assembly
//! - [`genesis`] - Genesis generation, reading and hashing
//!
//! ## Integration
//! - [`network`] - Topology and transaction submission
//! - [`config`] - Configuration management
//!
//! ## Utilities
//! - [`persistence`] - No-clobber artifact writer and typed paths
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Command Layer
// ============================================================================
pub mod cli;
pub mod command;
pub mod dispatch;

// ============================================================================
// Protocol Providers
// ============================================================================
pub mod ops;

// ============================================================================
// Cryptography & Keys
// ============================================================================
pub mod crypto;
pub mod delegation;
pub mod keys;

// ============================================================================
// Ledger Construction
// ============================================================================
pub mod genesis;
pub mod transaction;

// ============================================================================
// Integration
// ============================================================================
pub mod config;
pub mod network;

// ============================================================================
// Utilities
// ============================================================================
pub mod error;
pub mod persistence;
