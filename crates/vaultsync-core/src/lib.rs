//! vaultsync Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Entity`, `MixedEntity`, `SyncPlan`, the closed `Decision` vocabulary
//! - **Port definitions** - Traits for adapters: `IStorage`, `IPrevSyncStore`, `IPlanStore`
//! - **Configuration** - YAML-backed settings with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure data and rules with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (filesystem and encrypted storage, SQLite record store).

pub mod config;
pub mod domain;
pub mod ports;
