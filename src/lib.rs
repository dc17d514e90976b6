//! # POS Sync
//!
//! Incremental synchronization of point-of-sale data into SQLite.
//!
//! Each sync reads the last watermark, fetches the customers and receipts
//! created since then from the POS API, applies them in one transaction
//! (customer upserts, placeholder customers for unknown references, receipts
//! and their line items), hands a text summary of every new receipt to an
//! indexing service, and appends the new watermark. Any failure rolls the
//! whole batch back.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────────┐   ┌──────────┐
//! │  POS API    │──▶│  SyncEngine (one transaction) │──▶│  SQLite  │
//! │ /customers  │   │ upsert → receipts → summaries │   │ sync_log │
//! │ /receipts   │   └──────────────┬────────────────┘   └────┬─────┘
//! └─────────────┘                  ▼                         │
//!                           ┌────────────┐        ┌──────────┴──┐
//!                           │  Indexer   │        │ CLI / HTTP  │
//!                           └────────────┘        └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! possync init                                # create database
//! possync seed --at 2025-08-01T00:00:00Z      # provision the first watermark
//! possync sync                                # pull the delta
//! possync status --history 5
//! possync serve                               # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Typed records and instants |
//! | [`error`] | Sync error taxonomy |
//! | [`watermark`] | Append-only watermark log |
//! | [`pos_client`] | POS API fetcher |
//! | [`writer`] | Idempotent upserts and inserts |
//! | [`document`] | Receipt summaries |
//! | [`indexer`] | Indexing collaborator |
//! | [`sync`] | Orchestrator |
//! | [`status`] | Sync status and history |
//! | [`analysis`] | Question forwarding |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analysis;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod indexer;
pub mod migrate;
pub mod models;
pub mod pos_client;
pub mod server;
pub mod status;
pub mod sync;
pub mod watermark;
pub mod writer;
