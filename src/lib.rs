//! Shopfloor API Library
//!
//! Inventory ledger and work-order billing engine for an auto repair shop.
//! Stock mutations are atomic and idempotent, every quantity change is
//! recorded in an append-only transaction ledger, and work orders move
//! through a one-way billing state machine that ends in a closed invoice.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod migrator;
pub mod money;
pub mod services;
