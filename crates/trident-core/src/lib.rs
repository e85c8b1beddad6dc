//! trident-core: host telemetry collectors.
//!
//! Samples the kernel process table, CPU utilization, CPU frequency and
//! thermal zones, and writes compact pipe-delimited records to the local
//! syslog (plus an embedded SQLite table for CPU frequency).
//!
//! The heart of the crate is [`proc`]: processes are named by user rules,
//! tracked across scrapes by `(pid, start time)`, and aggregated into groups
//! whose counters never decrease under process churn.

pub mod collector;
pub mod config;
pub mod fmt;
pub mod proc;
pub mod sink;
