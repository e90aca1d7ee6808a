//! Lectern - course catalog filtering and learning analytics.
//!
//! # Overview
//!
//! Lectern powers the catalog and student dashboard of an online learning
//! platform. The catalog is searched, filtered and sorted in memory; the
//! dashboard derives streaks, consistency, velocity and an engagement score
//! from each student's daily activity log.
//!
//! The computational core ([`date`], [`catalog`], [`aggregation`]) is pure
//! and synchronous: it never performs I/O and never fails, degrading
//! malformed or empty input to defined neutral values. The surrounding
//! layers fetch data concurrently and call the core once every read is in.
//!
//! # Modules
//!
//! - [`date`]: Normalization of heterogeneous date representations
//! - [`catalog`]: Course filtering and sorting
//! - [`aggregation`]: Learning analytics and dashboard assembly
//! - [`model`]: Data types for courses, enrollments and analytics
//! - [`storage`]: SQLite storage layer
//! - [`data_sources`]: Remote document store client and catalog import
//! - [`api`]: HTTP API handlers
//! - [`config`]: Environment configuration

pub mod aggregation;
pub mod api;
pub mod catalog;
pub mod config;
pub mod data_sources;
pub mod date;
pub mod model;
pub mod storage;
