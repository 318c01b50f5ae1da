//! # Brand News Collector
//!
//! Collects news articles that mention a configured set of brand keywords,
//! attaches an optimized thumbnail to each one, and appends them as rows to a
//! Google Sheets worksheet.
//!
//! ## Architecture
//!
//! 1. **Fetching**: poll every RSS feed once per keyword ([`feeds`])
//! 2. **Matching**: keep entries mentioning a keyword and derive tags ([`matcher`])
//! 3. **Dedup**: drop URLs already stored and same-story repeats ([`dedup`])
//! 4. **Images**: resolve, optimize and publish a thumbnail ([`images`], [`google::drive`])
//! 5. **Storing**: append one row per article ([`google::sheets`])
//!
//! [`pipeline::Pipeline`] ties the stages together over the [`store`] traits,
//! so the Google services can be swapped for in-memory fakes in tests.

pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod feeds;
pub mod google;
pub mod http;
pub mod images;
pub mod matcher;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod utils;
