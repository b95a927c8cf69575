//! # autocrawl
//!
//! Self-scaling crawl orchestrator. Walks a paginated repository API
//! (repositories → commits → commit detail), persists what it finds to
//! Postgres, defers transiently failed work to a durable queue, and hands
//! the remaining backlog to freshly launched workers when its own quota
//! runs out.

pub mod audit;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fleet;
pub mod github;
pub mod model;
pub mod queue;
pub mod telemetry;
