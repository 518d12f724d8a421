//! Parrot - Korean/Japanese/English translation service
//!
//! Resolves a model key to a model family, dispatches requests through a
//! per-family strategy, augments them with retrieved terminology and keeps
//! results in an expiring cache.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod language;
pub mod registry;
pub mod server;
pub mod strategy;
pub mod terminology;
pub mod translator;

#[cfg(test)]
pub mod testing;
