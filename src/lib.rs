//! Trapchat: an assessment chat service.
//!
//! Each submitted turn is answered by a language model, but with a fixed probability
//! the answer is swapped for a known falsehood and flagged as a trap. Every turn is
//! logged for later review.

pub mod api;
pub mod chat;
pub mod cli;
pub mod config;
pub mod db;
pub mod llm;
