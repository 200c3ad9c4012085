//! Terminal front end for live tutoring sessions.

pub mod cli;
pub mod config;
pub mod input;
pub mod render;
