//! Raiden onboarding: account funding coordinator.

pub mod backend;
pub mod config;
pub mod error;
pub mod exchange;
pub mod onboarding;
