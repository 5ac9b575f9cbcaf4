//! Focus Mode CLI
//!
//! Offline tools for checking titles against a settings file, scanning saved
//! pages and editing settings files.

pub mod commands;
pub mod html;
