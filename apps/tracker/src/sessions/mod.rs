//! Recording sessions: bounded windows that group a character's matches.

pub mod machine;

pub use machine::{SessionStore, SESSIONS, SESSION_GUARDS};
