//! Game event herald: polls a game's event feed and republishes each event
//! as a post on a social broadcast API, exactly once per event under normal
//! operation and at least once across crashes.

pub mod config;
pub mod events;
pub mod format;
pub mod normalizer;
pub mod poller;
pub mod publish;
pub mod source;
pub mod store;
pub mod tracker;
