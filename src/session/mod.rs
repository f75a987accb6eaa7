//! Session lifecycle: registry, per-session background execution, and alert emission.

pub mod controller;
pub mod cooldown;
pub mod copy;
pub mod manager;
pub mod state;
pub mod subscription;
pub mod worker;

pub use manager::{PipelineServices, SessionManager};
pub use subscription::SessionUpdate;
