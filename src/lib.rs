pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::SessionConfig;
pub use core::{Session, SessionHandle, SessionState};
pub use domain::events::LifecycleEvent;
pub use domain::model::CampaignMetadata;
pub use domain::ports::Platform;
pub use utils::error::{ArError, Result};
