pub mod binder;
pub mod capability;
pub mod controller;
pub mod debounce;
pub mod playback;
pub mod preparator;
pub mod session;
pub mod signal;
pub mod state;
pub mod teardown;

pub use controller::{SessionCommand, SessionHandle};
pub use session::{ErrorSummary, Session};
pub use signal::StopSignal;
pub use state::{DetectionPhase, SessionState};
