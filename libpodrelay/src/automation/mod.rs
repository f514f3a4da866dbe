//! The cross-posting automation engine
//!
//! - [`controller`]: one run over all targets for one episode
//! - [`routing`]: which targets each source feeds
//! - [`status`]: the persisted STOPPED/RUNNING state
//! - [`scheduler`]: periodic and manual checks driving the controller

pub mod controller;
pub mod routing;
pub mod scheduler;
pub mod status;

pub use controller::{AutomationController, RunReport, RunSettings, Trigger};
pub use scheduler::{CheckReport, Scheduler};
pub use status::{AutomationStatus, StatusStore};
