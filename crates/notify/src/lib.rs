//! Notification sink for anomaly alerts.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - SMTP email notifier
//! - Minijinja template rendering for alert subject and body
//! - Dispatcher that bounds every delivery attempt with a timeout

pub mod dispatcher;
pub mod email;
pub mod templating;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use email::EmailNotifier;
pub use templating::{AlertContext, TemplateRenderer};
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
