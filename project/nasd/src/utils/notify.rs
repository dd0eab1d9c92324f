//! Operator alerts.
//!
//! Delivery (e-mail, push) belongs to an external collaborator; the core only
//! decides *when* an operator has to hear about something.

use tracing::{error, info};

pub trait Notifier: Send + Sync {
    fn system_success(&self, message: &str);

    fn system_error(&self, subject: &str, message: &str);
}

/// Default notifier: alerts end up in the log under `nasd::alert`.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn system_success(&self, message: &str) {
        info!(target: "nasd::alert", "{message}");
    }

    fn system_error(&self, subject: &str, message: &str) {
        error!(target: "nasd::alert", subject, "{message}");
    }
}
