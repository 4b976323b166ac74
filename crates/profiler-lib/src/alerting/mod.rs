//! Threshold alerting over sampled process metrics
//!
//! Each sampled signal has an [`AlertTrigger`] built from its
//! [`crate::config::AlertConfiguration`]. The [`AlertEvaluator`] owns the
//! triggers, keeps rolling averages for breach metadata and raises the
//! threshold-independent manual and periodic breaches.

mod evaluator;
mod rolling;
mod trigger;

pub use evaluator::AlertEvaluator;
pub use rolling::{RollingAverage, DEFAULT_ROLLING_WINDOW};
pub use trigger::{AlertTrigger, TriggerState};
