//! Event type names published on the bus.

pub const JOB_ADDED: &str = "job.added";
pub const JOB_PROCESSING: &str = "job.processing";
pub const JOB_COMPLETED: &str = "job.completed";
pub const JOB_RETRYING: &str = "job.retrying";
pub const JOB_FAILED: &str = "job.failed";

pub const GENERATION_COMPLETED: &str = "generation.completed";
pub const GENERATION_FAILED: &str = "generation.failed";

pub const CREDITS_REFUNDED: &str = "credits.refunded";
/// A compensating refund could not be written and needs manual
/// reconciliation.
pub const CREDITS_REFUND_FAILED: &str = "credits.refund_failed";
