//! Progress reporting for the two pipeline stages.
//!
//! Input loading counts input groups (postcodes, grids, noise, greenspace);
//! scoring counts districts.
//! The CLI renders both with `indicatif`. Tests pass [`NullProgress`].

/// Receives progress from input loading or district scoring.
///
/// Districts are scored on rayon workers, so implementations must be
/// `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Number of input groups or districts in this stage.
    fn set_total(&self, total: u64);

    /// Advance by `delta` input groups or districts.
    fn inc(&self, delta: u64);

    /// Name the input or step currently in progress.
    fn set_message(&self, msg: String);

    /// Close the stage with a summary line.
    fn finish(&self, msg: String);
}

/// Ignores all updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}
