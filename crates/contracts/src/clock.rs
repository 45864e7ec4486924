//! Clock - the single wall-time source of a race run

/// Wall time as seen by the timing listener (local time zone)
pub type Timestamp = chrono::DateTime<chrono::Local>;

/// Injected wall clock.
///
/// The scheduler samples it once per race build and once per force-drain;
/// the generator samples it when deriving per-call seeds.
pub trait Clock: Send + Sync {
    /// Current wall time
    fn now(&self) -> Timestamp;
}
