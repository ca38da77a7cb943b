/// Device identifiers are opaque strings assigned by the device cloud.
pub type DeviceId = String;

/// Identifiers the device assigns to shadow entries (encoders, outputs, inputs).
pub type EntryId = i64;

/// Optimistic-concurrency version of a shadow document.
pub type ShadowVersion = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Operator acknowledgement demanded by destructive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Confirmed,
    Declined,
}

impl Approval {
    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::Confirmed)
    }
}
