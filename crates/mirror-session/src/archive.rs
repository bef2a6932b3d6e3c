//! Session descriptors for archive and catalog refreshes.

use chrono::NaiveDateTime;
use telemetry_mirror_core::{MirrorConfig, RemoteSessionDescriptor, StoredProcCall, TypedParam};

use crate::orchestrator::RefreshError;

/// Half-open time range `[begin, end)` with `end` strictly after `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    begin: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeRange {
    /// # Errors
    /// Returns `RefreshError::InvalidRange` unless `end > begin`.
    pub fn new(begin: NaiveDateTime, end: NaiveDateTime) -> Result<Self, RefreshError> {
        if end <= begin {
            return Err(RefreshError::InvalidRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    #[must_use]
    pub const fn begin(&self) -> NaiveDateTime {
        self.begin
    }

    #[must_use]
    pub const fn end(&self) -> NaiveDateTime {
        self.end
    }
}

/// One-call session fetching a device's archive for a range.
#[must_use]
pub fn archive_descriptor(
    config: &MirrorConfig,
    device: i32,
    range: TimeRange,
) -> RemoteSessionDescriptor {
    RemoteSessionDescriptor::stored_procedures(
        config.connection_target.as_str(),
        [StoredProcCall::new(
            config.archive_procedure.as_str(),
            vec![
                TypedParam::Integer(device),
                TypedParam::Timestamp(range.begin),
                TypedParam::Timestamp(range.end),
            ],
        )],
    )
}

/// Plain-query session reading catalog tables.
#[must_use]
pub fn catalog_descriptor<I, S>(config: &MirrorConfig, queries: I) -> RemoteSessionDescriptor
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    RemoteSessionDescriptor::plain_queries(config.connection_target.as_str(), queries)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use telemetry_mirror_core::{SessionMode, SessionStep};

    use super::*;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_range_requires_end_after_begin() {
        assert!(TimeRange::new(at(8), at(9)).is_ok());
        assert!(matches!(
            TimeRange::new(at(9), at(9)),
            Err(RefreshError::InvalidRange { .. })
        ));
        assert!(TimeRange::new(at(10), at(9)).is_err());
    }

    #[test]
    fn test_archive_descriptor_params() {
        let config = MirrorConfig::new("mysql://host/db");
        let descriptor = archive_descriptor(&config, 7, TimeRange::new(at(8), at(9)).unwrap());

        assert_eq!(descriptor.connection_target(), "mysql://host/db");
        assert_eq!(descriptor.mode(), SessionMode::StoredProcedures);
        let steps: Vec<_> = descriptor.steps().collect();
        let [SessionStep::Call(call)] = steps.as_slice() else {
            panic!("expected one call, got {steps:?}");
        };
        assert_eq!(call.name, "GetArchiveData");
        assert_eq!(call.params, vec![
            TypedParam::Integer(7),
            TypedParam::Timestamp(at(8)),
            TypedParam::Timestamp(at(9)),
        ]);
    }

    #[test]
    fn test_catalog_descriptor_is_plain() {
        let config = MirrorConfig::new("mysql://host/db");
        let descriptor = catalog_descriptor(&config, ["SELECT * FROM Objects"]);
        assert_eq!(descriptor.mode(), SessionMode::PlainQueries);
        assert_eq!(descriptor.len(), 1);
    }
}
