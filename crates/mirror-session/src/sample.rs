//! Typed rows of the telemetry archive and the device catalog.

use serde::{Deserialize, Serialize};
use telemetry_mirror_core::{MapError, RowRecord};

/// Fallback when a parameter's digit count is not a number.
const DEFAULT_POSITIONS: i32 = 9;
const DEFAULT_PRECISION: i32 = 0;

/// One archived parameter reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub parameters_list_id: i64,
    /// Server-formatted reading time.
    pub value_date_time: String,
    pub param_value: String,
    /// Alarm marker as sent by the server.
    pub reason: String,
}

impl TelemetrySample {
    /// Map an archive row.
    ///
    /// # Errors
    /// Returns error if a column is missing or the parameter id is not an integer.
    pub fn from_row(row: &RowRecord) -> Result<Self, MapError> {
        Ok(Self {
            parameters_list_id: row.require_i64("ParametersListID")?,
            value_date_time: row.require("ValueDateTime")?.to_string(),
            param_value: row.require("ParamValueTXT")?.to_string(),
            reason: row.require("Reason")?.to_string(),
        })
    }

    /// The server flags an alarm by echoing the value in `Reason`.
    #[must_use]
    pub fn is_alarm(&self) -> bool {
        self.reason == self.param_value
    }
}

/// A device known to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub object_id: i64,
    pub devtype_id: i64,
    pub name: String,
    pub uid: String,
}

impl DeviceInfo {
    /// Map a device catalog row.
    ///
    /// # Errors
    /// Returns error if a column is missing or an id is not an integer.
    pub fn from_row(row: &RowRecord) -> Result<Self, MapError> {
        Ok(Self {
            object_id: row.require_i64("ObjectID")?,
            devtype_id: row.require_i64("DevTypeID")?,
            name: row.require("Name")?.to_string(),
            uid: row.require("UID")?.to_string(),
        })
    }
}

/// A parameter a device type reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub devtype_id: i64,
    pub parameters_list_id: i64,
    pub parameter_types_id: i64,
    pub parameter_type_class_id: i64,
    pub name: String,
    pub mnemonic: String,
    pub unit: String,
    /// Digits before the decimal point.
    pub positions: i32,
    /// Digits after the decimal point.
    pub precision: i32,
}

fn int_or(row: &RowRecord, column: &str, fallback: i32) -> Result<i32, MapError> {
    Ok(row.require(column)?.trim().parse().unwrap_or(fallback))
}

impl ParameterInfo {
    /// Map a parameter catalog row.
    ///
    /// # Errors
    /// Returns error if a column is missing or an id is not an integer.
    pub fn from_row(row: &RowRecord) -> Result<Self, MapError> {
        Ok(Self {
            devtype_id: row.require_i64("DevTypeID")?,
            parameters_list_id: row.require_i64("ParametersListID")?,
            parameter_types_id: row.require_i64("ParameterTypesID")?,
            parameter_type_class_id: row.require_i64("ParameterTypeClassID")?,
            name: row.require("ParamName")?.to_string(),
            mnemonic: row.require("MnemoCode")?.to_string(),
            unit: row.require("MeasUnit")?.to_string(),
            positions: int_or(row, "ParamPositions", DEFAULT_POSITIONS)?,
            precision: int_or(row, "ParamPrecision", DEFAULT_PRECISION)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(columns: &[(&str, Option<&str>)]) -> RowRecord {
        RowRecord::from_columns(
            columns
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.map(str::to_string))),
        )
    }

    #[test]
    fn test_sample_from_row() {
        let sample = TelemetrySample::from_row(&record(&[
            ("ParametersListID", Some("17")),
            ("ValueDateTime", Some("2024-03-01 10:15:00")),
            ("ParamValueTXT", Some("42")),
            ("Reason", Some("42")),
        ]))
        .unwrap();
        assert_eq!(sample.parameters_list_id, 17);
        assert!(sample.is_alarm());
    }

    #[test]
    fn test_null_reason_is_not_an_alarm() {
        let sample = TelemetrySample::from_row(&record(&[
            ("ParametersListID", Some("17")),
            ("ValueDateTime", Some("2024-03-01 10:15:00")),
            ("ParamValueTXT", Some("42")),
            ("Reason", None),
        ]))
        .unwrap();
        assert_eq!(sample.reason, "");
        assert!(!sample.is_alarm());
    }

    #[test]
    fn test_sample_rejects_bad_id() {
        let err = TelemetrySample::from_row(&record(&[
            ("ParametersListID", Some("x")),
            ("ValueDateTime", Some("")),
            ("ParamValueTXT", Some("")),
            ("Reason", Some("")),
        ]))
        .unwrap_err();
        assert!(matches!(err, MapError::InvalidValue { ref column, .. } if column == "ParametersListID"));
    }

    #[test]
    fn test_device_requires_uid() {
        let err = DeviceInfo::from_row(&record(&[
            ("ObjectID", Some("3")),
            ("DevTypeID", Some("1")),
            ("Name", Some("Boiler room")),
        ]))
        .unwrap_err();
        assert_eq!(err, MapError::MissingColumn("UID".to_string()));
    }

    #[test]
    fn test_parameter_digit_fallbacks() {
        let info = ParameterInfo::from_row(&record(&[
            ("DevTypeID", Some("1")),
            ("ParametersListID", Some("17")),
            ("ParameterTypesID", Some("2")),
            ("ParameterTypeClassID", Some("4")),
            ("ParamName", Some("Pressure")),
            ("MnemoCode", Some("P1")),
            ("MeasUnit", Some("bar")),
            ("ParamPositions", Some("n/a")),
            ("ParamPrecision", None),
        ]))
        .unwrap();
        assert_eq!(info.positions, 9);
        assert_eq!(info.precision, 0);
        assert_eq!(info.unit, "bar");
    }
}
