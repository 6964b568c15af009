//! Clock offset measurement against the device

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde_json::Value;

use crate::service::ServiceInstance;

/// Outcome of a clock calibration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Calibration {
    /// `offset` is the device UTC time minus the local UTC time
    Adjusted { offset: TimeDelta },
    Skipped { reason: String },
}

fn field(parent: &Value, key: &str) -> Option<u32> {
    match parent.get(key)? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        _ => None,
    }
}

/// `UTCDateTime` of a `GetSystemDateAndTime` result
pub fn device_utc(response: &Value) -> Option<DateTime<Utc>> {
    let system = response.get("SystemDateAndTime").unwrap_or(response);
    let utc = system.get("UTCDateTime")?;
    let date = utc.get("Date")?;
    let time = utc.get("Time")?;

    let year = i32::try_from(field(date, "Year")?).ok()?;
    NaiveDate::from_ymd_opt(year, field(date, "Month")?, field(date, "Day")?)?
        .and_hms_opt(field(time, "Hour")?, field(time, "Minute")?, field(time, "Second")?)
        .map(|t| t.and_utc())
}

/// Asks the device for its time and compares it with the local clock.
pub fn measure_offset(devicemgmt: &ServiceInstance) -> Calibration {
    let response = match devicemgmt.invoke("GetSystemDateAndTime", &()) {
        Ok(response) => response,
        Err(e) => {
            return Calibration::Skipped {
                reason: e.to_string(),
            };
        }
    };
    let local = Utc::now();

    match device_utc(&response) {
        Some(device) => Calibration::Adjusted {
            offset: device - local,
        },
        None => Calibration::Skipped {
            reason: "no usable UTCDateTime in GetSystemDateAndTime response".to_string(),
        },
    }
}
