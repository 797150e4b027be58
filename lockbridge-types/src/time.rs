//! Network time and the lock's timezone encoding

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

use crate::error::{Error, Result};

/// Timezone as the lock expects it: `hours * 10 + quarters * 3`
///
/// `quarters` is the fractional hour rounded to the nearest quarter, so
/// UTC+8 is 80, UTC-3.5 is -36 and UTC+5.75 is 59.
///
/// # Examples
///
/// ```
/// use lockbridge_types::TimeZoneCode;
///
/// let zone: TimeZoneCode = "UTC +8".parse().unwrap();
/// assert_eq!(zone.code(), 80);
///
/// assert_eq!(TimeZoneCode::from_offset_hours(-3.5).unwrap().code(), -36);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeZoneCode(i8);

impl TimeZoneCode {
    pub const UTC: TimeZoneCode = TimeZoneCode(0);

    pub fn from_code(code: i8) -> Self {
        Self(code)
    }

    /// Encode an offset in hours
    pub fn from_offset_hours(hours: f32) -> Result<Self> {
        if !hours.is_finite() {
            return Err(Error::Validation(format!("timezone offset {} is not finite", hours)));
        }

        let whole = hours.trunc();
        let quarters = ((hours - whole) * 4.0).round() as i32;
        let code = whole as i32 * 10 + quarters * 3;

        i8::try_from(code)
            .map(Self)
            .map_err(|_| Error::Validation(format!("timezone offset {} out of range", hours)))
    }

    pub fn code(self) -> i8 {
        self.0
    }

    /// Offset from UTC in seconds
    pub fn offset_seconds(self) -> i32 {
        let code = self.0 as i32;
        let hours = code / 10;
        let quarters = (code % 10) / 3;
        hours * 3600 + quarters * 15 * 60
    }
}

impl FromStr for TimeZoneCode {
    type Err = Error;

    /// Accepts `"UTC +8"`, `"UTC-3.5"`, or a bare `"5.75"`
    fn from_str(s: &str) -> Result<Self> {
        let rest = match s.find("UTC") {
            Some(idx) => &s[idx + 3..],
            None => s,
        };
        let rest: String = rest.chars().filter(|c| !c.is_whitespace()).collect();

        let hours: f32 = rest
            .parse()
            .map_err(|_| Error::Parse(format!("no zone offset in '{}'", s)))?;

        Self::from_offset_hours(hours)
    }
}

impl fmt::Display for TimeZoneCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cached cloud time
///
/// `utc_seconds == 0` means the clock has never been synchronised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkTime {
    pub utc_seconds: u32,
    pub zone: TimeZoneCode,
}

impl NetworkTime {
    pub fn new(utc_seconds: u32, zone: TimeZoneCode) -> Self {
        Self { utc_seconds, zone }
    }

    pub fn is_synchronized(&self) -> bool {
        self.utc_seconds != 0
    }

    /// Local wall-clock time, `None` before the first sync
    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        if !self.is_synchronized() {
            return None;
        }
        let offset = FixedOffset::east_opt(self.zone.offset_seconds())?;
        let utc = Utc.timestamp_opt(self.utc_seconds as i64, 0).single()?;
        Some(utc.with_timezone(&offset))
    }
}

impl fmt::Display for NetworkTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{} (tz code {})", dt.to_rfc3339(), self.zone),
            None => write!(f, "unsynchronised"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_zone_codes() {
        assert_eq!(TimeZoneCode::from_offset_hours(8.0).unwrap().code(), 80);
        assert_eq!(TimeZoneCode::from_offset_hours(-3.5).unwrap().code(), -36);
        assert_eq!(TimeZoneCode::from_offset_hours(5.75).unwrap().code(), 59);
        assert_eq!(TimeZoneCode::from_offset_hours(5.5).unwrap().code(), 56);
        assert_eq!(TimeZoneCode::from_offset_hours(0.0).unwrap().code(), 0);
    }

    #[test]
    fn test_zone_out_of_range() {
        assert!(TimeZoneCode::from_offset_hours(15.0).is_err());
        assert!(TimeZoneCode::from_offset_hours(f32::NAN).is_err());
    }

    #[test]
    fn test_parse_zone_strings() {
        assert_eq!("UTC +8".parse::<TimeZoneCode>().unwrap().code(), 80);
        assert_eq!("UTC -3.5".parse::<TimeZoneCode>().unwrap().code(), -36);
        assert_eq!("UTC+5.75".parse::<TimeZoneCode>().unwrap().code(), 59);
        assert_eq!("9".parse::<TimeZoneCode>().unwrap().code(), 90);
        assert!("UTC".parse::<TimeZoneCode>().is_err());
        assert!("Europe/Paris".parse::<TimeZoneCode>().is_err());
    }

    #[test]
    fn test_offset_seconds() {
        assert_eq!(TimeZoneCode::from_code(80).offset_seconds(), 8 * 3600);
        assert_eq!(TimeZoneCode::from_code(-36).offset_seconds(), -(3 * 3600 + 1800));
        assert_eq!(TimeZoneCode::from_code(59).offset_seconds(), 5 * 3600 + 2700);
    }

    #[test]
    fn test_network_time_sync_flag() {
        assert!(!NetworkTime::default().is_synchronized());
        assert!(NetworkTime::default().to_datetime().is_none());

        let time = NetworkTime::new(1_700_000_000, TimeZoneCode::from_code(80));
        assert!(time.is_synchronized());

        let dt = time.to_datetime().unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 8 * 3600);
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }
}
