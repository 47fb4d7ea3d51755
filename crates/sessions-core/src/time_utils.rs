use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::error::{LoaderError, Result};

/// Offset-less layouts accepted for timestamp columns, tried in order.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d"];

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Resolve a configured timezone name, mapping `"auto"` to the system zone.
///
/// Unknown names are a configuration error rather than a silent fallback,
/// since every offset-less timestamp in the dataset depends on this choice.
pub fn resolve_timezone(name: &str) -> Result<Tz> {
    let resolved = if name.eq_ignore_ascii_case("auto") {
        get_system_timezone()
    } else {
        name.to_string()
    };

    resolved
        .parse::<Tz>()
        .map_err(|_| LoaderError::Config(format!("unknown timezone {}", resolved)))
}

/// Earliest registration time still inside a window of `days` ending at `now`.
///
/// Windows reaching past the representable range saturate at
/// [`DateTime::<Utc>::MIN_UTC`], so every dated user falls inside them.
pub fn registration_cutoff(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ── TimezoneHandler ───────────────────────────────────────────────────────────

/// Parses timestamp cells, reading offset-less values as wall-clock time in
/// a configured zone.
#[derive(Debug, Clone, Copy)]
pub struct TimezoneHandler {
    default_tz: Tz,
}

impl Default for TimezoneHandler {
    fn default() -> Self {
        Self { default_tz: Tz::UTC }
    }
}

impl TimezoneHandler {
    /// Create a handler that interprets naive timestamps in `tz`.
    pub fn new(tz: Tz) -> Self {
        Self { default_tz: tz }
    }

    /// Create a handler in the system zone.
    ///
    /// Falls back to UTC with a warning if the system zone is not a known
    /// IANA name.
    pub fn system() -> Self {
        let tz = resolve_timezone("auto").unwrap_or_else(|err| {
            warn!("TimezoneHandler: {}, falling back to UTC", err);
            Tz::UTC
        });
        Self { default_tz: tz }
    }

    /// Parse a timestamp cell into UTC.
    ///
    /// Accepts RFC 3339 (including a `Z` suffix), RFC 2822, and the common
    /// offset-less layouts in [`NAIVE_DATETIME_FORMATS`] and
    /// [`NAIVE_DATE_FORMATS`]. Returns `None` for blank or unrecognised input.
    pub fn parse_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        let normalised = match s.strip_suffix('Z') {
            Some(stripped) => format!("{}+00:00", stripped),
            None => s.to_string(),
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }

        // fromisoformat-style space separator with an explicit offset.
        if let Ok(dt) = DateTime::parse_from_str(&normalised, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Some(dt.with_timezone(&Utc));
        }

        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(dt.with_timezone(&Utc));
        }

        for fmt in NAIVE_DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return self.localize(naive);
            }
        }

        for fmt in NAIVE_DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                return self.localize(date.and_hms_opt(0, 0, 0)?);
            }
        }

        debug!("TimezoneHandler: could not parse timestamp \"{}\"", s);
        None
    }

    /// Attach the default zone to a naive value and convert to UTC.
    ///
    /// Ambiguous local times (DST fall-back) resolve to the earlier instant.
    /// Times inside a spring-forward gap are pushed forward by one hour.
    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        let local = match self.default_tz.from_local_datetime(&naive) {
            LocalResult::None => self
                .default_tz
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest(),
            resolved => resolved.earliest(),
        };
        local.map(|dt| dt.with_timezone(&Utc))
    }

    /// Expose the configured default timezone.
    pub fn default_tz(&self) -> Tz {
        self.default_tz
    }

    /// Convert a UTC [`DateTime`] into the handler's zone for display.
    pub fn to_local(&self, dt: DateTime<Utc>) -> DateTime<Tz> {
        dt.with_timezone(&self.default_tz)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
