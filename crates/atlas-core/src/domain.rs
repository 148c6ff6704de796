//! Availability windows and result rows.
//!
//! Dates travel as `YYYY-MM-DD` strings on disk (cache file, result table) and
//! as [`time::Date`] in memory. An empty string on disk is the "no objects
//! observed" sentinel and maps to [`AvailabilityWindow::Empty`].

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::Date;

use crate::AtlasError;

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<Date, AtlasError> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|_| AtlasError::parse(format!("invalid calendar date '{value}'")))
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Extracts the calendar date from an RFC 3339 timestamp such as
/// `2024-01-05T01:02:03.000Z`. Only the portion before the `T` (or the space
/// separator RFC 3339 also permits) is used.
pub fn timestamp_date(timestamp: &str) -> Result<Date, AtlasError> {
    let trimmed = timestamp.trim();
    let date_part = trimmed.split(['T', 't', ' ']).next().unwrap_or(trimmed);
    parse_date(date_part)
}

/// Inclusive date range between the first and last observed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub enum AvailabilityWindow {
    /// Nothing was listed under the pair's prefix.
    Empty,
    Range { earliest: Date, latest: Date },
}

impl AvailabilityWindow {
    pub fn new(earliest: Date, latest: Date) -> Result<Self, AtlasError> {
        if earliest > latest {
            return Err(AtlasError::parse(format!(
                "window start {} is after end {}",
                format_date(earliest),
                format_date(latest)
            )));
        }
        Ok(Self::Range { earliest, latest })
    }

    /// Builds the window spanning every date in `dates`.
    pub fn from_dates<I>(dates: I) -> Self
    where
        I: IntoIterator<Item = Date>,
    {
        dates.into_iter().fold(Self::Empty, |window, date| match window {
            Self::Empty => Self::Range {
                earliest: date,
                latest: date,
            },
            Self::Range { earliest, latest } => Self::Range {
                earliest: earliest.min(date),
                latest: latest.max(date),
            },
        })
    }

    /// Parses the on-disk pair of strings; `("", "")` is the empty window.
    pub fn from_strings(from_date: &str, to_date: &str) -> Result<Self, AtlasError> {
        match (from_date.trim(), to_date.trim()) {
            ("", "") => Ok(Self::Empty),
            ("", _) | (_, "") => Err(AtlasError::parse(format!(
                "half-open window '{from_date}'..'{to_date}'"
            ))),
            (from, to) => Self::new(parse_date(from)?, parse_date(to)?),
        }
    }

    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub const fn earliest(&self) -> Option<Date> {
        match self {
            Self::Empty => None,
            Self::Range { earliest, .. } => Some(*earliest),
        }
    }

    pub const fn latest(&self) -> Option<Date> {
        match self {
            Self::Empty => None,
            Self::Range { latest, .. } => Some(*latest),
        }
    }

    pub fn from_date_string(&self) -> String {
        self.earliest().map(format_date).unwrap_or_default()
    }

    pub fn to_date_string(&self) -> String {
        self.latest().map(format_date).unwrap_or_default()
    }
}

impl Default for AvailabilityWindow {
    fn default() -> Self {
        Self::Empty
    }
}

// Empty sorts first, matching the ordering of the "" sentinel on disk.
impl PartialOrd for AvailabilityWindow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AvailabilityWindow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.earliest()
            .cmp(&other.earliest())
            .then_with(|| self.latest().cmp(&other.latest()))
    }
}

impl Display for AvailabilityWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("(empty)"),
            Self::Range { earliest, latest } => {
                write!(f, "{}..{}", format_date(*earliest), format_date(*latest))
            }
        }
    }
}

impl TryFrom<(String, String)> for AvailabilityWindow {
    type Error = AtlasError;

    fn try_from((from_date, to_date): (String, String)) -> Result<Self, Self::Error> {
        Self::from_strings(&from_date, &to_date)
    }
}

impl From<AvailabilityWindow> for (String, String) {
    fn from(value: AvailabilityWindow) -> Self {
        (value.from_date_string(), value.to_date_string())
    }
}

/// A `(datatype, instrument)` pair under the bucket prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentPair {
    pub datatype: String,
    pub instrument: String,
}

impl InstrumentPair {
    pub fn new(datatype: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self {
            datatype: datatype.into(),
            instrument: instrument.into(),
        }
    }

    /// Composite cache key, `"{datatype}-{instrument}"`.
    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.datatype, self.instrument)
    }

    /// Object prefix relative to the bucket's base prefix.
    pub fn relative_prefix(&self) -> String {
        format!("{}/{}/", self.datatype, self.instrument)
    }
}

impl Display for InstrumentPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.datatype, self.instrument)
    }
}

/// One line of the result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentRow {
    pub datatype: String,
    pub instrument: String,
    pub window: AvailabilityWindow,
}

impl InstrumentRow {
    pub fn new(pair: InstrumentPair, window: AvailabilityWindow) -> Self {
        Self {
            datatype: pair.datatype,
            instrument: pair.instrument,
            window,
        }
    }

    pub fn from_date(&self) -> String {
        self.window.from_date_string()
    }

    pub fn to_date(&self) -> String {
        self.window.to_date_string()
    }

    fn sort_key(&self) -> (&str, &str, Option<Date>) {
        (&self.datatype, &self.instrument, self.window.earliest())
    }
}

/// Stable ascending sort by `(datatype, instrument, from_date)`.
pub fn sort_rows(rows: &mut [InstrumentRow]) {
    rows.sort_by(|left, right| left.sort_key().cmp(&right.sort_key()));
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn extracts_date_from_listing_timestamp() {
        let date = timestamp_date("2024-01-05T13:45:10.000Z").expect("valid timestamp");
        assert_eq!(date, date!(2024 - 01 - 05));
    }

    #[test]
    fn accepts_space_and_lowercase_separators() {
        assert_eq!(
            timestamp_date("2024-01-05 13:45:10Z").expect("space separator"),
            date!(2024 - 01 - 05)
        );
        assert_eq!(
            timestamp_date("2024-01-05t13:45:10Z").expect("lowercase separator"),
            date!(2024 - 01 - 05)
        );
        assert_eq!(
            timestamp_date("2024-01-05").expect("bare date"),
            date!(2024 - 01 - 05)
        );
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(timestamp_date("yesterday").is_err());
    }

    #[test]
    fn window_spans_min_and_max() {
        let window = AvailabilityWindow::from_dates([
            date!(2024 - 03 - 01),
            date!(2024 - 01 - 01),
            date!(2024 - 06 - 01),
        ]);

        assert_eq!(window.from_date_string(), "2024-01-01");
        assert_eq!(window.to_date_string(), "2024-06-01");
    }

    #[test]
    fn no_dates_is_the_empty_sentinel() {
        let window = AvailabilityWindow::from_dates(Vec::new());
        assert!(window.is_empty());
        assert_eq!(
            <(String, String)>::from(window),
            (String::new(), String::new())
        );
    }

    #[test]
    fn inverted_window_is_rejected() {
        let error = AvailabilityWindow::new(date!(2024 - 02 - 01), date!(2024 - 01 - 01))
            .expect_err("start after end");
        assert!(matches!(error, AtlasError::Parse(_)));
    }

    #[test]
    fn half_open_strings_are_rejected() {
        assert!(AvailabilityWindow::from_strings("2024-01-01", "").is_err());
        assert!(AvailabilityWindow::from_strings("", "").expect("empty").is_empty());
    }

    #[test]
    fn window_serializes_as_string_pair() {
        let window = AvailabilityWindow::new(date!(2024 - 01 - 01), date!(2024 - 06 - 01))
            .expect("ordered");
        let json = serde_json::to_string(&window).expect("serialize");
        assert_eq!(json, r#"["2024-01-01","2024-06-01"]"#);

        let empty: AvailabilityWindow = serde_json::from_str(r#"["",""]"#).expect("deserialize");
        assert!(empty.is_empty());
    }

    #[test]
    fn cache_key_joins_with_dash() {
        let pair = InstrumentPair::new("klines", "BTCUSDT");
        assert_eq!(pair.cache_key(), "klines-BTCUSDT");
        assert_eq!(pair.relative_prefix(), "klines/BTCUSDT/");
    }

    #[test]
    fn rows_sort_with_empty_windows_first_within_instrument() {
        let mut rows = vec![
            InstrumentRow::new(
                InstrumentPair::new("trades", "BTCUSDT"),
                AvailabilityWindow::Empty,
            ),
            InstrumentRow::new(
                InstrumentPair::new("klines", "ETHUSDT"),
                AvailabilityWindow::from_dates([date!(2024 - 02 - 01)]),
            ),
            InstrumentRow::new(
                InstrumentPair::new("klines", "BTCUSDT"),
                AvailabilityWindow::from_dates([date!(2024 - 01 - 01)]),
            ),
        ];

        sort_rows(&mut rows);

        let order: Vec<_> = rows
            .iter()
            .map(|row| format!("{}/{}", row.datatype, row.instrument))
            .collect();
        assert_eq!(order, ["klines/BTCUSDT", "klines/ETHUSDT", "trades/BTCUSDT"]);
    }
}
