//! Cheap check deciding whether a full collection pass is worth running.
//!
//! The check lists a single reference pair and compares the newest object date
//! with the `to_date` recorded for that pair in the persisted table.

use std::path::PathBuf;
use std::sync::Arc;

use time::Date;
use tracing::{info, warn};

use crate::domain::{format_date, parse_date, AvailabilityWindow, InstrumentPair};
use crate::listing::{timestamp_dates, ListingClient};
use crate::table::read_records;
use crate::AtlasError;

/// Why the detector reached its verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StalenessReason {
    TableMissing,
    TableUnreadable(String),
    ReferenceRowMissing,
    LatestDateChanged {
        recorded: Option<Date>,
        observed: Option<Date>,
    },
    UpToDate,
}

/// Outcome of one staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessReport {
    pub reference: InstrumentPair,
    pub reason: StalenessReason,
}

impl StalenessReport {
    pub fn is_stale(&self) -> bool {
        !matches!(self.reason, StalenessReason::UpToDate)
    }
}

#[derive(Clone)]
pub struct StalenessDetector {
    listing: Arc<ListingClient>,
    table_path: PathBuf,
    reference: InstrumentPair,
}

impl StalenessDetector {
    pub fn new(
        listing: Arc<ListingClient>,
        table_path: impl Into<PathBuf>,
        reference: InstrumentPair,
    ) -> Self {
        Self {
            listing,
            table_path: table_path.into(),
            reference,
        }
    }

    /// True when the reference pair's newest remote date differs from the table.
    pub async fn is_new_data_available(&self) -> Result<bool, AtlasError> {
        Ok(self.check().await?.is_stale())
    }

    /// Runs the check. Only a transport failure on the remote listing is an error.
    pub async fn check(&self) -> Result<StalenessReport, AtlasError> {
        let timestamps = self.listing.list_pair_timestamps(&self.reference).await?;
        let observed = AvailabilityWindow::from_dates(timestamp_dates(&timestamps)).latest();
        info!(
            reference = %self.reference,
            observed = %observed.map(format_date).unwrap_or_default(),
            "latest remote date for reference pair"
        );

        let reason = self.compare_with_table(observed);
        let report = StalenessReport {
            reference: self.reference.clone(),
            reason,
        };
        info!(stale = report.is_stale(), reason = ?report.reason, "staleness verdict");
        Ok(report)
    }

    fn compare_with_table(&self, observed: Option<Date>) -> StalenessReason {
        if !self.table_path.exists() {
            return StalenessReason::TableMissing;
        }

        let records = match read_records(&self.table_path) {
            Ok(records) => records,
            Err(error) => {
                warn!(path = %self.table_path.display(), %error, "result table unreadable");
                return StalenessReason::TableUnreadable(error.to_string());
            }
        };

        // Other rows are never validated; only the reference row's to_date matters.
        let Some(record) = records.iter().find(|record| {
            record.datatype == self.reference.datatype
                && record.instrument == self.reference.instrument
        }) else {
            return StalenessReason::ReferenceRowMissing;
        };

        let recorded = match record.to_date.trim() {
            "" => None,
            to_date => match parse_date(to_date) {
                Ok(date) => Some(date),
                Err(error) => {
                    warn!(%error, "reference row has an invalid to_date");
                    return StalenessReason::TableUnreadable(error.to_string());
                }
            },
        };

        if recorded == observed {
            StalenessReason::UpToDate
        } else {
            StalenessReason::LatestDateChanged { recorded, observed }
        }
    }
}
