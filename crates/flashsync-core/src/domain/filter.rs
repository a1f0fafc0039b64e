//! Target filter deciding which card files take part in copying

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use super::file_entry::FileEntry;

/// Which dates are copied from the card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPeriod {
    /// Every image on the card
    #[default]
    All,
    /// Images taken today
    Today,
    /// Images taken on one of the selected dates
    Select,
}

/// Date filter applied to catalog entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFilter {
    pub period: TargetPeriod,
    #[serde(default)]
    pub dates: Vec<NaiveDate>,
}

impl TargetFilter {
    pub fn new(period: TargetPeriod, dates: Vec<NaiveDate>) -> Self {
        Self { period, dates }
    }

    /// A `Select` filter with no dates can never match anything
    pub fn is_usable(&self) -> bool {
        self.period != TargetPeriod::Select || !self.dates.is_empty()
    }

    pub fn matches(&self, entry: &FileEntry) -> bool {
        self.matches_on(entry, Local::now().date_naive())
    }

    /// Same as [`matches`](Self::matches) with an explicit "today"
    pub fn matches_on(&self, entry: &FileEntry, today: NaiveDate) -> bool {
        let date = entry.date().date();
        match self.period {
            TargetPeriod::All => true,
            TargetPeriod::Today => date == today,
            TargetPeriod::Select => self.dates.contains(&date),
        }
    }
}
