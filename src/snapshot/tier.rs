use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

use super::error::*;

pub const TIER_RECORD_FILE: &str = ".tier.json";
pub const LEGACY_WEEKLY_MARKER: &str = ".weekly";
pub const LEGACY_MONTHLY_MARKER: &str = ".monthly";

///
/// Retention tier of a snapshot, derived once from the calendar date in its name
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Daily,
    Weekly,
    Monthly,
    WeeklyAndMonthly,
}

impl Tier {
    ///
    /// Sunday makes a snapshot weekly, the 1st of the month makes it monthly
    ///
    pub fn for_date(date: NaiveDate) -> Self {
        Self::from_flags(date.weekday() == Weekday::Sun, date.day() == 1)
    }

    fn from_flags(weekly: bool, monthly: bool) -> Self {
        match (weekly, monthly) {
            (true, true) => Tier::WeeklyAndMonthly,
            (true, false) => Tier::Weekly,
            (false, true) => Tier::Monthly,
            (false, false) => Tier::Daily,
        }
    }

    pub fn is_weekly(self) -> bool {
        matches!(self, Tier::Weekly | Tier::WeeklyAndMonthly)
    }

    pub fn is_monthly(self) -> bool {
        matches!(self, Tier::Monthly | Tier::WeeklyAndMonthly)
    }

    pub fn label(self) -> &'static str {
        if self.is_monthly() {
            "Monthly"
        } else if self.is_weekly() {
            "Weekly"
        } else {
            "Daily"
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TierRecord {
    tier: Tier,
    assigned_at: NaiveDateTime,
}

///
/// Reads the stored tier of the snapshot at `dir`. The sidecar record wins;
/// without one the legacy marker files are consulted. `None` means the
/// snapshot has never been classified.
///
pub fn read_tier(dir: &Path) -> Result<Option<Tier>> {
    let record_path = dir.join(TIER_RECORD_FILE);
    if record_path.exists() {
        let record: TierRecord = serde_json::from_str(&std::fs::read_to_string(record_path)?)?;
        return Ok(Some(record.tier));
    }

    let weekly = dir.join(LEGACY_WEEKLY_MARKER).exists();
    let monthly = dir.join(LEGACY_MONTHLY_MARKER).exists();
    if weekly || monthly {
        return Ok(Some(Tier::from_flags(weekly, monthly)));
    }

    Ok(None)
}

pub fn write_tier(dir: &Path, tier: Tier, assigned_at: NaiveDateTime) -> Result<()> {
    let record = TierRecord { tier, assigned_at };
    std::fs::write(dir.join(TIER_RECORD_FILE), serde_json::to_vec_pretty(&record)?)?;
    Ok(())
}
