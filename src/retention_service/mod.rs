use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::{
    snapshot::{error::Result, list_snapshots, tier::{read_tier, write_tier, Tier}, Snapshot},
    time_provider::TimeProvider,
};

///
/// Per-tier retention counts
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub daily: usize,
    pub weekly: usize,
    pub monthly: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { daily: 7, weekly: 4, monthly: 3 }
    }
}

///
/// A snapshot paired with its tier. `None` marks a snapshot whose name does
/// not carry a valid date; it is kept in the daily-only partition.
///
#[derive(Debug, Clone)]
pub struct Classified {
    pub snapshot: Snapshot,
    pub tier: Option<Tier>,
}

impl Classified {
    fn is_daily_only(&self) -> bool {
        matches!(self.tier, None | Some(Tier::Daily))
    }
    fn is_weekly(&self) -> bool {
        self.tier.map_or(false, Tier::is_weekly)
    }
    fn is_monthly(&self) -> bool {
        self.tier.map_or(false, Tier::is_monthly)
    }
}

impl RetentionPolicy {
    ///
    /// Returns the snapshots this policy would delete. Each partition is
    /// ranked newest first; a monthly snapshot is never deleted by the
    /// weekly partition.
    ///
    pub fn expired<'a>(&self, snapshots: &'a [Classified]) -> Vec<&'a Snapshot> {
        let mut ranked: Vec<&Classified> = snapshots.iter().collect();
        ranked.sort_by(|a, b| b.snapshot.name.cmp(&a.snapshot.name));

        let daily = ranked.iter().filter(|c| c.is_daily_only()).skip(self.daily);
        let weekly = ranked.iter().filter(|c| c.is_weekly()).skip(self.weekly)
            .filter(|c| !c.is_monthly());
        let monthly = ranked.iter().filter(|c| c.is_monthly()).skip(self.monthly);

        daily.chain(weekly).chain(monthly).map(|c| &c.snapshot).collect()
    }
}

#[derive(Debug, Default)]
pub struct RotationReport {
    pub newly_classified: Vec<String>,
    pub unclassifiable: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

pub struct RetentionService<'a> {
    policy: RetentionPolicy,
    time_provider: &'a dyn TimeProvider,
}

impl<'a> RetentionService<'a> {
    pub fn new(policy: RetentionPolicy, time_provider: &'a dyn TimeProvider) -> Self {
        Self { policy, time_provider }
    }

    ///
    /// Assigns a tier to every snapshot that has none yet and returns all
    /// snapshots with their tier. Snapshots with an unreadable tier record
    /// are left out so that rotation never touches them.
    ///
    pub fn classify(&self, backups_dir: &Path, report: &mut RotationReport) -> Result<Vec<Classified>> {
        let mut classified = Vec::new();

        for snapshot in list_snapshots(backups_dir)? {
            let tier = match read_tier(&snapshot.path) {
                Ok(Some(tier)) => Some(tier),
                Ok(None) => self.assign(&snapshot, report),
                Err(e) => {
                    warn!("Ignoring {} during rotation, tier record unreadable: {}", snapshot.name, e);
                    continue;
                }
            };
            classified.push(Classified { snapshot, tier });
        }

        Ok(classified)
    }

    fn assign(&self, snapshot: &Snapshot, report: &mut RotationReport) -> Option<Tier> {
        let Some(date) = snapshot.date() else {
            warn!("Backup {} has no valid date in its name, treating it as daily", snapshot.name);
            report.unclassifiable.push(snapshot.name.clone());
            return None;
        };

        let tier = Tier::for_date(date);
        match write_tier(&snapshot.path, tier, self.time_provider.naive_local_now()) {
            Ok(()) => {
                if tier != Tier::Daily {
                    info!("Marked {} as {}", snapshot.name, tier.label().to_lowercase());
                }
                report.newly_classified.push(snapshot.name.clone());
            }
            Err(e) => error!("Could not record tier for {}: {}", snapshot.name, e),
        }
        Some(tier)
    }

    ///
    /// Classifies every snapshot under `backups_dir`, then deletes those the
    /// policy no longer retains. A failed deletion does not stop the others.
    ///
    pub fn rotate(&self, backups_dir: &Path) -> Result<RotationReport> {
        info!("Rotating backups (daily: {}, weekly: {}, monthly: {})",
            self.policy.daily, self.policy.weekly, self.policy.monthly);

        let mut report = RotationReport::default();
        let classified = self.classify(backups_dir, &mut report)?;

        for snapshot in self.policy.expired(&classified) {
            match std::fs::remove_dir_all(&snapshot.path) {
                Ok(()) => {
                    info!("Removed old backup {}", snapshot.name);
                    report.deleted.push(snapshot.name.clone());
                }
                Err(e) => {
                    error!("Failed to remove {}: {}", snapshot.path.display(), e);
                    report.failed.push(snapshot.name.clone());
                }
            }
        }

        debug!("Rotation finished: {:?}", report);
        Ok(report)
    }
}
