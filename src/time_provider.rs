
use chrono::{Local, NaiveDateTime};

#[cfg(test)]
use mockall::automock;

pub const SNAPSHOT_TS_FORMAT: &str = "%Y%m%d_%H%M%S";

#[cfg_attr(test, automock)]
pub trait TimeProvider : Send + Sync {
    /// Local wall-clock time captured when the run began
    fn naive_local_start(&self) -> NaiveDateTime;
    fn naive_local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

pub struct CoreTimeProvider { start: NaiveDateTime }
impl CoreTimeProvider {
    pub fn new() -> Self {
        Self { start: Local::now().naive_local() }
    }
}
impl Default for CoreTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}
impl TimeProvider for CoreTimeProvider {
    fn naive_local_start(&self) -> NaiveDateTime {
        self.start
    }
}

///
/// Formats a run's start time as a snapshot directory name
///
pub fn snapshot_name(time_provider: &dyn TimeProvider) -> String {
    time_provider.naive_local_start().format(SNAPSHOT_TS_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_snapshot_name_is_fixed_width() {
        let mut tp = MockTimeProvider::new();
        tp.expect_naive_local_start()
            .returning(|| NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(4, 5, 6).unwrap());

        assert_eq!(snapshot_name(&tp), "20240309_040506");
    }
}
