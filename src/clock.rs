use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Source of "now" for output file names, so merges are reproducible in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    /// `YYYYmmdd_HHMMSS` in local time, used to keep merged outputs from
    /// overwriting earlier runs.
    fn timestamp_slug(&self) -> String {
        self.now().format("%Y%m%d_%H%M%S").to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock {
    now: DateTime<Local>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self { now }
    }

    /// Pin the clock to a wall-clock time in the local zone.
    pub fn at_local(naive: NaiveDateTime) -> Self {
        let now = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| Local.from_utc_datetime(&naive));
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.now
    }
}
