use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use income_proto::{Account, IncomeBreakdown, Report, Run, RunStatus};
use serde::{Deserialize, Serialize};

use crate::ReportError;

/// Persistence the run engine reads from and appends to.
pub trait ReportStore {
    fn get_previous_run(&self, run: &Run) -> Result<Option<Run>, ReportError>;

    /// `None` means the address has never been reported.
    fn get_latest_report_height_for(&self, address: &str) -> Result<Option<u64>, ReportError>;

    fn insert_report(
        &mut self,
        address: &str,
        run: &Run,
        income: &IncomeBreakdown,
    ) -> Result<(), ReportError>;

    fn run_ok(&mut self, run: &Run) -> Result<(), ReportError>;

    fn run_error(&mut self, run: &Run) -> Result<(), ReportError>;
}

/// Accounts, the height-ordered run history and every report written so far.
/// Usable directly as an in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLedger {
    #[serde(default)]
    accounts: Vec<Account>,
    #[serde(default)]
    runs: Vec<Run>,
    #[serde(default)]
    reports: Vec<Report>,
}

impl ReportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// All runs, ascending by height.
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn run_at(&self, height: u64) -> Option<&Run> {
        self.runs
            .binary_search_by_key(&height, |run| run.height)
            .ok()
            .map(|index| &self.runs[index])
    }

    /// Runs not yet finished `ok`, ascending by height. Runs left in `error`
    /// are included so a re-invocation completes them.
    pub fn unfinished_runs(&self) -> Vec<Run> {
        self.runs
            .iter()
            .filter(|run| run.status != RunStatus::Ok)
            .cloned()
            .collect()
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn reports_for<'a>(&'a self, address: &'a str) -> impl Iterator<Item = &'a Report> + 'a {
        self.reports
            .iter()
            .filter(move |report| report.address == address)
    }

    /// Registers an account. A repeated address keeps the lowest first-seen
    /// height.
    pub fn add_account(
        &mut self,
        address: impl Into<String>,
        first_seen_height: u64,
    ) -> Result<(), ReportError> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(ReportError::query(
                "add_account",
                "account address cannot be empty",
            ));
        }
        match self
            .accounts
            .iter_mut()
            .find(|account| account.address == address)
        {
            Some(existing) => {
                existing.first_seen_height = existing.first_seen_height.min(first_seen_height);
            }
            None => self.accounts.push(Account::new(address, first_seen_height)),
        }
        Ok(())
    }

    pub fn schedule_run(&mut self, height: u64, target_timestamp: i64) -> Result<Run, ReportError> {
        if height == 0 {
            return Err(ReportError::query(
                "schedule_run",
                "run height must be positive",
            ));
        }
        match self.runs.binary_search_by_key(&height, |run| run.height) {
            Ok(_) => Err(ReportError::query(
                "schedule_run",
                format!("run at height {} already exists", height),
            )),
            Err(index) => {
                let run = Run::pending(height, target_timestamp);
                self.runs.insert(index, run.clone());
                Ok(run)
            }
        }
    }

    fn set_run_status(&mut self, run: &Run, status: RunStatus) -> Result<(), ReportError> {
        let operation = match status {
            RunStatus::Ok => "run_ok",
            RunStatus::Error => "run_error",
            RunStatus::Pending => "run_pending",
        };
        let index = self
            .runs
            .binary_search_by_key(&run.height, |known| known.height)
            .map_err(|_| {
                ReportError::query(operation, format!("unknown run at height {}", run.height))
            })?;
        let current = self.runs[index].status;
        if !status_transition_allowed(current, status) {
            return Err(ReportError::query(
                operation,
                format!(
                    "run at height {} cannot move from {} to {}",
                    run.height, current, status
                ),
            ));
        }
        self.runs[index].status = status;
        Ok(())
    }
}

fn status_transition_allowed(current: RunStatus, next: RunStatus) -> bool {
    !matches!(
        (current, next),
        (_, RunStatus::Pending) | (RunStatus::Ok, RunStatus::Error)
    )
}

impl ReportStore for ReportLedger {
    fn get_previous_run(&self, run: &Run) -> Result<Option<Run>, ReportError> {
        let below = self.runs.partition_point(|known| known.height < run.height);
        Ok(below.checked_sub(1).map(|index| self.runs[index].clone()))
    }

    fn get_latest_report_height_for(&self, address: &str) -> Result<Option<u64>, ReportError> {
        Ok(self
            .reports_for(address)
            .map(|report| report.run_height)
            .max())
    }

    fn insert_report(
        &mut self,
        address: &str,
        run: &Run,
        income: &IncomeBreakdown,
    ) -> Result<(), ReportError> {
        if self.run_at(run.height).is_none() {
            return Err(ReportError::query(
                "insert_report",
                format!("unknown run at height {}", run.height),
            ));
        }
        if self
            .reports_for(address)
            .any(|report| report.run_height == run.height)
        {
            return Err(ReportError::query(
                "insert_report",
                format!(
                    "report for {} at height {} already recorded",
                    address, run.height
                ),
            ));
        }
        self.reports
            .push(Report::from_breakdown(address, run, income));
        Ok(())
    }

    fn run_ok(&mut self, run: &Run) -> Result<(), ReportError> {
        self.set_run_status(run, RunStatus::Ok)
    }

    fn run_error(&mut self, run: &Run) -> Result<(), ReportError> {
        self.set_run_status(run, RunStatus::Error)
    }
}

/// Ledger persisted as one JSON file, rewritten through a temp file and a
/// rename after every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFileReportStore {
    path: PathBuf,
    ledger: ReportLedger,
}

impl JsonFileReportStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let path = path.into();
        let ledger = load_ledger(&path)?.unwrap_or_default();
        Ok(Self { path, ledger })
    }

    pub fn ledger(&self) -> &ReportLedger {
        &self.ledger
    }

    pub fn add_account(
        &mut self,
        address: impl Into<String>,
        first_seen_height: u64,
    ) -> Result<(), ReportError> {
        let address = address.into();
        self.apply(|ledger| ledger.add_account(address, first_seen_height))
    }

    pub fn schedule_run(&mut self, height: u64, target_timestamp: i64) -> Result<Run, ReportError> {
        self.apply(|ledger| ledger.schedule_run(height, target_timestamp))
    }

    fn apply<T>(
        &mut self,
        mutate: impl FnOnce(&mut ReportLedger) -> Result<T, ReportError>,
    ) -> Result<T, ReportError> {
        let mut next = self.ledger.clone();
        let value = mutate(&mut next)?;
        save_ledger(&self.path, &next)?;
        self.ledger = next;
        Ok(value)
    }
}

impl ReportStore for JsonFileReportStore {
    fn get_previous_run(&self, run: &Run) -> Result<Option<Run>, ReportError> {
        self.ledger.get_previous_run(run)
    }

    fn get_latest_report_height_for(&self, address: &str) -> Result<Option<u64>, ReportError> {
        self.ledger.get_latest_report_height_for(address)
    }

    fn insert_report(
        &mut self,
        address: &str,
        run: &Run,
        income: &IncomeBreakdown,
    ) -> Result<(), ReportError> {
        self.apply(|ledger| ledger.insert_report(address, run, income))
    }

    fn run_ok(&mut self, run: &Run) -> Result<(), ReportError> {
        self.apply(|ledger| ledger.run_ok(run))
    }

    fn run_error(&mut self, run: &Run) -> Result<(), ReportError> {
        self.apply(|ledger| ledger.run_error(run))
    }
}

fn load_ledger(path: &Path) -> Result<Option<ReportLedger>, ReportError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(ReportError::query(
                "load_ledger",
                format!("read report ledger {} failed: {}", path.display(), err),
            ));
        }
    };
    let ledger = serde_json::from_slice::<ReportLedger>(&bytes).map_err(|err| {
        ReportError::query(
            "load_ledger",
            format!("parse report ledger {} failed: {}", path.display(), err),
        )
    })?;
    Ok(Some(ledger))
}

fn save_ledger(path: &Path, ledger: &ReportLedger) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            ReportError::query(
                "save_ledger",
                format!("create ledger dir {} failed: {}", parent.display(), err),
            )
        })?;
    }
    let bytes = serde_json::to_vec_pretty(ledger).map_err(|err| {
        ReportError::query("save_ledger", format!("serialize ledger failed: {}", err))
    })?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, bytes).map_err(|err| {
        ReportError::query(
            "save_ledger",
            format!("write ledger temp {} failed: {}", temp_path.display(), err),
        )
    })?;
    fs::rename(&temp_path, path).map_err(|err| {
        ReportError::query(
            "save_ledger",
            format!(
                "rename ledger temp {} -> {} failed: {}",
                temp_path.display(),
                path.display(),
                err
            ),
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("duration")
            .as_nanos();
        std::env::temp_dir().join(format!("income-reporter-store-tests-{prefix}-{unique}"))
    }

    fn income(rewards: u128) -> IncomeBreakdown {
        IncomeBreakdown {
            pending_rewards: rewards,
            pending_commission: 0,
            withdrawals: 0,
        }
    }

    #[test]
    fn previous_run_is_greatest_strictly_lower_height() {
        let mut ledger = ReportLedger::new();
        let r200 = ledger.schedule_run(200, 2).expect("r200");
        let r100 = ledger.schedule_run(100, 1).expect("r100");
        let r300 = ledger.schedule_run(300, 3).expect("r300");

        assert_eq!(ledger.get_previous_run(&r100).expect("prev"), None);
        assert_eq!(
            ledger.get_previous_run(&r200).expect("prev"),
            Some(r100.clone())
        );
        assert_eq!(ledger.get_previous_run(&r300).expect("prev"), Some(r200));
        let heights: Vec<u64> = ledger.runs().iter().map(|run| run.height).collect();
        assert_eq!(heights, vec![100, 200, 300]);
        assert!(ledger.schedule_run(100, 9).is_err());
        assert!(ledger.schedule_run(0, 9).is_err());
    }

    #[test]
    fn duplicate_report_for_same_run_is_rejected() {
        let mut ledger = ReportLedger::new();
        let run = ledger.schedule_run(100, 1).expect("run");
        ledger
            .insert_report("cosmos1a", &run, &income(5))
            .expect("first insert");
        let err = ledger
            .insert_report("cosmos1a", &run, &income(6))
            .expect_err("duplicate");
        assert!(matches!(err, ReportError::Query { .. }));
        ledger
            .insert_report("cosmos1b", &run, &income(7))
            .expect("other address");
        assert_eq!(
            ledger.get_latest_report_height_for("cosmos1a").expect("latest"),
            Some(100)
        );
        assert_eq!(
            ledger.get_latest_report_height_for("cosmos1c").expect("latest"),
            None
        );
    }

    #[test]
    fn insert_report_requires_known_run() {
        let mut ledger = ReportLedger::new();
        let stray = Run::pending(42, 0);
        assert!(ledger.insert_report("cosmos1a", &stray, &income(1)).is_err());
    }

    #[test]
    fn run_status_transitions() {
        let mut ledger = ReportLedger::new();
        let run = ledger.schedule_run(100, 1).expect("run");
        ledger.run_error(&run).expect("pending -> error");
        assert_eq!(ledger.unfinished_runs(), vec![Run {
            status: RunStatus::Error,
            ..run.clone()
        }]);
        ledger.run_ok(&run).expect("error -> ok");
        ledger.run_ok(&run).expect("ok -> ok");
        assert!(ledger.run_error(&run).is_err());
        assert_eq!(ledger.run_at(100).expect("run").status, RunStatus::Ok);
        assert!(ledger.unfinished_runs().is_empty());
        assert!(ledger.run_ok(&Run::pending(7, 0)).is_err());
    }

    #[test]
    fn add_account_keeps_lowest_first_seen_height() {
        let mut ledger = ReportLedger::new();
        ledger.add_account("cosmos1a", 150).expect("add");
        ledger.add_account("cosmos1b", 10).expect("add");
        ledger.add_account("cosmos1a", 120).expect("re-add");
        ledger.add_account("cosmos1a", 300).expect("re-add");
        assert_eq!(
            ledger.accounts(),
            &[Account::new("cosmos1a", 120), Account::new("cosmos1b", 10)]
        );
        assert!(ledger.add_account("  ", 1).is_err());
    }

    #[test]
    fn json_file_store_roundtrips_across_reopen() {
        let dir = temp_dir("reopen");
        let path = dir.join("ledger.json");
        {
            let mut store = JsonFileReportStore::open(&path).expect("open empty");
            assert!(store.ledger().runs().is_empty());
            store.add_account("cosmos1a", 1).expect("account");
            let run = store.schedule_run(100, 1_000).expect("run");
            store
                .insert_report("cosmos1a", &run, &income(9))
                .expect("report");
            store.run_ok(&run).expect("ok");
        }
        let store = JsonFileReportStore::open(&path).expect("reopen");
        assert_eq!(store.ledger().accounts().len(), 1);
        assert_eq!(store.ledger().run_at(100).expect("run").status, RunStatus::Ok);
        assert_eq!(store.ledger().reports()[0].pending_rewards, 9);
        assert!(!path.with_extension("json.tmp").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_file_store_leaves_disk_untouched_on_rejected_mutation() {
        let dir = temp_dir("rejected");
        let path = dir.join("ledger.json");
        let mut store = JsonFileReportStore::open(&path).expect("open");
        store.schedule_run(100, 1).expect("run");
        assert!(store.schedule_run(100, 2).is_err());
        let reopened = JsonFileReportStore::open(&path).expect("reopen");
        assert_eq!(reopened.ledger(), store.ledger());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_file_store_reports_corrupt_file() {
        let dir = temp_dir("corrupt");
        fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("ledger.json");
        fs::write(&path, b"{not json").expect("write");
        let err = JsonFileReportStore::open(&path).expect_err("corrupt");
        assert!(matches!(err, ReportError::Query { .. }));
        let _ = fs::remove_dir_all(&dir);
    }
}
