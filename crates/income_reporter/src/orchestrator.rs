use income_proto::{Account, Run};
use tracing::{info, warn};

use crate::calculator::IncomeCalculator;
use crate::chain_api::ChainApi;
use crate::eligibility::select_accounts;
use crate::store::ReportStore;
use crate::ReportError;

/// Notified after each account of a run has been reported.
pub trait RunProgressObserver {
    fn on_account_reported(&mut self, run: &Run, address: &str, index: usize, total: usize);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl RunProgressObserver for NoopProgress {
    fn on_account_reported(&mut self, _run: &Run, _address: &str, _index: usize, _total: usize) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub height: u64,
    pub reported_accounts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunBatchSummary {
    pub runs: Vec<RunOutcome>,
}

impl RunBatchSummary {
    pub fn reported_accounts(&self) -> usize {
        self.runs.iter().map(|run| run.reported_accounts).sum()
    }
}

/// Drives runs end to end: eligibility, per-account income, persistence and
/// the final run status.
pub struct RunOrchestrator<C, S> {
    calculator: IncomeCalculator<C>,
    store: S,
}

impl<C: ChainApi, S: ReportStore> RunOrchestrator<C, S> {
    pub fn new(calculator: IncomeCalculator<C>, store: S) -> Self {
        Self { calculator, store }
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn process(
        &mut self,
        accounts: &[Account],
        runs: &[Run],
    ) -> Result<RunBatchSummary, ReportError> {
        self.process_with_progress(accounts, runs, &mut NoopProgress)
    }

    /// Runs must be supplied in ascending height order. The first failure
    /// marks its run `error` and ends the batch.
    pub fn process_with_progress<P: RunProgressObserver + ?Sized>(
        &mut self,
        accounts: &[Account],
        runs: &[Run],
        progress: &mut P,
    ) -> Result<RunBatchSummary, ReportError> {
        let mut summary = RunBatchSummary::default();
        for run in runs {
            info!(
                height = run.height,
                target_timestamp = run.target_timestamp,
                "report run started"
            );
            let outcome = self
                .process_run(accounts, run, progress)
                .and_then(|reported_accounts| {
                    self.store.run_ok(run)?;
                    Ok(reported_accounts)
                });
            match outcome {
                Ok(reported_accounts) => {
                    if reported_accounts == 0 {
                        info!(height = run.height, "nothing to do");
                    } else {
                        info!(height = run.height, reported_accounts, "report run finished");
                    }
                    summary.runs.push(RunOutcome {
                        height: run.height,
                        reported_accounts,
                    });
                }
                Err(err) => {
                    warn!(height = run.height, error = %err, "report run failed");
                    if let Err(mark_err) = self.store.run_error(run) {
                        warn!(
                            height = run.height,
                            error = %mark_err,
                            "marking report run as error failed"
                        );
                    }
                    return Err(err);
                }
            }
        }
        Ok(summary)
    }

    fn process_run<P: RunProgressObserver + ?Sized>(
        &mut self,
        accounts: &[Account],
        run: &Run,
        progress: &mut P,
    ) -> Result<usize, ReportError> {
        let eligible = select_accounts(accounts, Some(run), &self.store)?;
        let total = eligible.len();
        for (index, account) in eligible.iter().enumerate() {
            info!(
                address = %account.address,
                index = index + 1,
                total,
                "reporting account"
            );
            let prev_run = self.store.get_previous_run(run)?;
            let income = self
                .calculator
                .generate(&account.address, run, prev_run.as_ref())?;
            self.store.insert_report(&account.address, run, &income)?;
            progress.on_account_reported(run, &account.address, index + 1, total);
        }
        Ok(total)
    }
}
