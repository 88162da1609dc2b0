use income_proto::{Account, Run};

use crate::store::ReportStore;
use crate::ReportError;

/// Accounts that still need a report for `run`, in input order.
///
/// An account qualifies when it existed at the run height and has no report
/// at or above that height. Without a run every account qualifies.
pub fn select_accounts<S>(
    accounts: &[Account],
    run: Option<&Run>,
    store: &S,
) -> Result<Vec<Account>, ReportError>
where
    S: ReportStore + ?Sized,
{
    let Some(run) = run else {
        return Ok(accounts.to_vec());
    };

    let mut selected = Vec::new();
    for account in accounts {
        if !account.existed_at(run.height) {
            continue;
        }
        let latest = store.get_latest_report_height_for(&account.address)?;
        if latest.map_or(true, |height| height < run.height) {
            selected.push(account.clone());
        }
    }
    Ok(selected)
}
