use std::env;
use std::process;

use income_reporter::config::ConfigSource;
use income_reporter::{
    IncomeCalculator, JsonFileReportStore, LcdChainClient, ReportError, ReporterConfig,
    RunOrchestrator,
};
use tracing_subscriber::EnvFilter;

#[path = "income_reporter/cli.rs"]
mod cli;

use cli::{parse_options, print_help, CliOptions, Command};

fn main() {
    init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_options(args.iter().map(|arg| arg.as_str())) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{}", err);
            print_help();
            process::exit(2);
        }
    };
    if let Err(err) = run(options) {
        eprintln!("income_reporter failed: {}", err);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(options: CliOptions) -> Result<(), ReportError> {
    if options.command == Command::Help {
        print_help();
        return Ok(());
    }
    let source = match options.config_path.as_deref() {
        Some(path) => ConfigSource::from_config_file(path)?,
        None => ConfigSource::from_default_sources()?,
    };
    let state_path = options
        .state_path
        .clone()
        .unwrap_or_else(|| source.state_path());

    match options.command {
        Command::Help => Ok(()),
        Command::AddAccount {
            address,
            first_seen_height,
        } => {
            let mut store = JsonFileReportStore::open(&state_path)?;
            store.add_account(address.as_str(), first_seen_height)?;
            println!("tracking {} from height {}", address, first_seen_height);
            Ok(())
        }
        Command::ScheduleRun {
            height,
            timestamp_ms,
        } => {
            let mut store = JsonFileReportStore::open(&state_path)?;
            let run = store.schedule_run(height, timestamp_ms)?;
            println!("scheduled run at height {} ({})", run.height, run.status);
            Ok(())
        }
        Command::Report => {
            let config = ReporterConfig::from_source(&source)?;
            let store = JsonFileReportStore::open(&state_path)?;
            let accounts = store.ledger().accounts().to_vec();
            let runs = store.ledger().unfinished_runs();
            let client = LcdChainClient::from_config(&config)?;
            let calculator = IncomeCalculator::new(client, config.income.clone());
            let mut orchestrator = RunOrchestrator::new(calculator, store);
            let summary = orchestrator.process(&accounts, &runs)?;
            if summary.runs.is_empty() {
                println!("no unfinished runs");
            }
            for outcome in &summary.runs {
                println!(
                    "run at height {} ok: {} account(s) reported",
                    outcome.height, outcome.reported_accounts
                );
            }
            Ok(())
        }
        Command::ListReports { address } => {
            let store = JsonFileReportStore::open(&state_path)?;
            for report in store
                .ledger()
                .reports()
                .iter()
                .filter(|report| address.as_deref().map_or(true, |addr| report.address == addr))
            {
                let line = serde_json::to_string(report).map_err(|err| ReportError::Query {
                    operation: "list_reports".to_string(),
                    reason: err.to_string(),
                })?;
                println!("{}", line);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("duration")
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}-{unique}"))
    }

    #[test]
    fn help_does_not_read_config() {
        let dir = temp_dir("income-reporter-help");
        fs::create_dir_all(&dir).expect("mkdir");
        let config_path = dir.join("broken.toml");
        fs::write(&config_path, "INCOME_REPORTER_LCD_URL = [unterminated").expect("write");

        let help = CliOptions {
            config_path: Some(config_path.clone()),
            state_path: None,
            command: Command::Help,
        };
        assert!(run(help).is_ok());

        let report = CliOptions {
            config_path: Some(config_path),
            state_path: None,
            command: Command::Report,
        };
        assert!(matches!(run(report), Err(ReportError::InvalidConfig { .. })));
        let _ = fs::remove_dir_all(&dir);
    }
}
