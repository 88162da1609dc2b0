use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Command {
    Help,
    AddAccount {
        address: String,
        first_seen_height: u64,
    },
    ScheduleRun {
        height: u64,
        timestamp_ms: i64,
    },
    Report,
    ListReports {
        address: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct CliOptions {
    pub config_path: Option<PathBuf>,
    pub state_path: Option<PathBuf>,
    pub command: Command,
}

pub(super) fn parse_options<'a>(args: impl Iterator<Item = &'a str>) -> Result<CliOptions, String> {
    let mut config_path = None;
    let mut state_path = None;
    let mut command_name: Option<&str> = None;
    let mut address: Option<String> = None;
    let mut first_seen_height: Option<u64> = None;
    let mut height: Option<u64> = None;
    let mut timestamp_ms: Option<i64> = None;
    let mut iter = args.peekable();

    while let Some(arg) = iter.next() {
        match arg {
            "--help" | "-h" => {
                return Ok(CliOptions {
                    config_path,
                    state_path,
                    command: Command::Help,
                });
            }
            "--config" => {
                config_path = Some(PathBuf::from(
                    iter.next()
                        .ok_or_else(|| "--config requires a path".to_string())?,
                ));
            }
            "--state" => {
                state_path = Some(PathBuf::from(
                    iter.next()
                        .ok_or_else(|| "--state requires a path".to_string())?,
                ));
            }
            "--address" => {
                let raw = iter
                    .next()
                    .filter(|value| !value.trim().is_empty())
                    .ok_or_else(|| "--address requires an account address".to_string())?;
                address = Some(raw.to_string());
            }
            "--first-seen-height" => {
                let raw = iter
                    .next()
                    .ok_or_else(|| "--first-seen-height requires a height".to_string())?;
                first_seen_height = Some(
                    raw.parse::<u64>()
                        .map_err(|_| format!("invalid --first-seen-height: {}", raw))?,
                );
            }
            "--height" => {
                let raw = iter
                    .next()
                    .ok_or_else(|| "--height requires a positive height".to_string())?;
                height = Some(
                    raw.parse::<u64>()
                        .ok()
                        .filter(|value| *value > 0)
                        .ok_or_else(|| "--height requires a positive height".to_string())?,
                );
            }
            "--timestamp-ms" => {
                let raw = iter
                    .next()
                    .ok_or_else(|| "--timestamp-ms requires unix milliseconds".to_string())?;
                timestamp_ms = Some(
                    raw.parse::<i64>()
                        .map_err(|_| format!("invalid --timestamp-ms: {}", raw))?,
                );
            }
            _ if arg.starts_with('-') => return Err(format!("unknown option: {}", arg)),
            _ => {
                if let Some(previous) = command_name {
                    return Err(format!(
                        "unexpected argument {} after command {}",
                        arg, previous
                    ));
                }
                command_name = Some(arg);
            }
        }
    }

    let command = match command_name {
        None => return Err("missing command".to_string()),
        Some("add-account") => Command::AddAccount {
            address: address.ok_or_else(|| "add-account requires --address".to_string())?,
            first_seen_height: first_seen_height
                .ok_or_else(|| "add-account requires --first-seen-height".to_string())?,
        },
        Some("schedule-run") => Command::ScheduleRun {
            height: height.ok_or_else(|| "schedule-run requires --height".to_string())?,
            timestamp_ms: timestamp_ms
                .ok_or_else(|| "schedule-run requires --timestamp-ms".to_string())?,
        },
        Some("report") => Command::Report,
        Some("list-reports") => Command::ListReports { address },
        Some(other) => return Err(format!("unknown command: {}", other)),
    };

    Ok(CliOptions {
        config_path,
        state_path,
        command,
    })
}

pub(super) fn print_help() {
    println!(
        "Usage: income_reporter [--config <path>] [--state <path>] <command> [options]\n\n\
Commands:\n\
  add-account --address <addr> --first-seen-height <h>   Track an account\n\
  schedule-run --height <h> --timestamp-ms <ms>          Add a pending run\n\
  report                                                 Report every unfinished run\n\
  list-reports [--address <addr>]                        Print reports as JSON lines\n\n\
Options:\n\
  --config <path>   TOML config (default: income_reporter.toml if present, else env)\n\
  --state <path>    Report ledger JSON file (overrides INCOME_REPORTER_STATE_PATH)\n\
  -h, --help        Show this help"
    );
}
