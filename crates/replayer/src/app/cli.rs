use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CliOptions {
    pub(crate) log_path: PathBuf,
    pub(crate) templates_path: Option<PathBuf>,
    pub(crate) out_path: Option<PathBuf>,
    pub(crate) config_path: Option<PathBuf>,
    pub(crate) capture_dir: Option<PathBuf>,
    pub(crate) final_states: bool,
    pub(crate) with_actions: bool,
    pub(crate) capture: bool,
    pub(crate) wait_at_rest_ms: Option<u64>,
    pub(crate) fixed_delay_ms: Option<u64>,
    pub(crate) acceleration: Option<f32>,
    pub(crate) pause_every: Option<u64>,
    pub(crate) skip_actions: Vec<String>,
    pub(crate) tick_ms: Option<u64>,
    pub(crate) realtime: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CliCommand {
    Help,
    Replay(CliOptions),
}

pub(crate) fn parse_args(args: &[String]) -> Result<CliCommand, String> {
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        return Ok(CliCommand::Help);
    }

    let mut options = CliOptions::default();
    let mut log_path: Option<PathBuf> = None;
    let mut index = 0usize;
    while index < args.len() {
        let arg = args[index].as_str();
        match arg {
            "--templates" => {
                options.templates_path = Some(PathBuf::from(value_for(args, index)?));
                index += 2;
            }
            "--out" => {
                options.out_path = Some(PathBuf::from(value_for(args, index)?));
                index += 2;
            }
            "--config" => {
                options.config_path = Some(PathBuf::from(value_for(args, index)?));
                index += 2;
            }
            "--capture-dir" => {
                options.capture_dir = Some(PathBuf::from(value_for(args, index)?));
                options.capture = true;
                index += 2;
            }
            "--wait-at-rest" => {
                options.wait_at_rest_ms = Some(parse_u64(args, index)?);
                index += 2;
            }
            "--fixed-delay" => {
                options.fixed_delay_ms = Some(parse_u64(args, index)?);
                index += 2;
            }
            "--acceleration" => {
                let value = value_for(args, index)?;
                let parsed = value
                    .parse::<f32>()
                    .ok()
                    .filter(|parsed| parsed.is_finite() && *parsed > 0.0)
                    .ok_or_else(|| {
                        format!("invalid --acceleration value '{value}' (expected positive number)")
                    })?;
                options.acceleration = Some(parsed);
                index += 2;
            }
            "--pause-every" => {
                options.pause_every = Some(parse_u64(args, index)?);
                index += 2;
            }
            "--skip" => {
                options.skip_actions.push(value_for(args, index)?.to_string());
                index += 2;
            }
            "--tick-ms" => {
                let ticks = parse_u64(args, index)?;
                if ticks == 0 {
                    return Err("--tick-ms must be greater than zero".to_string());
                }
                options.tick_ms = Some(ticks);
                index += 2;
            }
            "--final-states" => {
                options.final_states = true;
                index += 1;
            }
            "--with-actions" => {
                options.with_actions = true;
                index += 1;
            }
            "--capture" => {
                options.capture = true;
                index += 1;
            }
            "--realtime" => {
                options.realtime = true;
                index += 1;
            }
            flag if flag.starts_with("--") => {
                return Err(format!("unknown option '{flag}'"));
            }
            path => {
                if let Some(existing) = &log_path {
                    return Err(format!(
                        "unexpected argument '{path}' (log already set to '{}')",
                        existing.display()
                    ));
                }
                log_path = Some(PathBuf::from(path));
                index += 1;
            }
        }
    }

    if options.wait_at_rest_ms.is_some() && options.fixed_delay_ms.is_some() {
        return Err("--wait-at-rest and --fixed-delay are mutually exclusive".to_string());
    }
    options.log_path = log_path.ok_or_else(|| "missing log file argument".to_string())?;
    Ok(CliCommand::Replay(options))
}

fn value_for(args: &[String], index: usize) -> Result<&str, String> {
    args.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("missing value for {}", args[index]))
}

fn parse_u64(args: &[String], index: usize) -> Result<u64, String> {
    let value = value_for(args, index)?;
    value
        .parse::<u64>()
        .map_err(|_| format!("invalid {} value '{value}' (expected u64)", args[index]))
}

pub(crate) fn usage_text() -> String {
    [
        "replayer - rebuild and score recorded play sessions",
        "",
        "Usage:",
        "  replayer [options] <log.xml>",
        "",
        "Options:",
        "  --templates <file>     template catalogue XML (<Templates>)",
        "  --out <file>           score output (default: <log>.scores.csv)",
        "  --config <file>        JSON replay config (default: $REPLAYER_CONFIG)",
        "  --final-states         replay only the last record of each attempt",
        "  --with-actions         also place entities carried by action input",
        "  --wait-at-rest <ms>    settle when bodies stop, or after <ms>",
        "  --fixed-delay <ms>     settle after a fixed simulated delay",
        "  --acceleration <x>     simulated time multiplier while settling",
        "  --pause-every <n>      log a checkpoint every <n> steps",
        "  --skip <action>        skip records with this action (repeatable)",
        "  --capture              write a JSON capture per step",
        "  --capture-dir <dir>    capture directory (implies --capture)",
        "  --tick-ms <u64>        host frame length (default 16)",
        "  --realtime             pace frames against the wall clock",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    fn replay(raw: &[&str]) -> CliOptions {
        match parse_args(&args(raw)).expect("parse") {
            CliCommand::Replay(options) => options,
            CliCommand::Help => panic!("expected replay command"),
        }
    }

    #[test]
    fn empty_args_return_usage_error() {
        let err = parse_args(&[]).expect_err("usage");
        assert!(err.contains("Usage:"));
    }

    #[test]
    fn help_flag_is_recognized() {
        assert_eq!(parse_args(&args(&["--help"])), Ok(CliCommand::Help));
        assert_eq!(parse_args(&args(&["-h"])), Ok(CliCommand::Help));
    }

    #[test]
    fn parses_log_and_flags_in_any_order() {
        let options = replay(&[
            "--templates",
            "t.xml",
            "session.xml",
            "--final-states",
            "--skip",
            "Hover",
            "--skip",
            "Look",
            "--wait-at-rest",
            "5000",
            "--acceleration",
            "2.5",
        ]);
        assert_eq!(options.log_path, PathBuf::from("session.xml"));
        assert_eq!(options.templates_path, Some(PathBuf::from("t.xml")));
        assert!(options.final_states);
        assert_eq!(options.skip_actions, vec!["Hover".to_string(), "Look".to_string()]);
        assert_eq!(options.wait_at_rest_ms, Some(5000));
        assert_eq!(options.acceleration, Some(2.5));
        assert!(!options.capture);
    }

    #[test]
    fn capture_dir_implies_capture() {
        let options = replay(&["log.xml", "--capture-dir", "shots"]);
        assert!(options.capture);
        assert_eq!(options.capture_dir, Some(PathBuf::from("shots")));
    }

    #[test]
    fn rejects_bad_values_and_unknown_flags() {
        assert!(parse_args(&args(&["log.xml", "--tick-ms", "0"])).is_err());
        assert!(parse_args(&args(&["log.xml", "--tick-ms", "abc"])).is_err());
        assert!(parse_args(&args(&["log.xml", "--acceleration", "-1"])).is_err());
        assert!(parse_args(&args(&["log.xml", "--frobnicate"])).is_err());
        assert!(parse_args(&args(&["log.xml", "--out"])).is_err());
        assert!(parse_args(&args(&["a.xml", "b.xml"])).is_err());
        assert!(parse_args(&args(&["--final-states"])).is_err());
    }

    #[test]
    fn stopping_flags_are_exclusive() {
        let err = parse_args(&args(&["log.xml", "--wait-at-rest", "10", "--fixed-delay", "10"]))
            .expect_err("exclusive");
        assert!(err.contains("mutually exclusive"));
    }
}
