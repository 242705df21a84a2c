use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ectrans_core::{bootstrap_epoch, reconcile_artifacts, run_transition, write_report_json};
use ectrans_error::TransitionError;
use ectrans_solver::{ExternalSolver, SequentialSolver, TransitionSolver};
use ectrans_types::TransitionConfig;
use serde::Serialize;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    GenPre,
    Transition,
    Reconcile,
}

#[derive(Debug, PartialEq, Eq)]
struct CliConfig {
    command: Command,
    config: PathBuf,
    report: Option<PathBuf>,
    solver: Option<PathBuf>,
    sequential: bool,
    workers: Option<usize>,
    seed: Option<u64>,
    round_up_stripes: bool,
    verbose: bool,
}

#[derive(Debug)]
enum CliError {
    Help,
    Usage(String),
    Run(TransitionError),
}

impl From<TransitionError> for CliError {
    fn from(err: TransitionError) -> Self {
        Self::Run(err)
    }
}

fn print_help() {
    let help = "\
ectrans: erasure-coding redundancy transition metadata

USAGE:
    ectrans <COMMAND> --config <PATH> [OPTIONS]

COMMANDS:
    gen-pre       Generate a random pre-transition placement and block mapping
    transition    Run the solver and reconcile the post-transition block mapping
    reconcile     Reconcile solver artifacts already present on disk

OPTIONS:
    --config <PATH>        TOML run configuration (required)
    --report <PATH>        Write the JSON report to a file (stdout when omitted)
    --solver <PATH>        External solver executable, overriding [solver].program
    --sequential           Use the in-process solver even if one is configured
    --workers <N>          Reconciler threads, 0 = available parallelism
    --seed <u64>           Seed for gen-pre, overriding [solver].seed
    --round-up-stripes     Round num_stripes up to a multiple of k_post / k_pre
    -v, --verbose          Log at DEBUG instead of INFO
    -h, --help             Show this help
";
    println!("{help}");
}

fn value<'a>(args: &'a [String], index: usize, flag: &str) -> Result<&'a str, CliError> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| CliError::Usage(format!("{flag} requires a value")))
}

fn parse_args(args: &[String]) -> Result<CliConfig, CliError> {
    let command = match args.first().map(String::as_str) {
        Some("gen-pre") => Command::GenPre,
        Some("transition") => Command::Transition,
        Some("reconcile") => Command::Reconcile,
        Some("-h" | "--help") => return Err(CliError::Help),
        Some(other) => return Err(CliError::Usage(format!("unknown command: {other}"))),
        None => return Err(CliError::Usage("missing command".to_owned())),
    };

    let mut config = None;
    let mut cli = CliConfig {
        command,
        config: PathBuf::new(),
        report: None,
        solver: None,
        sequential: false,
        workers: None,
        seed: None,
        round_up_stripes: false,
        verbose: false,
    };

    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--config" => {
                index += 1;
                config = Some(PathBuf::from(value(args, index, "--config")?));
            }
            "--report" => {
                index += 1;
                cli.report = Some(PathBuf::from(value(args, index, "--report")?));
            }
            "--solver" => {
                index += 1;
                cli.solver = Some(PathBuf::from(value(args, index, "--solver")?));
            }
            "--workers" => {
                index += 1;
                let raw = value(args, index, "--workers")?;
                cli.workers = Some(raw.parse().map_err(|_| {
                    CliError::Usage(format!("invalid --workers value: {raw}"))
                })?);
            }
            "--seed" => {
                index += 1;
                let raw = value(args, index, "--seed")?;
                cli.seed = Some(
                    raw.parse()
                        .map_err(|_| CliError::Usage(format!("invalid --seed value: {raw}")))?,
                );
            }
            "--sequential" => cli.sequential = true,
            "--round-up-stripes" => cli.round_up_stripes = true,
            "-v" | "--verbose" => cli.verbose = true,
            "-h" | "--help" => return Err(CliError::Help),
            unknown => return Err(CliError::Usage(format!("unknown option: {unknown}"))),
        }
        index += 1;
    }

    cli.config = config.ok_or_else(|| CliError::Usage("--config is required".to_owned()))?;
    if cli.sequential && cli.solver.is_some() {
        return Err(CliError::Usage(
            "--sequential and --solver are mutually exclusive".to_owned(),
        ));
    }
    Ok(cli)
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn load_config(cli: &CliConfig) -> Result<TransitionConfig, TransitionError> {
    let mut config = TransitionConfig::load(&cli.config)?;
    if let Some(workers) = cli.workers {
        config.solver.workers = workers;
    }
    if let Some(seed) = cli.seed {
        config.solver.seed = seed;
    }
    if let Some(program) = &cli.solver {
        config.solver.program = Some(program.clone());
    }
    if cli.sequential {
        config.solver.program = None;
    }
    if cli.round_up_stripes {
        let lambda = config.code().lambda()?;
        let rounded = config.settings().round_up_stripes(lambda);
        if rounded.num_stripes != config.common.num_stripes {
            debug!(
                from = config.common.num_stripes,
                to = rounded.num_stripes,
                lambda,
                "rounded num_stripes up"
            );
        }
        config.common.num_stripes = rounded.num_stripes;
    }
    Ok(config)
}

fn solver_for(config: &TransitionConfig) -> Box<dyn TransitionSolver> {
    match &config.solver.program {
        Some(program) => {
            let mut solver = ExternalSolver::new(program);
            if let Some(dir) = &config.solver.working_dir {
                solver = solver.with_working_dir(dir);
            }
            Box::new(solver)
        }
        None => Box::new(SequentialSolver::new()),
    }
}

fn emit<T: Serialize>(value: &T) -> Result<(), TransitionError> {
    let payload = serde_json::to_string_pretty(value)
        .map_err(|err| TransitionError::internal(format!("report serialization failed: {err}")))?;
    println!("{payload}");
    Ok(())
}

fn run(args: &[String]) -> Result<(), CliError> {
    let cli = parse_args(args)?;
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Command::GenPre => emit(&bootstrap_epoch(&config)?)?,
        Command::Transition | Command::Reconcile => {
            let report = if cli.command == Command::Transition {
                run_transition(&config, solver_for(&config).as_ref())?
            } else {
                reconcile_artifacts(&config)?
            };
            match &cli.report {
                Some(path) => write_report_json(path, &report)?,
                None => emit(&report)?,
            }
        }
    }
    Ok(())
}

fn report_failure(err: &TransitionError, config: Option<&Path>) {
    error!(code = err.error_code(), error = %err, "run failed");
    eprintln!("error[{}]: {err}", err.error_code());
    if let Some(hint) = err.suggestion() {
        eprintln!("hint: {hint}");
    }
    if let Some(config) = config {
        eprintln!("config: {}", config.display());
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Help) => {
            print_help();
            ExitCode::SUCCESS
        }
        Err(CliError::Usage(message)) => {
            eprintln!("error: {message}");
            eprintln!("run `ectrans --help` for usage");
            ExitCode::from(64)
        }
        Err(CliError::Run(err)) => {
            let config = args
                .iter()
                .position(|arg| arg == "--config")
                .and_then(|index| args.get(index + 1))
                .map(Path::new);
            report_failure(&err, config);
            ExitCode::from(err.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| (*arg).to_owned()).collect()
    }

    #[test]
    fn parses_transition_with_overrides() {
        let cli = parse_args(&args(&[
            "transition",
            "--config",
            "run.toml",
            "--workers",
            "3",
            "--report",
            "out.json",
            "-v",
        ]))
        .expect("valid");
        assert_eq!(cli.command, Command::Transition);
        assert_eq!(cli.config, PathBuf::from("run.toml"));
        assert_eq!(cli.workers, Some(3));
        assert_eq!(cli.report, Some(PathBuf::from("out.json")));
        assert!(cli.verbose);
    }

    #[test]
    fn config_flag_is_required() {
        assert!(matches!(
            parse_args(&args(&["reconcile"])),
            Err(CliError::Usage(message)) if message.contains("--config")
        ));
    }

    #[test]
    fn rejects_unknown_command_and_option() {
        assert!(matches!(
            parse_args(&args(&["merge", "--config", "x"])),
            Err(CliError::Usage(_))
        ));
        assert!(matches!(
            parse_args(&args(&["gen-pre", "--config", "x", "--fast"])),
            Err(CliError::Usage(_))
        ));
    }

    #[test]
    fn sequential_conflicts_with_solver() {
        assert!(matches!(
            parse_args(&args(&[
                "transition",
                "--config",
                "x",
                "--sequential",
                "--solver",
                "/bin/solver"
            ])),
            Err(CliError::Usage(_))
        ));
    }

    #[test]
    fn round_up_applies_to_loaded_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            "[common]\nk_pre = 2\nm_pre = 1\nk_post = 6\nm_post = 1\nnum_nodes = 8\nnum_stripes = 1000\napproach = \"BT\"\n",
        )
        .expect("write config");
        let mut cli = parse_args(&args(&["gen-pre", "--config", "x", "--round-up-stripes"]))
            .expect("valid");
        cli.config = path;
        let config = load_config(&cli).expect("load");
        assert_eq!(config.common.num_stripes, 1002);
        assert_eq!(config.validate().expect("valid"), 3);
    }
}
