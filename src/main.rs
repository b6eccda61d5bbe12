//! backvault - multi-job parallel backup scheduler.
//!
//! Subcommands: `run <selectors...>` executes jobs from the job store;
//! `add`/`remove`/`list` manage the job store.

use backvault::cli::parse_job_selectors;
use backvault::config::{BackupConfig, ConfigStore};
use backvault::control::JobControlCoordinator;
use backvault::encryption::{EncryptionHook, NoopEncryptionHook, ProcessEncryptionHook};
use backvault::gate::BusinessProcessGate;
use backvault::job::{BackupJob, BackupKind};
use backvault::log_manager::LogManager;
use backvault::logging::init_logging;
use backvault::persistence::{FileJobStore, FileStateRepository, JobStore};
use backvault::process_detector::SysinfoProcessDetector;
use backvault::scheduler::Scheduler;
use backvault::state::JobStateTracker;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const JOB_STORE_FILE: &str = "backvault-jobs.toml";
const STATE_FILE: &str = "backvault-state.json";

fn cli() -> Command {
    Command::new("backvault")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multi-job parallel backup scheduler")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug-level logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Run one or more jobs by 1-based index")
                .arg(
                    Arg::new("selectors")
                        .help("Job selectors: ranges (1-3), unions (1;3;5), or both")
                        .num_args(1..)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("add")
                .about("Add or replace a named job in the job store")
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("source").required(true))
                .arg(Arg::new("target").required(true))
                .arg(
                    Arg::new("differential")
                        .long("differential")
                        .help("Use the differential strategy instead of full")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("remove").about("Remove a named job").arg(Arg::new("name").required(true)))
        .subcommand(Command::new("list").about("List jobs in the job store"))
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let config = BackupConfig::load_with_fallback();
    let job_store = FileJobStore::new(PathBuf::from(JOB_STORE_FILE));

    let result = match matches.subcommand() {
        Some(("run", sub_matches)) => run_jobs(&config, &job_store, sub_matches),
        Some(("add", sub_matches)) => add_job(&job_store, sub_matches),
        Some(("remove", sub_matches)) => remove_job(&job_store, sub_matches),
        Some(("list", _)) => list_jobs(&job_store),
        _ => unreachable!("subcommand_required enforces one of the above"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("backvault: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_jobs(config: &BackupConfig, job_store: &FileJobStore, sub_matches: &clap::ArgMatches) -> anyhow::Result<()> {
    let catalog: Vec<BackupJob> = job_store.list()?;
    let selector_args: Vec<String> = sub_matches
        .get_many::<String>("selectors")
        .expect("required")
        .cloned()
        .collect();
    let job_ids = parse_job_selectors(&selector_args, catalog.len());

    if job_ids.is_empty() {
        println!("No valid job selectors matched; nothing to run.");
        return Ok(());
    }

    let encryption: Arc<dyn EncryptionHook> = match &config.encryption_tool_path {
        Some(path) => Arc::new(ProcessEncryptionHook::new(path.clone())),
        None => Arc::new(NoopEncryptionHook),
    };

    let scheduler = Scheduler::new(
        Arc::new(ConfigStore::new(config.clone())),
        Arc::new(JobControlCoordinator::new()),
        Arc::new(JobStateTracker::new(Arc::new(FileStateRepository::new(PathBuf::from(STATE_FILE))))),
        Arc::new(LogManager::new(
            config.log_target,
            config.log_format,
            config.log_directory.clone(),
            config.server_url.clone(),
        )),
        encryption,
        Arc::new(BusinessProcessGate::new(Box::new(SysinfoProcessDetector::new(
            config.watched_process_names.clone(),
        )))),
    );

    match scheduler.execute(&job_ids, &catalog) {
        None => {
            println!("All jobs completed.");
            Ok(())
        }
        Some(errors) => {
            println!("Run completed with errors: {errors}");
            Ok(())
        }
    }
}

fn add_job(job_store: &FileJobStore, sub_matches: &clap::ArgMatches) -> anyhow::Result<()> {
    let name = sub_matches.get_one::<String>("name").expect("required").clone();
    let source = PathBuf::from(sub_matches.get_one::<String>("source").expect("required"));
    let target = PathBuf::from(sub_matches.get_one::<String>("target").expect("required"));
    let kind = if sub_matches.get_flag("differential") {
        BackupKind::Differential
    } else {
        BackupKind::Full
    };

    job_store.add(BackupJob::new(name.clone(), source, target, kind))?;
    println!("Added job '{name}'.");
    Ok(())
}

fn remove_job(job_store: &FileJobStore, sub_matches: &clap::ArgMatches) -> anyhow::Result<()> {
    let name = sub_matches.get_one::<String>("name").expect("required");
    job_store.remove(name)?;
    println!("Removed job '{name}'.");
    Ok(())
}

fn list_jobs(job_store: &FileJobStore) -> anyhow::Result<()> {
    let jobs = job_store.list()?;
    if jobs.is_empty() {
        println!("No jobs configured.");
        return Ok(());
    }
    for (index, job) in jobs.iter().enumerate() {
        println!(
            "{}. {} [{}] {} -> {}",
            index + 1,
            job.name,
            job.kind,
            job.source.display(),
            job.target.display()
        );
    }
    Ok(())
}
