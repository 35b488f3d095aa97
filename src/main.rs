use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use streamsheet::config::MachineConfig;
use streamsheet::machine::{MachineEvent, MachineRunner, MachineSnapshot, RunState};
use streamsheet::message::Message;

mod cli;

use cli::Cli;
use cli::commands::{Commands, PutArg};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamsheet")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("streamsheet.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &MachineConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None | Some(Commands::Check) => handle_check_command(config),
        Some(Commands::Run { ticks, puts, json }) => handle_run_command(config, *ticks, puts, *json),
        Some(Commands::Watch { seconds }) => handle_watch_command(config, *seconds),
        Some(Commands::Triggers) => handle_triggers_command(config),
    }
}

fn handle_check_command(config: &MachineConfig) -> Result<()> {
    info!("Checking machine config: {}", config.name);
    config.validate().context("Invalid machine config")?;
    println!(
        "{} machine '{}' with {} streamsheet(s), cycletime {}ms",
        "OK:".green(),
        config.name,
        config.sheets.len(),
        config.settings.cycletime_ms
    );
    Ok(())
}

fn handle_triggers_command(config: &MachineConfig) -> Result<()> {
    info!("Listing triggers for machine: {}", config.name);
    if config.sheets.is_empty() {
        println!("{}", "No streamsheets configured".yellow());
    }
    for sheet in &config.sheets {
        let json = serde_json::to_string(&sheet.trigger).context("Failed to serialize trigger")?;
        println!("{} {}", format!("{}:", sheet.name).cyan(), json);
    }
    Ok(())
}

fn handle_run_command(config: &MachineConfig, ticks: u32, puts: &[PutArg], json: bool) -> Result<()> {
    info!("Running machine {} for {} step(s)", config.name, ticks);
    let mut machine = config.build().context("Failed to build machine")?;
    machine.start().context("Failed to start machine")?;

    for put in puts {
        machine
            .put_message(&put.sheet, Message::new(put.data.clone()))
            .with_context(|| format!("Failed to put message into {}", put.sheet))?;
    }
    for _ in 0..ticks {
        machine.step().context("Step failed")?;
    }

    let snapshot = machine.snapshot();
    machine.stop().context("Failed to stop machine")?;

    if json {
        let out = serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;
        println!("{}", out);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn handle_watch_command(config: &MachineConfig, seconds: u64) -> Result<()> {
    info!("Watching machine {} for {}s", config.name, seconds);
    let runtime = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
    runtime.block_on(watch(config, seconds))
}

async fn watch(config: &MachineConfig, seconds: u64) -> Result<()> {
    let mut machine = config.build().context("Failed to build machine")?;
    let mut events = machine.subscribe();
    let (runner, handle) = MachineRunner::new(machine);
    let task = tokio::spawn(runner.run());

    println!(
        "{} {} for {}s (ctrl-c to stop early)",
        "Watching".cyan(),
        config.name,
        seconds
    );
    handle.start().await?;

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Interrupted".yellow());
                break;
            }
            event = events.recv() => match event {
                Some(MachineEvent::StepPassed { steps }) if steps % 20 == 0 => {
                    let snapshot = handle.snapshot().await?;
                    print_snapshot(&snapshot);
                }
                Some(event) => log::debug!("Machine event: {:?}", event),
                None => break,
            }
        }
    }

    let snapshot = handle.snapshot().await?;
    handle.stop().await?;
    handle.shutdown().await?;
    task.await.context("Runner task panicked")??;

    print_snapshot(&snapshot);
    Ok(())
}

fn print_snapshot(snapshot: &MachineSnapshot) {
    let state = match snapshot.state {
        RunState::Running => "running".green(),
        RunState::Paused => "paused".yellow(),
        RunState::Stopped => "stopped".red(),
    };
    println!(
        "{} {} [{}] steps={} requests={} executes={}",
        "Machine".bold(),
        snapshot.name,
        state,
        snapshot.steps,
        snapshot.pending_requests,
        snapshot.active_executes
    );
    for sheet in &snapshot.sheets {
        println!(
            "  {} {:?}/{:?} inbox={} steps={} repeats={} suspension={}",
            sheet.name.cyan(),
            sheet.trigger.kind,
            sheet.state,
            sheet.inbox,
            sheet.stats.steps,
            sheet.stats.repeatsteps,
            sheet.suspension
        );
        for cell in &sheet.cells {
            println!("    {} = {}", cell.name, cell.display);
        }
    }
}

fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = MachineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
