use std::process;

use anyhow::{Context, Result};
use log::{error, info};

use asyncnotify::demo::{self, DemoSummary};
use asyncnotify::{cli, logging, notifications};

fn main() {
    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::parse_args();
    cli::validate_args(&args)?;

    let config_manager = cli::load_configuration(&args)?;
    let log_config = cli::configure_logging(&args, &config_manager)?;
    logging::init_logger(log_config)?;

    let dispatch_config = config_manager
        .get_dispatch_config()
        .context("Invalid [dispatch] configuration")?;
    notifications::configure(dispatch_config);

    let demo_config = cli::demo_config(&args, &config_manager)?;
    let summary = demo::run_demo(&demo_config)?;
    print_summary(&summary);

    if !summary.in_order || !summary.on_dispatch_thread {
        anyhow::bail!("Notifications were delivered out of order or on the wrong thread");
    }
    Ok(())
}

fn print_summary(summary: &DemoSummary) {
    info!("Demo finished: {} events delivered", summary.delivered);
    println!("Producers:          {}", summary.received.len());
    for (index, received) in summary.received.iter().enumerate() {
        println!("  producer-{:<3}      {} ticks", index, received);
    }
    println!("Ticks received:     {}", summary.total_received());
    println!("Events delivered:   {}", summary.delivered);
    println!("Events cleaned up:  {}", summary.cleaned);
    println!("Per-producer order: {}", if summary.in_order { "preserved" } else { "VIOLATED" });
    println!(
        "Delivery thread:    {}",
        if summary.on_dispatch_thread { "dispatch thread only" } else { "VIOLATED" }
    );
}
