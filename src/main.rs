//! memreclaim - reclaim Windows standby, modified and working-set memory

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use memreclaim::{
    format_bytes, platform, MemoryArea, MemoryAreaSet, MemoryOptimizer, MemorySnapshot,
    OptimizerConfig, ProcessExclusionList,
};

#[derive(Parser)]
#[command(name = "memreclaim")]
#[command(about = "Reclaim standby, modified and working-set memory", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current memory status
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Show which memory areas this OS supports
    Capabilities,

    /// Run one optimization
    Optimize {
        /// Comma separated areas: combined, modified, processes, standby, standby-low, system
        #[arg(short, long, value_parser = MemoryAreaSet::parse_list)]
        areas: Option<MemoryAreaSet>,

        /// Additional process names to leave untouched
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,
    },

    /// Show configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(OptimizerConfig::default_path);

    match cli.command {
        Commands::Status { json } => {
            let optimizer = MemoryOptimizer::native();
            let snapshot = optimizer.read_memory();
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot);
            }
        }

        Commands::Capabilities => {
            let optimizer = MemoryOptimizer::native();
            let caps = optimizer.capabilities();
            println!("Platform:  {}", platform::platform_name());
            println!("64-bit:    {}", caps.is_64bit);
            println!("Vista+:    {}", caps.is_vista_or_above);
            println!("Windows 8+: {}", caps.is_windows8_or_above);
            println!("Areas:");
            for area in MemoryArea::ALL {
                let mark = if caps.supports(area) { "yes" } else { "no" };
                println!("  {:<30} {}", area.to_string(), mark);
            }
        }

        Commands::Optimize { areas, exclude } => {
            let config = OptimizerConfig::load_or_default(&config_path)?;
            let areas = areas.unwrap_or(config.memory_areas);
            let exclusions = ProcessExclusionList::new(
                config.process_exclusion_list.iter().chain(exclude.iter()),
            );

            let optimizer = MemoryOptimizer::native();
            info!("Optimizing {:?} ({} processes excluded)", areas, exclusions.len());
            let report = optimizer.optimize(areas, &exclusions).await?;

            println!("Optimization complete:");
            for outcome in &report.outcomes {
                match outcome.error_message() {
                    None => println!("  {:<30} ok", outcome.area.to_string()),
                    Some(msg) => println!("  {:<30} FAILED: {}", outcome.area.to_string(), msg),
                }
            }
            println!("  Freed:     {}", format_bytes(report.freed_bytes()));
            println!("  Duration:  {} ms", report.duration.as_millis());
            print_snapshot(&report.after);
        }

        Commands::Config { init } => {
            if init {
                OptimizerConfig::default().save(&config_path)?;
                println!("Wrote {}", config_path.display());
            }
            let config = OptimizerConfig::load_or_default(&config_path)?;
            println!("# {}", config_path.display());
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &MemorySnapshot) {
    println!("Memory Status:");
    println!("  Total:     {}", format_bytes(snapshot.total_physical));
    println!("  Available: {}", format_bytes(snapshot.available_physical));
    println!("  Used:      {}", format_bytes(snapshot.used_physical()));
    println!("  Free:      {:.1}%", snapshot.free_percentage);
    println!(
        "  Page file: {} of {} used",
        format_bytes(snapshot.used_page_file()),
        format_bytes(snapshot.total_page_file)
    );
}
