//! regflock CLI entry point

use anyhow::{Context, Result};
use regflock::config::{self, toml, validator, Config};
use regflock::output;
use regflock::pipeline;

fn main() -> Result<()> {
    use std::time::Instant;

    let main_start = Instant::now();

    println!("regflock v{}", env!("CARGO_PKG_VERSION"));
    println!("Cohort-coordinated image registration");
    println!();

    // Parse CLI arguments
    let parse_start = Instant::now();
    let cli = config::Cli::parse_args();
    cli.validate()?;
    if cli.debug {
        eprintln!(
            "DEBUG TIMING: CLI parse: {:.3}s",
            parse_start.elapsed().as_secs_f64()
        );
    }

    // Build configuration: TOML file first, CLI overrides on top
    let config_start = Instant::now();
    let base = match cli.config {
        Some(ref path) => toml::parse_toml_file(path)?,
        None => Config::default(),
    };
    let config = toml::merge_cli_with_config(&cli, base);
    if cli.debug {
        eprintln!(
            "DEBUG TIMING: Config build: {:.3}s",
            config_start.elapsed().as_secs_f64()
        );
    }

    // Validate configuration (cohort shape, timing bounds, input paths)
    validator::validate_config(&config).context("Configuration validation failed")?;

    print_configuration(&config);

    if cli.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    println!();
    println!("Starting registration run...");
    println!();

    let summary = pipeline::run(&config)?;

    output::print_summary(&summary);
    if let Some(ref path) = config.runtime.summary_json {
        output::write_summary_json(&summary, path)?;
        println!("Summary written to {}", path.display());
    }

    if config.runtime.debug {
        eprintln!(
            "DEBUG TIMING: Total: {:.3}s",
            main_start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}

/// Print configuration summary
fn print_configuration(config: &Config) {
    println!("Configuration:");
    println!("  Cohort:       {}", config.cohort);
    println!("  Timing:       {}", config.timing);
    println!("  Registration: {}", config.registration);
    println!("  Linear stage: {} thread(s), leader only", config.registration.linear_threads);
}
