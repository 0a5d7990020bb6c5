//! Cadence CLI
//!
//! Pre-compute motion CSS from a `cadence.toml` manifest and inspect spring curves.

use anyhow::{Context, Result};
use cadence_motion::{integrate, SpringChannelConfig, SpringConfig};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod compile;
mod config;

use compile::compile_manifest;
use config::Manifest;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cadence motion compiler", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a manifest into a stylesheet
    Build {
        /// Manifest file or directory containing cadence.toml
        #[arg(default_value = ".")]
        manifest: String,

        /// Output path (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Emit the full build report as JSON instead of CSS
        #[arg(long)]
        json: bool,
    },

    /// Validate a manifest without writing anything
    Check {
        /// Manifest file or directory containing cadence.toml
        #[arg(default_value = ".")]
        manifest: String,
    },

    /// Sample a spring curve
    Spring {
        #[arg(long, default_value_t = SpringConfig::default().stiffness)]
        stiffness: f64,

        #[arg(long, default_value_t = SpringConfig::default().damping)]
        damping: f64,

        #[arg(long, default_value_t = 1.0)]
        mass: f64,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        from: f64,

        #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
        to: f64,

        /// Duration in ms (estimated from the spring when omitted)
        #[arg(long)]
        duration: Option<f64>,

        #[arg(long, default_value_t = 30)]
        steps: usize,
    },

    /// Show version and defaults
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Build {
            manifest,
            output,
            json,
        } => cmd_build(&manifest, output.as_deref(), json),

        Commands::Check { manifest } => cmd_check(&manifest),

        Commands::Spring {
            stiffness,
            damping,
            mass,
            from,
            to,
            duration,
            steps,
        } => cmd_spring(SpringConfig::new(stiffness, damping, mass), from, to, duration, steps),

        Commands::Info => cmd_info(),
    }
}

fn cmd_build(manifest: &str, output: Option<&str>, json: bool) -> Result<()> {
    let path = PathBuf::from(manifest);
    let manifest = Manifest::load(&path)?;

    info!("Compiling {} entries from {}", manifest.entry_count(), path.display());
    let report = compile_manifest(&manifest)?;

    let contents = if json {
        serde_json::to_string_pretty(&report)?
    } else {
        report.stylesheet()
    };

    match output {
        Some(out) => {
            fs::write(out, &contents).with_context(|| format!("Failed to write {}", out))?;
            info!("Wrote {}", out);
        }
        None => print!("{}", contents),
    }

    Ok(())
}

fn cmd_check(manifest: &str) -> Result<()> {
    let path = PathBuf::from(manifest);
    let manifest = Manifest::load(&path)?;
    let report = compile_manifest(&manifest)?;

    for sequence in &report.sequences {
        if sequence.output.overlapping {
            warn!(
                "Sequence '{}' has overlapping stages; per-stage easing is replaced by one linear rule",
                sequence.name
            );
        }
    }
    for spring in report.springs.iter().filter(|s| s.degraded) {
        warn!("Spring '{}' has non-numeric endpoints; using eased keyframes", spring.class_name);
    }

    info!(
        "{} sequences, {} springs, {} flips OK ({} need runtime coordination)",
        report.sequences.len(),
        report.springs.len(),
        report.flips.len(),
        report.runtime_descriptors().len()
    );
    Ok(())
}

fn cmd_spring(
    spring: SpringConfig,
    from: f64,
    to: f64,
    duration: Option<f64>,
    steps: usize,
) -> Result<()> {
    spring.validate()?;
    let duration = duration.unwrap_or_else(|| spring.settle_duration_ms((to - from).abs()));
    let trajectory = integrate(&SpringChannelConfig::new(spring, from, to), duration, steps)?;

    println!(
        "stiffness={} damping={} mass={} (damping ratio {:.3})",
        spring.stiffness,
        spring.damping,
        spring.mass,
        spring.damping_ratio()
    );
    println!("duration={:.1}ms steps={}", duration, steps);
    if let Some(index) = trajectory.settled_at() {
        println!("settled at sample {}", index);
    }
    println!();
    println!("{:>6} {:>10} {:>12}", "step", "t (ms)", "value");
    for (i, value) in trajectory.samples().iter().enumerate() {
        let t = duration * i as f64 / steps as f64;
        println!("{:>6} {:>10.1} {:>12.5}", i, t, value);
    }

    Ok(())
}

fn cmd_info() -> Result<()> {
    let defaults = cadence_motion::EngineConfig::default();

    println!("Cadence Motion");
    println!("==============");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Engine defaults:");
    println!("  - class prefix: {}", defaults.class_prefix);
    println!("  - precompute threshold: {}ms", defaults.precompute_threshold_ms);
    println!("  - spring steps: {}", defaults.default_spring_steps);
    println!("  - max frame delta: {}ms", defaults.max_frame_delta_ms);
    println!("  - flip threshold: {}px", defaults.flip_threshold_px);
    println!();
    println!("Spring presets (stiffness / damping):");
    for (name, preset) in [
        ("gentle", SpringConfig::gentle()),
        ("wobbly", SpringConfig::wobbly()),
        ("stiff", SpringConfig::stiff()),
        ("snappy", SpringConfig::snappy()),
        ("molasses", SpringConfig::molasses()),
    ] {
        println!("  - {:<9} {} / {}", name, preset.stiffness, preset.damping);
    }

    Ok(())
}
