use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Inspect and tear down the virtual storage layers (partitions, LVM,
/// RAID, bcache) stacked on top of a set of block devices.
#[derive(Debug, Parser)]
#[clap(name = "storectl", version)]
struct App {
    /// Raise the logging level by one step (info -> debug -> trace),
    /// stacking with `RUST_LOG` if both are set.
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the holders tree rooted at each device.
    Tree {
        /// Kernel names, /dev paths, or /sys/block paths.
        devices: Vec<String>,
    },
    /// Print the computed teardown schedule for each device, most urgent
    /// (deepest) entry first.
    Plan { devices: Vec<String> },
    /// Check that each device is clear of any non-trivial holders,
    /// without tearing anything down.
    AssertClear { devices: Vec<String> },
    /// Tear down every virtual storage layer depending on each device.
    Clear { devices: Vec<String> },
}

fn main() -> Result<()> {
    let app = App::parse();

    let default_level = match app.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(app.cmd) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(cmd: Command) -> Result<()> {
    match cmd {
        Command::Tree { devices } => {
            for device in &devices {
                let tree = storectl_holders::gen_holders_tree(device)?;
                println!("{}", storectl_holders::format_holders_tree(&tree));
            }
        }
        Command::Plan { devices } => {
            let trees = devices
                .iter()
                .map(|d| storectl_holders::gen_holders_tree(d))
                .collect::<Result<Vec<_>, _>>()?;
            let schedule = storectl_holders::plan_shutdown_holder_trees(trees.iter());
            for entry in schedule {
                println!("{}\t{}\t{}", entry.level, entry.kind, short(&entry.device));
            }
        }
        Command::AssertClear { devices } => {
            let refs: Vec<&str> = devices.iter().map(String::as_str).collect();
            storectl_holders::assert_clear(&refs)?;
        }
        Command::Clear { devices } => {
            let refs: Vec<&str> = devices.iter().map(String::as_str).collect();
            storectl_holders::clear_holders(&refs)?;
        }
    }
    Ok(())
}

fn short(path: &Utf8PathBuf) -> &str {
    storectl_holders::short_name(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_clear_with_multiple_devices() {
        let app = App::parse_from(["storectl", "clear", "sda", "sdb"]);
        assert!(matches!(app.cmd, Command::Clear { devices } if devices == ["sda", "sdb"]));
    }

    #[test]
    fn test_verbose_flag_stacks() {
        let app = App::parse_from(["storectl", "-vv", "tree", "sda"]);
        assert_eq!(app.verbose, 2);
    }
}
