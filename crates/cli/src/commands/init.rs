//! Initialize ledger command.

use super::session::{CONFIG_FILE, LEDGER_DIR};
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use walletchain_chain::{BackendConfig, LedgerConfig, DEFAULT_DIFFICULTY};

#[derive(Args)]
pub struct InitArgs {
    /// Directory to store ledger data
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Leading hex zeros required of every block hash
    #[arg(long, env = "POW_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: usize,
}

pub fn run(args: InitArgs) -> Result<()> {
    println!("{}", "Initializing walletchain...".bold().cyan());
    println!();

    let config_file = args.data_dir.join(CONFIG_FILE);
    if config_file.exists() {
        bail!(
            "Ledger already initialized: {} exists",
            config_file.display()
        );
    }

    fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", args.data_dir))?;
    println!("{}  Created data directory", "✓".green().bold());

    // Stored relative to the data directory so it can be opened from anywhere.
    let config = LedgerConfig::new(BackendConfig::Sled {
        path: PathBuf::from(LEDGER_DIR),
    })
    .with_difficulty(args.difficulty);

    // Opening once creates the database files.
    let store = config
        .open_store(&args.data_dir)
        .context("Failed to create the ledger store")?;
    drop(store);
    println!("{}  Created ledger store", "✓".green().bold());

    config
        .save(&config_file)
        .context("Failed to write config.json")?;
    println!(
        "{}  Saved config to: {}",
        "✓".green().bold(),
        config_file.display().to_string().bright_black()
    );
    println!(
        "    Difficulty: {}",
        config.difficulty.to_string().bright_cyan()
    );

    println!();
    println!("{}", "Ledger initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  • Use {} to create a wallet",
        "walletchain wallet new".bright_cyan()
    );
    println!(
        "  • Use {} to mint funds",
        "walletchain fund".bright_cyan()
    );
    println!(
        "  • Use {} to seal pending transactions",
        "walletchain mine".bright_cyan()
    );

    Ok(())
}
