//! Block commands: mining, explorer, validation, stats.

use super::session::{DataDirArgs, Session};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use walletchain_chain::{FinalizationOutcome, LedgerError};
use walletchain_core::{format_timestamp, Block};

#[derive(Args)]
pub struct MineArgs {
    #[command(flatten)]
    dir: DataDirArgs,

    /// Override the configured difficulty
    #[arg(long, env = "POW_DIFFICULTY")]
    difficulty: Option<usize>,
}

#[derive(Args)]
pub struct BlockArgs {
    #[command(subcommand)]
    command: BlockCommand,
}

#[derive(Subcommand)]
enum BlockCommand {
    /// List recent blocks
    List {
        #[command(flatten)]
        dir: DataDirArgs,

        /// Number of blocks to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },
    /// Show detailed block information
    Show {
        #[command(flatten)]
        dir: DataDirArgs,

        /// Block index
        index: u64,
    },
}

pub fn run(args: BlockArgs) -> Result<()> {
    match args.command {
        BlockCommand::List { dir, count } => list_blocks(dir, count),
        BlockCommand::Show { dir, index } => show_block(dir, index),
    }
}

pub fn mine(args: MineArgs) -> Result<()> {
    let session = Session::open(&args.dir.data_dir)?;
    let difficulty = args.difficulty.unwrap_or(session.config.difficulty);
    let ledger = session.ledger_with_difficulty(difficulty)?;

    println!(
        "{} (difficulty {})",
        "Mining...".bold().cyan(),
        difficulty.to_string().bright_cyan()
    );

    match ledger.finalize().context("Finalization failed")? {
        FinalizationOutcome::NothingToFinalize => {
            println!("  {}", "Nothing to finalize.".yellow());
        }
        FinalizationOutcome::Sealed(block) => {
            println!();
            println!(
                "{}  Sealed block #{}",
                "✓".green().bold(),
                block.index().to_string().bright_cyan()
            );
            println!("    Hash:         {}", block.hash.to_hex().bright_yellow());
            println!("    Nonce:        {}", block.header.nonce);
            println!("    Transactions: {}", block.tx_count());
        }
    }
    Ok(())
}

fn list_blocks(dir: DataDirArgs, count: usize) -> Result<()> {
    let session = Session::open(&dir.data_dir)?;
    let blocks = session.ledger()?.recent_blocks(count)?;

    println!();
    println!("{}", "Recent Blocks:".bold().cyan());
    println!();

    if blocks.is_empty() {
        println!("  {}", "No blocks yet.".yellow());
    }
    for block in &blocks {
        println!(
            "  #{:<6} {}  {} txs  {}",
            block.index().to_string().bright_cyan(),
            block.hash.to_hex()[..16].bright_yellow(),
            block.tx_count(),
            format_timestamp(&block.header.timestamp).bright_black()
        );
    }
    println!();
    Ok(())
}

fn show_block(dir: DataDirArgs, index: u64) -> Result<()> {
    let session = Session::open(&dir.data_dir)?;
    let block = session.ledger()?.block(index)?;
    print_block(&block);
    Ok(())
}

fn print_block(block: &Block) {
    println!();
    println!("{}", "Block Information:".bold().cyan());
    println!();
    println!("  Index:       {}", block.index().to_string().bright_cyan());
    println!("  Hash:        {}", block.hash.to_hex().bright_yellow());
    println!(
        "  Previous:    {}",
        block
            .previous_hash()
            .map(|h| h.to_hex())
            .unwrap_or_else(|| "(none)".to_string())
            .bright_black()
    );
    println!("  Merkle Root: {}", block.header.merkle_root.to_hex().bright_black());
    println!("  Timestamp:   {}", format_timestamp(&block.header.timestamp));
    println!("  Nonce:       {}", block.header.nonce);
    println!("  Difficulty:  {}", block.difficulty);
    println!("  Transactions ({}):", block.tx_count());
    for id in &block.transaction_ids {
        println!("    {}", id.to_hex().bright_black());
    }
    println!();
}

pub fn validate(dir: DataDirArgs) -> Result<()> {
    let session = Session::open(&dir.data_dir)?;
    match session.ledger()?.validate_chain() {
        Ok(report) => {
            println!(
                "{}  Chain valid: {} block(s) checked",
                "✓".green().bold(),
                report.blocks_checked.to_string().bright_cyan()
            );
            Ok(())
        }
        Err(LedgerError::ChainLinkage(problems)) => {
            println!("{}", "Chain validation failed:".red().bold());
            for problem in &problems {
                println!("  • {}", problem);
            }
            Err(LedgerError::ChainLinkage(problems).into())
        }
        Err(err) => Err(err.into()),
    }
}

pub fn stats(dir: DataDirArgs) -> Result<()> {
    let session = Session::open(&dir.data_dir)?;
    let stats = session.ledger()?.stats()?;

    println!();
    println!("{}", "Ledger Statistics:".bold().cyan());
    println!();
    println!("  Height:       {}", stats.height.to_string().bright_cyan());
    println!(
        "  Tip Hash:     {}",
        stats
            .tip_hash
            .map(|h| h.to_hex())
            .unwrap_or_else(|| "(empty chain)".to_string())
            .bright_yellow()
    );
    println!(
        "  Pending:      {}",
        stats.pending_transactions.to_string().bright_cyan()
    );
    println!("  Wallets:      {}", stats.wallets.to_string().bright_cyan());
    println!("  Difficulty:   {}", stats.difficulty.to_string().bright_cyan());
    println!();
    Ok(())
}
