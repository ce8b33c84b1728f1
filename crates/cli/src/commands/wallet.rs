//! Wallet management command.

use super::session::{list_keys, save_key, DataDirArgs, KeyFile, Session};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use walletchain_core::{Keypair, WalletId};

#[derive(Args)]
pub struct WalletArgs {
    #[command(subcommand)]
    command: WalletCommand,
}

#[derive(Subcommand)]
enum WalletCommand {
    /// Generate a keypair, save it and register the wallet
    New {
        #[command(flatten)]
        dir: DataDirArgs,

        /// Name for the key file (defaults to the wallet id)
        #[arg(short, long)]
        name: Option<String>,

        /// Wallet id (derived from the public key when omitted)
        #[arg(long)]
        id: Option<String>,
    },
    /// Register an existing public key
    Register {
        #[command(flatten)]
        dir: DataDirArgs,

        /// Public key (hex format)
        public_key: String,

        /// Wallet id (derived from the public key when omitted)
        #[arg(long)]
        id: Option<String>,
    },
    /// Check a wallet balance
    Balance {
        #[command(flatten)]
        dir: DataDirArgs,

        wallet: String,
    },
    /// Show a wallet and its unspent outputs
    Show {
        #[command(flatten)]
        dir: DataDirArgs,

        wallet: String,
    },
    /// List registered wallets and saved keys
    List {
        #[command(flatten)]
        dir: DataDirArgs,
    },
}

pub fn run(args: WalletArgs) -> Result<()> {
    match args.command {
        WalletCommand::New { dir, name, id } => new_wallet(dir, name, id),
        WalletCommand::Register {
            dir,
            public_key,
            id,
        } => register(dir, public_key, id),
        WalletCommand::Balance { dir, wallet } => balance(dir, wallet),
        WalletCommand::Show { dir, wallet } => show(dir, wallet),
        WalletCommand::List { dir } => list(dir),
    }
}

fn new_wallet(dir: DataDirArgs, name: Option<String>, id: Option<String>) -> Result<()> {
    let session = Session::open(&dir.data_dir)?;
    let ledger = session.ledger()?;

    let keypair = Keypair::generate();
    let wallet_id = ledger
        .register_wallet(&keypair.public_key.to_hex(), id.as_deref())
        .context("Failed to register wallet")?;

    let name = name.unwrap_or_else(|| wallet_id.to_string());
    let key_file = save_key(&dir.data_dir, &name, &KeyFile::new(wallet_id.as_str(), &keypair))?;

    println!("{}", "Registered new wallet:".bold().cyan());
    println!();
    println!("  Wallet ID:   {}", wallet_id.to_string().bright_yellow());
    println!(
        "  Public Key:  {}",
        keypair.public_key.to_hex().bright_black()
    );
    println!();
    println!(
        "{}  Saved key to: {}",
        "✓".green().bold(),
        key_file.display().to_string().bright_black()
    );
    println!();
    println!("{}", "Keep your private key safe!".yellow().bold());

    Ok(())
}

fn register(dir: DataDirArgs, public_key: String, id: Option<String>) -> Result<()> {
    let session = Session::open(&dir.data_dir)?;
    let wallet_id = session
        .ledger()?
        .register_wallet(&public_key, id.as_deref())
        .context("Failed to register wallet")?;

    println!(
        "{}  Registered wallet {}",
        "✓".green().bold(),
        wallet_id.to_string().bright_yellow()
    );
    Ok(())
}

fn balance(dir: DataDirArgs, wallet: String) -> Result<()> {
    let session = Session::open(&dir.data_dir)?;
    let balance = session.ledger()?.balance(&wallet)?;

    println!();
    println!("  Wallet:  {}", wallet.bright_yellow());
    println!("  Balance: {}", balance.to_string().bright_cyan());
    println!();

    Ok(())
}

fn show(dir: DataDirArgs, wallet: String) -> Result<()> {
    let session = Session::open(&dir.data_dir)?;
    let view = session.ledger()?.wallet(&wallet)?;

    println!();
    println!("{}", "Wallet Information:".bold().cyan());
    println!();
    println!("  Wallet ID:   {}", view.id.to_string().bright_yellow());
    println!("  Public Key:  {}", view.public_key.bright_black());
    println!("  Balance:     {}", view.balance.to_string().bright_cyan());
    println!("  UTXOs:       {}", view.utxos.len().to_string().bright_cyan());

    for utxo in &view.utxos {
        println!(
            "    {} {}",
            utxo.id.to_hex().bright_black(),
            utxo.amount.to_string().bright_cyan()
        );
    }
    println!();

    Ok(())
}

fn list(dir: DataDirArgs) -> Result<()> {
    let session = Session::open(&dir.data_dir)?;
    let ledger = session.ledger()?;
    let keys = list_keys(&dir.data_dir)?;

    println!();
    println!("{}", "Registered Wallets:".bold().cyan());
    println!();

    let wallets = ledger.wallets()?;
    if wallets.is_empty() {
        println!("  {}", "No wallets registered.".yellow());
    }
    for id in &wallets {
        let local = keys
            .iter()
            .find(|(_, key)| key.wallet_id == id.as_str())
            .map(|(name, _)| format!("(key: {})", name))
            .unwrap_or_default();
        println!(
            "  {} {} {}",
            id.to_string().bright_yellow(),
            ledger.balance(id.as_str())?.to_string().bright_cyan(),
            local.bright_black()
        );
    }

    let orphaned: Vec<_> = keys
        .iter()
        .filter(|(_, key)| {
            WalletId::parse(&key.wallet_id)
                .map(|id| !wallets.contains(&id))
                .unwrap_or(true)
        })
        .collect();
    if !orphaned.is_empty() {
        println!();
        println!("{}", "Unregistered key files:".yellow());
        for (name, key) in orphaned {
            println!("  {} {}", format!("{}:", name).bright_black(), key.wallet_id);
        }
    }
    println!();

    Ok(())
}
