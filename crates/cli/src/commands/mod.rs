//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod block;
mod init;
mod session;
mod tx;
mod wallet;

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new ledger
    Init(init::InitArgs),
    /// Wallet management
    Wallet(wallet::WalletArgs),
    /// Mint value to a wallet (system funding)
    Fund(tx::FundArgs),
    /// Sign and submit a transfer
    Send(tx::SendArgs),
    /// Seal pending transactions into a block
    Mine(block::MineArgs),
    /// Block explorer
    Block(block::BlockArgs),
    /// Transaction lookup
    Tx(tx::TxArgs),
    /// List pending transactions
    Pending(session::DataDirArgs),
    /// Validate the stored chain
    Validate(session::DataDirArgs),
    /// Show ledger statistics
    Stats(session::DataDirArgs),
}

pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init(args) => init::run(args),
        Commands::Wallet(args) => wallet::run(args),
        Commands::Fund(args) => tx::fund(args),
        Commands::Send(args) => tx::send(args),
        Commands::Mine(args) => block::mine(args),
        Commands::Block(args) => block::run(args),
        Commands::Tx(args) => tx::run(args),
        Commands::Pending(args) => tx::pending(args),
        Commands::Validate(args) => block::validate(args),
        Commands::Stats(args) => block::stats(args),
    }
}
