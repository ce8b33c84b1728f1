//! Transaction commands: fund, send, lookup, pending pool.

use super::session::{load_key, DataDirArgs, Session};
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use walletchain_chain::{TransferRequest, DEFAULT_FUNDING_NOTE};
use walletchain_core::{
    format_timestamp, Clock, Hash, OutputId, SystemClock, Transaction, TransactionRecord,
    UnspentOutput,
};

#[derive(Args)]
pub struct FundArgs {
    #[command(flatten)]
    dir: DataDirArgs,

    /// Receiving wallet id
    #[arg(short, long)]
    to: String,

    #[arg(short, long)]
    amount: u64,

    #[arg(short, long, default_value = DEFAULT_FUNDING_NOTE)]
    note: String,
}

#[derive(Args)]
pub struct SendArgs {
    #[command(flatten)]
    dir: DataDirArgs,

    /// Sender key file name (without .json extension)
    #[arg(short, long)]
    from: String,

    /// Receiving wallet id
    #[arg(short, long)]
    to: String,

    #[arg(short, long)]
    amount: u64,

    #[arg(short, long, default_value = "")]
    note: String,

    /// Output ids to spend (hex); chosen automatically when omitted
    #[arg(short, long = "input")]
    inputs: Vec<String>,
}

#[derive(Args)]
pub struct TxArgs {
    #[command(subcommand)]
    command: TxCommand,
}

#[derive(Subcommand)]
enum TxCommand {
    /// Show a transaction
    Show {
        #[command(flatten)]
        dir: DataDirArgs,

        /// Transaction id (hex format)
        id: String,
    },
}

pub fn run(args: TxArgs) -> Result<()> {
    match args.command {
        TxCommand::Show { dir, id } => show(dir, id),
    }
}

pub fn fund(args: FundArgs) -> Result<()> {
    let session = Session::open(&args.dir.data_dir)?;
    let id = session
        .ledger()?
        .fund(&args.to, args.amount, Some(&args.note))
        .context("Funding failed")?;

    println!(
        "{}  Funded {} with {}",
        "✓".green().bold(),
        args.to.bright_yellow(),
        args.amount.to_string().bright_cyan()
    );
    println!("    Transaction: {}", id.to_hex().bright_black());
    Ok(())
}

pub fn send(args: SendArgs) -> Result<()> {
    let key = load_key(&args.dir.data_dir, &args.from)?;
    let keypair = key.keypair()?;

    let session = Session::open(&args.dir.data_dir)?;
    let ledger = session.ledger()?;

    let inputs = if args.inputs.is_empty() {
        let view = ledger.wallet(&key.wallet_id)?;
        select_inputs(&view.utxos, args.amount)?
    } else {
        args.inputs
            .iter()
            .map(|s| Hash::from_hex(s).with_context(|| format!("Invalid output id: {}", s)))
            .collect::<Result<Vec<OutputId>>>()?
    };

    let timestamp = format_timestamp(&SystemClock.now());
    let request = TransferRequest::signed(
        &key.wallet_id,
        &args.to,
        args.amount,
        &args.note,
        &timestamp,
        inputs,
        &keypair,
    )?;
    let id = ledger.admit(&request).context("Transfer rejected")?;

    println!(
        "{}  Sent {} from {} to {}",
        "✓".green().bold(),
        args.amount.to_string().bright_cyan(),
        key.wallet_id.bright_yellow(),
        args.to.bright_yellow()
    );
    println!("    Inputs:      {}", request.inputs.len());
    println!("    Transaction: {}", id.to_hex().bright_black());
    Ok(())
}

/// Pick unspent outputs, largest first, until they cover `amount`.
fn select_inputs(utxos: &[UnspentOutput], amount: u64) -> Result<Vec<OutputId>> {
    let mut candidates: Vec<&UnspentOutput> = utxos.iter().filter(|u| !u.spent).collect();
    candidates.sort_by(|a, b| b.amount.cmp(&a.amount));

    let mut selected = Vec::new();
    let mut total: u64 = 0;
    for utxo in candidates {
        if total >= amount {
            break;
        }
        total = total.saturating_add(utxo.amount);
        selected.push(utxo.id);
    }
    if total < amount {
        bail!("Insufficient funds: need {}, have {}", amount, total);
    }
    Ok(selected)
}

fn show(dir: DataDirArgs, id: String) -> Result<()> {
    let id = Hash::from_hex(&id).with_context(|| format!("Invalid transaction id: {}", id))?;
    let session = Session::open(&dir.data_dir)?;
    let record = session.ledger()?.transaction(&id)?;

    println!();
    println!("{}", "Transaction:".bold().cyan());
    println!();
    print_transaction(record.transaction());
    match &record {
        TransactionRecord::Pending(_) => println!("  Status:    {}", "pending".yellow()),
        TransactionRecord::Finalized(f) => {
            println!("  Status:    {}", "finalized".green());
            println!("  Block:     #{}", f.block_index.to_string().bright_cyan());
            println!("  Block Hash: {}", f.block_hash.to_hex().bright_black());
        }
    }
    println!();
    Ok(())
}

pub fn pending(dir: DataDirArgs) -> Result<()> {
    let session = Session::open(&dir.data_dir)?;
    let pending = session.ledger()?.pending()?;

    println!();
    println!("{}", "Pending Transactions:".bold().cyan());
    println!();
    if pending.is_empty() {
        println!("  {}", "Pending pool is empty.".yellow());
    }
    for tx in &pending {
        println!(
            "  {} {} → {} {}",
            tx.id.to_hex()[..16].bright_black(),
            tx.sender.to_string().bright_yellow(),
            tx.receiver.to_string().bright_yellow(),
            tx.amount.to_string().bright_cyan()
        );
    }
    println!();
    Ok(())
}

fn print_transaction(tx: &Transaction) {
    println!("  ID:        {}", tx.id.to_hex().bright_yellow());
    println!("  Sender:    {}", tx.sender);
    println!("  Receiver:  {}", tx.receiver);
    println!("  Amount:    {}", tx.amount.to_string().bright_cyan());
    if !tx.note.is_empty() {
        println!("  Note:      {}", tx.note);
    }
    println!("  Admitted:  {}", format_timestamp(&tx.timestamp));
    for input in &tx.inputs {
        println!("  Input:     {}", input.to_hex().bright_black());
    }
    for (index, output) in tx.outputs.iter().enumerate() {
        println!(
            "  Output {}:  {} {}",
            index,
            output.recipient,
            output.amount.to_string().bright_cyan()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use walletchain_core::{hash, WalletId};

    fn utxo(seed: &[u8], amount: u64) -> UnspentOutput {
        UnspentOutput::new(hash(seed), 0, WalletId::parse("alice").unwrap(), amount, Utc::now())
    }

    #[test]
    fn test_select_inputs_largest_first() {
        let utxos = vec![utxo(b"a", 5), utxo(b"b", 50), utxo(b"c", 20)];
        let selected = select_inputs(&utxos, 60).unwrap();
        assert_eq!(selected, vec![utxos[1].id, utxos[2].id]);
    }

    #[test]
    fn test_select_inputs_insufficient() {
        let utxos = vec![utxo(b"a", 5)];
        assert!(select_inputs(&utxos, 6).is_err());
        assert_eq!(select_inputs(&utxos, 5).unwrap().len(), 1);
    }
}
