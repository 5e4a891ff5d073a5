//! Print wallets, journals and withdrawals from a RocksDB ledger.

use bingohall::ledger::types::Wallet;
use bingohall::ledger::{LedgerStore, PlayerId, RocksLedgerStore};
use bingohall::storage::OptimizedStorage;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "inspect_ledger")]
#[command(about = "Inspect a bingohall ledger database", long_about = None)]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./DB/bingohall")]
    db_path: PathBuf,

    /// Show the journal of one player (phone number)
    #[arg(long)]
    player: Option<String>,

    /// Maximum wallets to list
    #[arg(long, default_value = "50")]
    limit: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if !args.db_path.exists() {
        println!("No ledger found at {}", args.db_path.display());
        return Ok(());
    }

    let storage = OptimizedStorage::new(&args.db_path)?;
    let store = RocksLedgerStore::new(storage.clone());

    println!("Ledger at {}", args.db_path.display());
    println!("=======================");

    println!("\nWallets:");
    for (_key, value) in storage.scan_prefix(b"wallet:", args.limit)? {
        match serde_json::from_slice::<Wallet>(&value) {
            Ok(wallet) => println!("   {}  balance {}", wallet.player, wallet.balance),
            Err(e) => println!("   unreadable wallet: {}", e),
        }
    }

    println!("\nWithdrawals:");
    let withdrawals = store.list_withdrawals(None)?;
    if withdrawals.is_empty() {
        println!("   none");
    }
    for w in withdrawals {
        println!(
            "   {}  {}  {}  {:?}  -> {}",
            w.id, w.player, w.amount, w.status, w.destination
        );
    }

    if let Some(phone) = args.player {
        let player = PlayerId::parse(&phone)?;
        println!("\nJournal of {}:", player);
        for entry in store.journal(&player)? {
            println!(
                "   {}  {:>10}  balance {}  {:?}",
                entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                entry.delta,
                entry.balance_after,
                entry.reason
            );
        }
    }

    Ok(())
}
