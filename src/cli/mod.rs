use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use clap::{Parser, Subcommand};

use crate::application::{LedgerService, TransactionRequest};
use crate::config::{Provisioning, StoreConfig};
use crate::domain::{AccountId, Cents, Statement};
use crate::server::{self, ServerState};

/// Saldo - bounded-overdraft account ledger
#[derive(Parser)]
#[command(name = "saldo")]
#[command(about = "A ledger of fixed accounts with overdraft limits and consistent statements")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "saldo.db", global = true)]
    pub database: String,

    /// JSON file with the provisioned accounts (defaults to accounts 1-5)
    #[arg(short, long, global = true)]
    pub accounts: Option<PathBuf>,

    /// Connection attempts before giving up at startup
    #[arg(long, default_value_t = 10, global = true)]
    pub connect_attempts: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and provision the accounts
    Init,

    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// UTC offset for timestamps in replies, e.g. -03:00
        #[arg(long, default_value = "+00:00", allow_hyphen_values = true)]
        utc_offset: FixedOffset,
    },

    /// Apply a credit or debit to an account
    Apply {
        /// Account ID
        account: AccountId,

        /// Kind: c (credit) or d (debit)
        kind: String,

        /// Amount in cents
        #[arg(allow_negative_numbers = true)]
        amount: Cents,

        /// Description (1 to 10 characters)
        description: String,
    },

    /// Show balance, limit and the most recent transactions of an account
    Statement {
        /// Account ID
        account: AccountId,

        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// List the provisioned accounts with their balances
    Accounts,

    /// Verify ledger integrity
    Check,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let provisioning = match &self.accounts {
            Some(path) => Provisioning::from_file(path)?,
            None => Provisioning::reference(),
        };
        let store = StoreConfig::for_path(&self.database)
            .with_connect_attempts(self.connect_attempts);

        let service = Arc::new(LedgerService::init(&store, &provisioning).await?);

        let result = dispatch(self.command, &service, &self.database).await;
        service.close().await;
        result
    }
}

async fn dispatch(command: Commands, service: &Arc<LedgerService>, database: &str) -> Result<()> {
    match command {
        Commands::Init => {
            println!(
                "Database initialized: {} ({} accounts)",
                database,
                service.account_ids().len()
            );
        }

        Commands::Serve { bind, utc_offset } => {
            let state = ServerState::new(service.clone())?.with_utc_offset(utc_offset);
            server::serve(state, bind).await?
        }

        Commands::Apply {
            account,
            kind,
            amount,
            description,
        } => {
            let request = TransactionRequest::new(kind, amount, description);
            let applied = service.apply(account, &request).await?;
            println!(
                "Applied {} of {} to account {} (#{}): balance {}, limit {}",
                applied.transaction.kind,
                format_cents(applied.transaction.amount),
                account,
                applied.transaction.sequence,
                format_cents(applied.balance),
                format_cents(applied.limit)
            );
        }

        Commands::Statement { account, format } => {
            let statement = service.snapshot(account).await?;
            print_statement(&statement, &format)?;
        }

        Commands::Accounts => run_accounts_command(service).await?,

        Commands::Check => run_check_command(service).await?,
    }

    Ok(())
}

async fn run_accounts_command(service: &LedgerService) -> Result<()> {
    let accounts = service.list_accounts().await?;

    println!("{:<8} {:>14} {:>14}", "ACCOUNT", "BALANCE", "LIMIT");
    println!("{}", "-".repeat(38));
    for account in accounts {
        println!(
            "{:<8} {:>14} {:>14}",
            account.id,
            format_cents(account.balance),
            format_cents(account.limit)
        );
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.transaction_count);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        bail!("Ledger integrity check failed");
    }

    Ok(())
}

fn print_statement(statement: &Statement, format: &str) -> Result<()> {
    match format {
        "table" => {
            println!("Account {}", statement.account_id);
            println!("  Balance: {}", format_cents(statement.balance));
            println!("  Limit:   {}", format_cents(statement.limit));
            println!(
                "  As of:   {}",
                statement.as_of.format("%Y-%m-%d %H:%M:%S%.3f")
            );
            println!();

            if statement.transactions.is_empty() {
                println!("No transactions yet.");
                return Ok(());
            }

            println!(
                "{:>6} {:<24} {:<6} {:>12} DESCRIPTION",
                "SEQ", "DATE", "KIND", "AMOUNT"
            );
            println!("{}", "-".repeat(62));
            for t in &statement.transactions {
                println!(
                    "{:>6} {:<24} {:<6} {:>12} {}",
                    t.sequence,
                    t.occurred_at.format("%Y-%m-%d %H:%M:%S%.3f"),
                    t.kind,
                    format_cents(t.amount),
                    t.description
                );
            }
        }

        "json" => {
            let json = serde_json::to_string_pretty(statement)
                .context("Failed to serialize statement")?;
            println!("{}", json);
        }

        "csv" => {
            let mut writer = csv::Writer::from_writer(io::stdout());
            writer.write_record(["sequence", "occurred_at", "kind", "amount", "description"])?;
            for t in &statement.transactions {
                writer.write_record(&[
                    t.sequence.to_string(),
                    t.occurred_at.to_rfc3339(),
                    t.kind.as_str().to_string(),
                    t.amount.to_string(),
                    t.description.to_string(),
                ])?;
            }
            writer.flush()?;
        }

        other => bail!("Unknown format '{}'. Use table, json or csv", other),
    }
    Ok(())
}

/// Render cents as units with two decimals, e.g. -1234 -> "-12.34".
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
