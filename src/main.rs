mod config;
mod gateway;
mod ledger;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    config::{ConfigError, HarnessConfig},
    gateway::{Gateway, GatewayError},
    ledger::{LedgerError, LedgerState},
};

#[derive(Parser, Debug)]
#[command(
    name = "records",
    version,
    about = "Run record contract transactions against a local ledger"
)]
struct Opts {
    /// Ledger snapshot to load before and save after committing commands
    #[arg(long, global = true, value_name = "PATH")]
    state: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed the ledger, create a record for this run and read it back
    Demo,

    /// Run a query transaction
    Evaluate {
        transaction: String,
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Endorse and commit a transaction
    Submit {
        transaction: String,
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List the registered transactions
    Transactions,

    /// Print the resolved configuration
    Config,

    /// Print ledger height, record count and state root
    State,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("logging setup failed: {0}")]
    Logging(String),
}

fn init_logging(json: bool) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| AppError::Logging(e.to_string()))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| AppError::Logging(e.to_string()))
}

fn print_payload(payload: Option<String>) {
    match payload {
        Some(text) => println!("*** Result: {text}"),
        None => println!("*** Result: <empty>"),
    }
}

fn submit(gateway: &mut Gateway, transaction: &str, args: &[String]) -> Result<(), AppError> {
    println!("\n--> Submit Transaction: {transaction}");
    let (payload, status) = gateway.submit(transaction, args)?;
    println!(
        "*** Transaction {} committed successfully at height {} ({} writes)",
        status.tx_id, status.height, status.writes
    );
    if payload.is_some() {
        print_payload(payload);
    }
    Ok(())
}

fn evaluate(gateway: &Gateway, transaction: &str, args: &[String]) -> Result<(), AppError> {
    println!("\n--> Evaluate Transaction: {transaction}");
    print_payload(gateway.evaluate(transaction, args)?);
    Ok(())
}

fn demo(gateway: &mut Gateway) -> Result<(), AppError> {
    for line in gateway.config().display_lines() {
        println!("{line}");
    }
    let user_id = gateway.config().user_id.clone();

    submit(gateway, "InitLedger", &[])?;
    evaluate(gateway, "GetAll", &[])?;
    let create = [
        user_id.clone(),
        format!("appUser{user_id}"),
        "100".to_string(),
        "add from Fabric App".to_string(),
    ];
    submit(gateway, "Create", &create)?;
    evaluate(gateway, "GetById", &[user_id])?;
    Ok(())
}

fn run(opts: Opts) -> Result<(), AppError> {
    let config = HarnessConfig::from_env()?;
    let ledger = match &opts.state {
        Some(path) => LedgerState::load(path)?,
        None => LedgerState::new(),
    };
    info!(
        channel = %config.channel_name,
        chaincode = %config.chaincode_name,
        height = ledger.height(),
        "harness ready"
    );
    let mut gateway = Gateway::new(config, ledger);

    let commits = match &opts.command {
        Command::Demo => {
            demo(&mut gateway)?;
            true
        }
        Command::Evaluate { transaction, args } => {
            evaluate(&gateway, transaction, args)?;
            false
        }
        Command::Submit { transaction, args } => {
            submit(&mut gateway, transaction, args)?;
            true
        }
        Command::Transactions => {
            for tx in gateway.contract().transactions() {
                let arity = if tx.min_args == tx.max_args {
                    tx.min_args.to_string()
                } else {
                    format!("{}-{}", tx.min_args, tx.max_args)
                };
                println!(
                    "{:<12} {:<9} {:<8} args={}",
                    tx.name,
                    format!("{:?}", tx.kind),
                    format!("{:?}", tx.result),
                    arity
                );
            }
            false
        }
        Command::Config => {
            for line in gateway.config().display_lines() {
                println!("{line}");
            }
            false
        }
        Command::State => {
            let ledger = gateway.ledger();
            println!("height:      {}", ledger.height());
            println!("records:     {}", ledger.world().len());
            println!("state root:  {}", hex::encode(ledger.state_root()));
            if let Some(tx) = &ledger.meta.last_tx {
                println!("last tx:     {tx}");
            }
            false
        }
    };

    if commits {
        if let Some(path) = &opts.state {
            gateway.ledger().save(path)?;
            info!(path = %path.display(), height = gateway.ledger().height(), "ledger saved");
        }
    }
    Ok(())
}

fn main() {
    let opts = Opts::parse();
    if let Err(err) = init_logging(opts.json_logs) {
        eprintln!("{err}");
    }
    if let Err(err) = run(opts) {
        error!(error = %err, "application failed");
        eprintln!("******** FAILED to run the application: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_parses() {
        let opts = Opts::try_parse_from([
            "records",
            "--state",
            "ledger.json",
            "submit",
            "Create",
            "7",
            "seven",
            "70",
        ])
        .unwrap();
        assert_eq!(opts.state, Some(PathBuf::from("ledger.json")));
        match opts.command {
            Command::Submit { transaction, args } => {
                assert_eq!(transaction, "Create");
                assert_eq!(args, ["7", "seven", "70"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_are_global() {
        let opts = Opts::try_parse_from(["records", "state", "--json-logs"]).unwrap();
        assert!(opts.json_logs);
        assert!(matches!(opts.command, Command::State));
    }

    #[test]
    fn submits_persist_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let opts = |args: &[&str]| {
            let mut argv = vec!["records", "--state", path.to_str().unwrap()];
            argv.extend_from_slice(args);
            Opts::try_parse_from(argv).unwrap()
        };

        run(opts(&["submit", "InitLedger"])).unwrap();
        run(opts(&["submit", "Create", "3", "third", "30"])).unwrap();
        let ledger = LedgerState::load(&path).unwrap();
        assert_eq!(ledger.height(), 2);
        assert_eq!(ledger.world().len(), 3);

        let err = run(opts(&["submit", "Create", "3", "again", "1"])).unwrap_err();
        assert!(err.to_string().contains("already exists"), "{err}");
        assert_eq!(LedgerState::load(&path).unwrap().height(), 2);
    }
}
