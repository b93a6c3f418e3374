//! SAS CLI
//!
//! Command-line front end for the SAS attestation SDK: inspect the vault,
//! issue and revoke certificates, verify their status and wait for
//! confirmations.
//!
//! Secrets are never passed on the command line; the admin secret is read
//! from `SAS_ADMIN_SECRET` and the delegate secret from
//! `SAS_DELEGATE_SECRET`.

use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use sas_core::{
    CertificateStatus, RevokeOptions, Role, Sas, SasConfig, TransactionResult,
};

const ADMIN_SECRET_VAR: &str = "SAS_ADMIN_SECRET";
const DELEGATE_SECRET_VAR: &str = "SAS_DELEGATE_SECRET";

fn cli() -> Command {
    Command::new("sas")
        .about("SAS attestation certificates on Liquid")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .default_value("vault_config.json")
                .help("Path to the public vault configuration"),
        )
        .arg(
            Arg::new("role")
                .long("role")
                .short('r')
                .global(true)
                .default_value("delegate")
                .value_parser(["admin", "delegate"])
                .help("Role to operate as"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(Command::new("vault").about("Show vault address, balance and UTXOs"))
        .subcommand(
            Command::new("issue")
                .about("Issue a certificate bound to a content id")
                .arg(Arg::new("cid").required(true).help("IPFS CID or hex hash")),
        )
        .subcommand(
            Command::new("revoke")
                .about("Revoke a certificate by spending its UTXO")
                .arg(Arg::new("txid").required(true))
                .arg(
                    Arg::new("vout")
                        .long("vout")
                        .default_value("1")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(
                    Arg::new("recipient")
                        .long("recipient")
                        .help("Forward the certificate value here instead of burning it"),
                )
                .arg(
                    Arg::new("reason")
                        .long("reason")
                        .value_parser(clap::value_parser!(u8))
                        .help("Reason code recorded on chain"),
                )
                .arg(
                    Arg::new("replacement")
                        .long("replacement")
                        .help("Replacement certificate txid (requires --reason)"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Check whether a certificate is still valid")
                .arg(Arg::new("txid").required(true))
                .arg(
                    Arg::new("vout")
                        .long("vout")
                        .default_value("1")
                        .value_parser(clap::value_parser!(u32)),
                ),
        )
        .subcommand(
            Command::new("get")
                .about("Show certificate details including the content id")
                .arg(Arg::new("txid").required(true))
                .arg(
                    Arg::new("vout")
                        .long("vout")
                        .default_value("1")
                        .value_parser(clap::value_parser!(u32)),
                ),
        )
        .subcommand(Command::new("list").about("List all unspent certificates"))
        .subcommand(
            Command::new("drain")
                .about("Drain the vault to a recipient (admin only)")
                .arg(Arg::new("recipient").required(true)),
        )
        .subcommand(
            Command::new("wait")
                .about("Wait for a transaction to confirm")
                .arg(Arg::new("txid").required(true))
                .arg(
                    Arg::new("target")
                        .long("target")
                        .default_value("1")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .default_value("600")
                        .value_parser(clap::value_parser!(u64))
                        .help("Timeout in seconds"),
                ),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let level = if matches.get_flag("verbose") {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = SasConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path))?;

    let role = match matches.get_one::<String>("role").unwrap().as_str() {
        "admin" => Role::Admin,
        _ => Role::Delegate,
    };

    let client = connect(config, role)?;

    match matches.subcommand() {
        Some(("vault", _)) => {
            let vault = client.vault()?;
            println!("address:  {}", vault.address);
            println!("balance:  {} sats", vault.balance);
            println!("can_issue: {}", vault.can_issue());
            for utxo in &vault.utxos {
                println!("  {} {} sats", utxo.outpoint(), utxo.value);
            }
        }
        Some(("issue", sub)) => {
            let cid = sub.get_one::<String>("cid").unwrap();
            report(client.issue_certificate(cid))?;
        }
        Some(("revoke", sub)) => {
            let txid = sub.get_one::<String>("txid").unwrap();
            let vout = *sub.get_one::<u32>("vout").unwrap();
            let options = RevokeOptions {
                recipient: sub.get_one::<String>("recipient").cloned(),
                reason_code: sub.get_one::<u8>("reason").copied(),
                replacement_txid: sub.get_one::<String>("replacement").cloned(),
            };
            report(client.revoke_certificate(txid, vout, options))?;
        }
        Some(("verify", sub)) => {
            let txid = sub.get_one::<String>("txid").unwrap();
            let vout = *sub.get_one::<u32>("vout").unwrap();
            match client.verify_certificate(txid, vout) {
                CertificateStatus::Valid => println!("VALID"),
                CertificateStatus::Revoked => println!("REVOKED"),
                CertificateStatus::Unknown => println!("UNKNOWN"),
            }
        }
        Some(("get", sub)) => {
            let txid = sub.get_one::<String>("txid").unwrap();
            let vout = *sub.get_one::<u32>("vout").unwrap();
            match client.get_certificate(txid, vout)? {
                Some(cert) => println!("{}", serde_json::to_string_pretty(&cert)?),
                None => bail!("transaction {} not found", txid),
            }
        }
        Some(("list", _)) => {
            let certificates = client.list_certificates()?;
            if certificates.is_empty() {
                println!("no active certificates");
            }
            for cert in certificates {
                println!(
                    "{}  {}",
                    cert.outpoint(),
                    cert.cid.as_deref().unwrap_or("(no cid)")
                );
            }
        }
        Some(("drain", sub)) => {
            let recipient = sub.get_one::<String>("recipient").unwrap();
            report(client.drain_vault(recipient))?;
        }
        Some(("wait", sub)) => {
            let txid = sub.get_one::<String>("txid").unwrap();
            let target = *sub.get_one::<u32>("target").unwrap();
            let timeout = Duration::from_secs(*sub.get_one::<u64>("timeout").unwrap());
            let status = client.wait_for_confirmation(txid, target, Some(timeout))?;
            println!(
                "{} confirmed ({} confirmations, height {:?})",
                status.txid, status.confirmations, status.block_height
            );
        }
        _ => unreachable!("subcommand required"),
    }

    Ok(())
}

fn connect(config: SasConfig, role: Role) -> Result<Sas> {
    let var = match role {
        Role::Admin => ADMIN_SECRET_VAR,
        Role::Delegate => DELEGATE_SECRET_VAR,
    };
    let secret = env::var(var)
        .map_err(|_| anyhow!("set {} to the {} secret key (64 hex chars)", var, role))?;
    let client = match role {
        Role::Admin => Sas::as_admin(config, &secret)?,
        Role::Delegate => Sas::as_delegate(config, &secret)?,
    };
    Ok(client)
}

fn report(result: TransactionResult) -> Result<()> {
    if result.success {
        match (&result.txid, &result.explorer_url) {
            (Some(txid), Some(url)) => {
                println!("txid: {}", txid);
                println!("explorer: {}", url);
            }
            _ => println!("raw: {}", result.raw_hex.as_deref().unwrap_or("")),
        }
        Ok(())
    } else {
        match result.error {
            Some(error) => Err(error.into()),
            None => bail!("operation failed"),
        }
    }
}
