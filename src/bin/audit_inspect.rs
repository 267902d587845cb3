use anyhow::Result;
use clap::{Arg, Command};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use record_anchor::anchor::{Anchor, HttpAnchorClient};
use record_anchor::canonical::Fingerprint;
use record_anchor::ledger::{AuditLedger, EntryFilter, EntryStatus};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new("audit-inspect")
        .version("0.1.0")
        .about("Inspect and verify stored record-anchor audit entries")
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("URL")
                .help("Audit ledger database URL")
                .default_value("sqlite://audit.db"),
        )
        .arg(
            Arg::new("fingerprint")
                .short('f')
                .long("fingerprint")
                .value_name("HEX")
                .help("Look up a single entry by its 0x-prefixed fingerprint"),
        )
        .arg(
            Arg::new("record-type")
                .long("record-type")
                .value_name("TYPE")
                .help("Filter entries by record type"),
        )
        .arg(
            Arg::new("record-id")
                .long("record-id")
                .value_name("ID")
                .help("Filter entries by record id"),
        )
        .arg(
            Arg::new("status")
                .short('s')
                .long("status")
                .value_name("STATUS")
                .help("Filter entries by status (pending, confirmed, failed)"),
        )
        .arg(
            Arg::new("limit")
                .short('n')
                .long("limit")
                .value_name("N")
                .help("Maximum entries to list")
                .default_value("50"),
        )
        .arg(
            Arg::new("anchor-url")
                .long("anchor-url")
                .value_name("URL")
                .help("Also check on-ledger presence against this anchor node"),
        )
        .get_matches();

    let database_url = matches.get_one::<String>("database-url").unwrap();
    let ledger = AuditLedger::connect(database_url).await?;
    ledger.run_migrations().await?;

    let anchor = match matches.get_one::<String>("anchor-url") {
        Some(url) => Anchor::new(Arc::new(HttpAnchorClient::new(
            url.clone(),
            Duration::from_secs(10),
        ))),
        None => Anchor::disabled(),
    };

    if let Some(raw) = matches.get_one::<String>("fingerprint") {
        let fingerprint = Fingerprint::parse(raw)?;
        match ledger.get_by_fingerprint(&fingerprint).await? {
            Some(entry) => {
                print_entry(&entry);
                if anchor.is_configured() {
                    match anchor.query(&fingerprint).await {
                        Ok(present) => println!("  on ledger: {}", present),
                        Err(e) => println!("  on ledger: unknown ({})", e),
                    }
                }
            }
            None => {
                println!("No entry found for {}", fingerprint);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let filter = EntryFilter {
        record_type: matches.get_one::<String>("record-type").cloned(),
        record_id: matches.get_one::<String>("record-id").cloned(),
        status: matches
            .get_one::<String>("status")
            .map(|s| EntryStatus::from_str(s))
            .transpose()
            .map_err(anyhow::Error::msg)?,
        limit: Some(matches.get_one::<String>("limit").unwrap().parse()?),
    };

    let entries = ledger.list(&filter).await?;
    println!("{} entries", entries.len());
    for entry in &entries {
        print_entry(entry);
    }

    Ok(())
}

fn print_entry(entry: &record_anchor::ledger::AuditEntry) {
    println!(
        "#{} {} {}/{} [{}] {}",
        entry.id,
        entry.created_at.to_rfc3339(),
        entry.record_type,
        entry.record_id,
        entry.status,
        entry.fingerprint
    );
    if let Some(reference) = &entry.external_reference {
        println!("  external reference: {}", reference);
    }
    if let Some(content) = &entry.content_reference {
        println!("  content reference:  {}", content);
    }
}
