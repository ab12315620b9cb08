//! teslacrack - TeslaCrypt key recovery and bulk file restore
//!
//! Keys are recovered from the factors of the integer stored in each
//! encrypted file's header; factorizing that integer is left to external
//! tools.

mod cli;
mod keydb;
mod progress;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use teslacrack::error::CipherError;
use teslacrack::types::BLOCK_LEN;
use teslacrack::{cipher, recovery};
use teslacrack::{AesKey, CipherHeader, FactorSet, KeyStore, ScanOptions, Scanner, HEADER_LEN};
use tracing::Level;

use cli::{Cli, Commands};
use keydb::KeyDatabase;
use progress::ProgressReporter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let db = KeyDatabase::open(&cli.keys)?;

    match cli.command {
        Commands::Decrypt {
            paths,
            dry_run,
            fix,
            overwrite,
            delete,
            delete_old,
            progress,
            sequential,
            json,
            extensions,
        } => {
            let mut options = ScanOptions::new(paths)
                .with_dry_run(dry_run)
                .with_fix(fix)
                .with_overwrite(overwrite)
                .with_delete(delete)
                .with_delete_old(delete_old)
                .with_verbose(cli.verbose)
                .with_progress(progress);
            if sequential {
                options = options.sequential();
            }
            if let Some(extensions) = extensions {
                options = options.with_extensions(extensions);
            }
            run_decrypt(&options, &db, json)
        }
        Commands::Unfactor {
            file,
            factors,
            width,
            save,
        } => run_unfactor(&file, &factors, width, save.then_some(&db)),
        Commands::Keys { pending } => {
            list_keys(&db, pending);
            Ok(())
        }
    }
}

fn run_decrypt(options: &ScanOptions, db: &KeyDatabase, json: bool) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let reporter = options.progress.then(ProgressReporter::new);

    let mut scanner = Scanner::new(options, db.store())
        .context("Invalid scan options")?
        .with_running_flag(Arc::clone(&running));
    if let Some(reporter) = &reporter {
        scanner = scanner.with_progress(reporter.scan_callback());
    }

    let stats = scanner.run().context("Scan failed")?;
    if let Some(reporter) = reporter {
        reporter.finish();
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialize statistics")?
        );
    } else {
        println!("{stats}");
    }

    if !running.load(Ordering::SeqCst) {
        eprintln!("\n⚠️  Scan interrupted, statistics are partial");
    }

    let pending = db.store().pending();
    if !pending.is_empty() {
        eprintln!(
            "\n{} key id(s) need factorizing before their files can be decrypted:",
            pending.len()
        );
        for id in &pending {
            eprintln!("  {id}");
        }
    }

    if options.dry_run {
        tracing::debug!("Dry run, key database not saved");
        return Ok(());
    }
    db.save()
}

fn run_unfactor(
    file: &Path,
    factors: &[String],
    width: usize,
    save_to: Option<&KeyDatabase>,
) -> Result<()> {
    let mut data = Vec::with_capacity(HEADER_LEN + BLOCK_LEN);
    File::open(file)
        .and_then(|f| f.take((HEADER_LEN + BLOCK_LEN) as u64).read_to_end(&mut data))
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let header = CipherHeader::parse(&data)
        .with_context(|| format!("{} is not a TeslaCrypt file", file.display()))?
        .with_original_extension(original_extension(file));
    let probe = data
        .get(HEADER_LEN..HEADER_LEN + BLOCK_LEN)
        .context("File has no ciphertext to validate keys against")?;

    let factors = FactorSet::from_decimal(factors).context("Invalid factor")?;
    if !factors.reconstructs(&header.embedded_key()) {
        tracing::warn!("Factors do not multiply to the header integer, the key may be missed");
    }

    let keys = recovery::recover(&factors, width, |candidate: &AesKey| {
        let prefix = cipher::decrypt_prefix(&header, probe, candidate)?;
        Ok::<_, CipherError>(cipher::looks_valid(&prefix, header.original_extension()))
    })
    .context("Key recovery failed")?;

    if keys.is_empty() {
        bail!("No candidate key decrypts {}", file.display());
    }
    for key in &keys {
        println!("{key}");
    }

    if let Some(db) = save_to {
        let key = keys.into_iter().next();
        db.store().store(header.key_id(), factors, key);
        db.save()?;
        println!("Saved to {}", db.path().display());
    }
    Ok(())
}

/// `report.pdf.vvv` -> `pdf`
fn original_extension(file: &Path) -> Option<String> {
    let stem = PathBuf::from(file.file_stem()?);
    stem.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn list_keys(db: &KeyDatabase, pending_only: bool) {
    let records = db.store().records();
    let records: Vec<_> = records
        .iter()
        .filter(|r| !pending_only || r.is_pending())
        .collect();

    println!("{:<16} {:<20} {:>8} KEY", "NAME", "ID", "FACTORS");
    println!("{}", "-".repeat(110));
    for record in &records {
        let id = record.id.as_str();
        println!(
            "{:<16} {:<20} {:>8} {}",
            record.name.as_deref().unwrap_or("-"),
            id.get(..16).map(|s| format!("{s}...")).unwrap_or_else(|| id.to_string()),
            record.factors.len(),
            record
                .recovered_key
                .as_ref()
                .map(AesKey::to_hex)
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!("\n{} record(s) in {}", records.len(), db.path().display());
}
