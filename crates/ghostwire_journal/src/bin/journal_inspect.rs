//! # Journal Inspector
//!
//! Replays a recorded client journal and lists every entry with its bit
//! offset, then the journaled blocks.

use std::process::ExitCode;

use ghostwire_journal::{BlockDirection, ClientJournal, JournalError};
use ghostwire_networking::SessionConfig;

fn main() -> ExitCode {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         GHOSTWIRE JOURNAL INSPECTOR                              ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1) else {
        println!("Usage: journal_inspect <file.journal> [--quiet]");
        return ExitCode::FAILURE;
    };
    let quiet = args.iter().any(|a| a == "--quiet");

    let mut client = ClientJournal::new(SessionConfig::default());
    if let Err(err) = client.journal_mut().load(path) {
        println!("Error: could not load journal: {err}");
        return ExitCode::FAILURE;
    }

    let declared = client.journal().declared_bits();
    println!("┌─ HEADER ─────────────────────────────────────────────────────────┐");
    println!("│ File:               {path}");
    println!("│ Declared bits:      {declared} ({} bytes)", (declared + 7) / 8);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let mut entries = 0usize;
    let failure = loop {
        match client.play_next() {
            Ok(Some(entry)) => {
                entries += 1;
                if !quiet {
                    println!("  {:>8}  {:<18} {} bits", entry.start_bit, entry.name, entry.end_bit - entry.start_bit);
                }
            }
            Ok(None) => break None,
            Err(err) => break Some(err),
        }
    };

    let journal = client.journal();
    let blocks = journal.block_spans();
    if !quiet && !blocks.is_empty() {
        println!();
        println!("Blocks:");
        for span in blocks {
            let direction = match span.direction {
                BlockDirection::Write => "write",
                BlockDirection::Read => "read",
            };
            println!(
                "  {:>8}  {:<18} {} {} bits",
                span.start_bit,
                journal.block_name(span.id).unwrap_or("?"),
                direction,
                span.end_bit - span.start_bit
            );
        }
    }

    let session = client.client().session();
    println!();
    println!("┌─ REPLAY ─────────────────────────────────────────────────────────┐");
    println!("│ Entries:            {entries}");
    println!("│ Last entry:         {}", journal.last_entry_name().unwrap_or("-"));
    println!("│ Objects:            {}", session.world().len());
    println!("│ Corrections:        {}", session.control().correction_count());
    println!("│ Packet errors:      {}", client.client().packet_errors());
    println!("└──────────────────────────────────────────────────────────────────┘");

    match failure {
        None => {
            println!("✓ Journal replayed to its declared end");
            ExitCode::SUCCESS
        }
        Some(err @ JournalError::Truncated { .. }) => {
            println!("✗ Journal is corrupt: {err}");
            ExitCode::FAILURE
        }
        Some(err) => {
            println!("✗ Replay stopped: {err}");
            ExitCode::FAILURE
        }
    }
}
