//! Follow an in-memory journal while a writer thread appends to it.
//!
//! ```text
//! RUST_LOG=journal_reader=debug cargo run -p journal-reader --example tail
//! ```

use journal_reader::{Journal, MatchGroup, MemoryStore, OpenOptions, SeekTarget, WaitMode};
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info");

    let store = MemoryStore::new();
    let writer = store.clone();
    let producer = thread::spawn(move || {
        for i in 0..20 {
            let priority = if i % 5 == 0 { "3" } else { "6" };
            writer.append([
                ("MESSAGE", format!("tick {}", i)),
                ("PRIORITY", priority.to_string()),
                ("_SYSTEMD_UNIT", String::from("demo.service")),
            ]);
            thread::sleep(Duration::from_millis(50));
        }
    });

    let options = OpenOptions::new().with_auto_reopen(Some(8));
    let mut journal = Journal::open(store.journal(), options)?;
    journal.filter(&[MatchGroup::new().with_any("priority", [3, 6])])?;
    journal.seek(SeekTarget::Head)?;

    let mut seen = 0;
    while seen < 20 {
        while journal.move_next()? {
            let entry = journal.current_entry()?;
            info!(
                cursor = %journal.cursor()?,
                priority = entry.priority(),
                "{}",
                entry.message().unwrap_or_default()
            );
            seen += 1;
        }
        if journal.wait(Some(Duration::from_secs(1)), WaitMode::Select)?.is_none() {
            info!("no new entries");
        }
    }

    producer.join().map_err(|_| "writer thread panicked")?;
    info!(opens = store.open_count(), "done");
    Ok(())
}
