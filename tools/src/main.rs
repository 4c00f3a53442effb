//! save-runner: headless driver for the questlog save store.
//!
//! Usage:
//!   save-runner --dir ./run demo --seed 12345 --slot quick
//!   save-runner --dir ./run list
//!   save-runner --dir ./run show --slot quick
//!   save-runner --dir ./run delete --slot quick
//!   save-runner --dir ./run --ipc-mode
//!
//! `--config store.json` overrides the default store layout under `--dir`.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use questlog_core::{
    demo::DemoSession,
    store::{LoadedSession, SaveStore, SlotInfo},
    PersistError, StoreConfig,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    List,
    Load { slot: String },
    Delete { slot: String },
    Demo {
        #[serde(default = "default_seed")]
        seed: u64,
        slot: String,
    },
    Quit,
}

fn default_seed() -> u64 {
    42
}

#[derive(serde::Serialize)]
struct SessionSummary {
    slot:           String,
    name:           String,
    created_at:     String,
    schema_version: String,
    migrated_from:  Option<String>,
    frames:         Vec<&'static str>,
    entities:       usize,
    player:         Option<String>,
    issues:         Vec<String>,
}

impl SessionSummary {
    fn new(slot: &str, session: &LoadedSession) -> Self {
        let migrated_from = session
            .report
            .migration
            .as_ref()
            .filter(|m| !m.is_noop())
            .map(|m| m.original_version.clone());
        Self {
            slot:           slot.to_string(),
            name:           session.metadata.name.clone(),
            created_at:     timestamp(session.metadata.created_at),
            schema_version: session.metadata.schema_version.clone(),
            migrated_from,
            frames:         session.stack.tags(),
            entities:       session.world.entities.len(),
            player:         session.world.player().map(|p| p.name.clone()),
            issues:         session.report.issues.iter().map(ToString::to_string).collect(),
        }
    }
}

const COMMANDS: &[&str] = &["demo", "list", "show", "delete"];

/// Flags followed by a value, which is never read as a command.
const VALUE_FLAGS: &[&str] = &["--dir", "--config", "--slot", "--seed"];

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let dir = flag_value(&args, "--dir").unwrap_or("./questlog");
    let config = match flag_value(&args, "--config") {
        Some(path) => {
            StoreConfig::load(path).with_context(|| format!("loading store config {path}"))?
        }
        None => StoreConfig::under(dir),
    };
    let mut store = SaveStore::open(config);

    if args.iter().any(|a| a == "--ipc-mode") {
        return run_ipc_loop(&mut store);
    }

    let command = command_word(&args).unwrap_or("list");
    let slot = flag_value(&args, "--slot");

    match command {
        "demo" => {
            let seed = parse_arg(&args, "--seed", 42u64);
            let slot = slot.unwrap_or("demo");
            let demo = DemoSession::generate(seed);
            let report = store.save(slot, &demo.stack, &demo.world).map_err(surface)?;
            println!("=== SAVED ===");
            println!("  slot:     {slot}");
            println!("  seed:     {seed}");
            println!("  path:     {}", report.path.display());
            println!("  bytes:    {}", report.bytes);
            if let Some(backup) = &report.backup {
                println!("  backup:   {}", backup.display());
            }
            for dropped in &report.dropped_fields {
                println!("  dropped:  {}.{} ({})", dropped.owner, dropped.field, dropped.error);
            }
        }
        "list" => {
            let slots = store.list_slots().map_err(surface)?;
            print_slots(&slots);
        }
        "show" => {
            let slot = slot.context("show needs --slot")?;
            let session = store.load(slot).map_err(surface)?;
            print_session(&SessionSummary::new(slot, &session));
            let backups = store.list_backups(slot).map_err(surface)?;
            println!("  backups:  {}", backups.len());
        }
        "delete" => {
            let slot = slot.context("delete needs --slot")?;
            store.delete(slot).map_err(surface)?;
            println!("Deleted '{slot}'.");
        }
        other => log::warn!("Unknown command: {other}"),
    }
    Ok(())
}

fn run_ipc_loop(store: &mut SaveStore) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{err_json}")?;
                stdout.flush()?;
                continue;
            }
        };

        let response = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::List => store
                .list_slots()
                .map(|slots| serde_json::json!({ "slots": slots })),
            IpcCommand::Load { slot } => store
                .load(&slot)
                .map(|session| serde_json::json!({ "session": SessionSummary::new(&slot, &session) })),
            IpcCommand::Delete { slot } => store
                .delete(&slot)
                .map(|()| serde_json::json!({ "deleted": slot })),
            IpcCommand::Demo { seed, slot } => {
                let demo = DemoSession::generate(seed);
                store.save(&slot, &demo.stack, &demo.world).map(|report| {
                    serde_json::json!({
                        "saved":          slot,
                        "bytes":          report.bytes,
                        "dropped_fields": report.dropped_fields.len(),
                    })
                })
            }
        };

        let line = response.unwrap_or_else(|e| {
            serde_json::json!({ "error": e.user_message(), "detail": e.to_string() })
        });
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn print_slots(slots: &[SlotInfo]) {
    println!("=== SAVE SLOTS ({}) ===", slots.len());
    for info in slots {
        let created = info.created_at.map_or_else(|| "unknown".to_string(), timestamp);
        let status = if info.compatible { "" } else { "  [incompatible]" };
        println!(
            "  {:<20} {:<8} {}{}",
            info.slot, info.schema_version, created, status
        );
    }
}

fn print_session(summary: &SessionSummary) {
    println!("=== {} ===", summary.slot);
    println!("  name:     {}", summary.name);
    println!("  created:  {}", summary.created_at);
    println!("  version:  {}", summary.schema_version);
    if let Some(from) = &summary.migrated_from {
        println!("  migrated: from {from}");
    }
    println!("  frames:   {}", summary.frames.join(" > "));
    println!("  entities: {}", summary.entities);
    println!("  player:   {}", summary.player.as_deref().unwrap_or("(none)"));
    for issue in &summary.issues {
        println!("  issue:    {issue}");
    }
}

/// Print the player-facing message; keep the full error for the exit status.
fn surface(e: PersistError) -> anyhow::Error {
    eprintln!("{}", e.user_message());
    anyhow::Error::new(e)
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn command_word(args: &[String]) -> Option<&str> {
    let mut rest = args.iter().skip(1).map(String::as_str);
    while let Some(arg) = rest.next() {
        if VALUE_FLAGS.contains(&arg) {
            rest.next();
        } else if COMMANDS.contains(&arg) {
            return Some(arg);
        }
    }
    None
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
