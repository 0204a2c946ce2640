use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use npc_dialogue::admin::{MemoryPlayerRecords, OfflineQuestEdit};
use npc_dialogue::config::{init_tracing, EngineConfig};
use npc_dialogue::services::{Inventory, MemoryInventory, MemoryStats, PlayerId, Services};
use npc_dialogue::slot::MemorySlotStore;
use npc_dialogue::time::{Clock, FixedClock, SystemClock};
use npc_dialogue::{QuestRegistry, Result, World};

const SEASONAL_QUEST: &str = "MeetSanta";

const HELP: &str = "\
Talk with `<npc>: <text>`, e.g. `Carmen: hi`.
Commands:
  /npcs                      list NPCs
  /quests                    list quests and whether you can start them
  /history <quest>           your travel log for a quest
  /slots                     your raw quest slots
  /give <qty> <item>         put items in your bag
  /level <n>                 set your level
  /wait <minutes>            advance the game clock
  /santa on|off              toggle the seasonal quest
  /admin <player> <edit>     edit an offline player's slots
  /quit";

/// In-memory collaborators, kept typed so console commands can poke them
struct Session {
    player: PlayerId,
    slots: Arc<MemorySlotStore>,
    inventory: Arc<MemoryInventory>,
    stats: Arc<MemoryStats>,
    clock: Arc<FixedClock>,
    records: MemoryPlayerRecords,
    data_dir: PathBuf,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("dialogue.toml"));
    let config = match EngineConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to read {:?}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    if let Err(e) = init_tracing(&config) {
        eprintln!("Logging disabled: {}", e);
    }

    if let Err(e) = run(config).await {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: EngineConfig) -> Result<()> {
    let session = Session {
        player: PlayerId::new("player"),
        slots: Arc::new(MemorySlotStore::new()),
        inventory: Arc::new(MemoryInventory::new(config.inventory_capacity)),
        stats: Arc::new(MemoryStats::new()),
        clock: Arc::new(FixedClock::new(SystemClock.now_minutes())),
        records: MemoryPlayerRecords::new(),
        data_dir: config.data_dir.clone(),
    };
    session.records.insert(PlayerId::new("bob"), Default::default());

    let services = Services::new(
        session.slots.clone(),
        session.inventory.clone(),
        session.stats.clone(),
        session.clock.clone(),
    );
    let mut world = World::new(services).with_default_reply(&config.default_reply);
    world.load_npcs(&config.npc_file())?;

    let registry = Arc::new(QuestRegistry::new(Arc::new(world), &config.data_dir));
    registry.load_all().await?;

    if config.hot_reload {
        let mut events = registry.start_file_watcher()?;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                info!("Hot-reload: {:?}", event);
            }
        });
    }

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(command) = line.strip_prefix('/') {
            if command == "quit" {
                break;
            }
            command_line(&registry, &session, command).await;
            continue;
        }

        let Some((npc, text)) = line.split_once(':') else {
            println!("Say something like `Carmen: hi`, or /help.");
            continue;
        };
        let npc = npc.trim();
        match registry.world().dispatch_text(npc, &session.player, text.trim()).await {
            Ok(outcome) => {
                for said in &outcome.lines {
                    println!("{}: {}", npc, said);
                }
            }
            Err(e) => println!("{}", e),
        }
    }
    Ok(())
}

async fn command_line(registry: &QuestRegistry, session: &Session, command: &str) {
    let (name, args) = command.split_once(' ').unwrap_or((command, ""));
    let args = args.trim();
    let player = &session.player;

    match name {
        "help" => println!("{}", HELP),
        "npcs" => {
            for npc in registry.world().npcs() {
                println!("{} ({})", npc.name(), npc.region().unwrap_or("nowhere"));
            }
        }
        "quests" => {
            for name in registry.names().await {
                let can_start = registry.can_start(&name, player).await.unwrap_or(false);
                let done = registry.is_completed(&name, player).await.unwrap_or(false);
                println!("{:<16} start: {:<5} done: {}", name, can_start, done);
            }
        }
        "history" => match registry.history(args, player).await {
            Ok(lines) if lines.is_empty() => println!("Nothing yet."),
            Ok(lines) => lines.iter().for_each(|l| println!("- {}", l)),
            Err(e) => println!("{}", e),
        },
        "slots" => {
            let mut slots: Vec<_> = session.slots.slots(player).into_iter().collect();
            slots.sort();
            for (slot, value) in slots {
                println!("{} = {}", slot, value);
            }
        }
        "give" => {
            let parsed = args
                .split_once(' ')
                .and_then(|(qty, item)| Some((qty.parse::<u32>().ok()?, item.trim())));
            match parsed {
                Some((qty, item)) => match session.inventory.equip(player, item, qty) {
                    Ok(()) => println!("You now carry {} {}.", session.inventory.count(player, item), item),
                    Err(e) => println!("{}", e),
                },
                None => println!("usage: /give <qty> <item>"),
            }
        }
        "level" => match args.parse() {
            Ok(level) => session.stats.set_level(player, level),
            Err(_) => println!("usage: /level <n>"),
        },
        "wait" => match args.parse() {
            Ok(minutes) => session.clock.advance(minutes),
            Err(_) => println!("usage: /wait <minutes>"),
        },
        "santa" => match args {
            "on" => {
                let path = session.data_dir.join("quests").join("meet_santa.toml");
                match registry.load_file(&path).await {
                    Ok(name) => println!("{} is active.", name),
                    Err(e) => println!("{}", e),
                }
            }
            "off" => {
                if registry.unload(SEASONAL_QUEST).await {
                    println!("{} is over.", SEASONAL_QUEST);
                } else {
                    println!("{} is not active.", SEASONAL_QUEST);
                }
            }
            _ => println!("usage: /santa on|off"),
        },
        "admin" => {
            match OfflineQuestEdit::parse(args).and_then(|edit| edit.apply(&session.records)) {
                Ok(report) => println!("{}", report),
                Err(e) => println!("{}", e),
            }
        }
        _ => println!("Unknown command /{}. Try /help.", name),
    }
}
