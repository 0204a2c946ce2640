//! Quest Registry
//!
//! Loads quest definitions into the world's NPCs and keeps track of what
//! each one registered, so a quest can be unloaded or hot-reloaded without
//! touching the rules of any other quest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::engine::{NpcId, Rule, World};
use crate::error::{DialogueError, Result};
use crate::script::EvaluationContext;
use crate::sentence::Sentence;
use crate::services::{PlayerId, PlayerStats};
use crate::slot::QuestSlotStore;
use super::definition::{QuestDefinition, QuestInfo, QuestSetup};
use super::scripted::ScriptedQuest;

/// A loaded quest and the NPCs it put rules on
pub struct RegisteredQuest {
    pub definition: Arc<dyn QuestDefinition>,
    pub info: QuestInfo,
    pub npcs: Vec<NpcId>,
    /// File the quest was read from, if any
    pub source: Option<PathBuf>,
}

/// What a file reload did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Loaded(String),
    /// The file is gone; these quests were unloaded
    Unloaded(Vec<String>),
    /// Not autoloaded and not currently loaded
    Skipped,
}

pub struct QuestRegistry {
    world: Arc<World>,
    quests: RwLock<HashMap<String, RegisteredQuest>>,
    /// Directory holding quest TOML files
    quest_dir: PathBuf,
}

impl QuestRegistry {
    pub fn new(world: Arc<World>, data_dir: &Path) -> Self {
        Self {
            world,
            quests: RwLock::new(HashMap::new()),
            quest_dir: data_dir.join("quests"),
        }
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn quest_dir(&self) -> &Path {
        &self.quest_dir
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Register a quest. A quest already loaded under the same name is
    /// replaced. Nothing changes when any of its NPCs is unknown.
    pub async fn load(&self, definition: Arc<dyn QuestDefinition>) -> Result<()> {
        self.register(definition, None).await.map(|_| ())
    }

    async fn register(
        &self,
        definition: Arc<dyn QuestDefinition>,
        source: Option<PathBuf>,
    ) -> Result<String> {
        let name = definition.name().to_string();
        let mut setup = QuestSetup::new(&name, definition.slot_name());
        definition.add_to_world(&mut setup)?;

        let mut batches: Vec<(NpcId, Vec<Rule>)> = Vec::new();
        for (npc_name, rule) in setup.into_rules() {
            let id = self
                .world
                .npc_id(&npc_name)
                .ok_or_else(|| DialogueError::NpcNotFound(npc_name.clone()))?;
            match batches.iter_mut().find(|(npc, _)| *npc == id) {
                Some((_, rules)) => rules.push(rule),
                None => batches.push((id, vec![rule])),
            }
        }

        let mut quests = self.quests.write().await;
        let stale = quests.remove(&name);
        if let Some(other) = quests
            .values()
            .find(|q| q.info.slot == definition.slot_name())
        {
            warn!("Quests '{}' and '{}' share slot '{}'", other.info.name, name, other.info.slot);
        }

        // each NPC swaps old rules for new in one step
        let mut npcs = Vec::with_capacity(batches.len());
        for (id, rules) in batches {
            if let Some(npc) = self.world.npc(id) {
                npc.replace_quest(&name, rules).await;
                npcs.push(id);
            }
        }
        if let Some(stale) = stale {
            let dropped: Vec<NpcId> = stale
                .npcs
                .into_iter()
                .filter(|id| !npcs.contains(id))
                .collect();
            self.detach(&name, &dropped).await;
        }

        let info = definition.info();
        info!("Loaded quest: {} ({}) on {} NPCs", info.title, name, npcs.len());
        quests.insert(
            name.clone(),
            RegisteredQuest {
                definition,
                info,
                npcs,
                source,
            },
        );
        Ok(name)
    }

    /// Remove a quest and all its rules. Returns false if it was not loaded.
    pub async fn unload(&self, name: &str) -> bool {
        let mut quests = self.quests.write().await;
        let Some(quest) = quests.remove(name) else {
            return false;
        };
        self.detach(name, &quest.npcs).await;
        info!("Unloaded quest: {}", name);
        true
    }

    async fn detach(&self, name: &str, npcs: &[NpcId]) {
        for id in npcs {
            if let Some(npc) = self.world.npc(*id) {
                let removed = npc.remove_quest(name).await;
                debug!("Removed {} rules of {} from {}", removed, name, npc.name());
            }
        }
    }

    /// Load one quest file, whether or not it is autoloaded
    pub async fn load_file(&self, path: &Path) -> Result<String> {
        let quest = ScriptedQuest::from_file(path)?;
        self.register(Arc::new(quest), Some(source_key(path))).await
    }

    /// Load every autoloaded quest under the quest directory.
    ///
    /// Files are loaded in sorted path order. Files that fail to parse or
    /// register are logged and skipped.
    pub async fn load_all(&self) -> Result<usize> {
        info!("Loading quests from {:?}", self.quest_dir);

        if !self.quest_dir.exists() {
            warn!("Quest directory does not exist: {:?}", self.quest_dir);
            return Ok(0);
        }

        let mut paths = Vec::new();
        collect_quest_files(&self.quest_dir, &mut paths)?;
        paths.sort();

        let mut count = 0;
        for path in paths {
            match ScriptedQuest::from_file(&path) {
                Ok(quest) if !quest.autoload() => {
                    debug!("Skipping {:?}, loaded on demand", path);
                }
                Ok(quest) => match self.register(Arc::new(quest), Some(source_key(&path))).await {
                    Ok(_) => count += 1,
                    Err(e) => warn!("Failed to register quest {:?}: {}", path, e),
                },
                Err(e) => warn!("Failed to load quest {:?}: {}", path, e),
            }
        }

        info!("Loaded {} quest definitions", count);
        Ok(count)
    }

    /// Bring the registry in line with a changed, created or deleted file
    pub async fn reload_file(&self, path: &Path) -> Result<ReloadOutcome> {
        let key = source_key(path);
        if !path.exists() {
            let mut unloaded = Vec::new();
            for name in self.names_from_source(&key).await {
                if self.unload(&name).await {
                    unloaded.push(name);
                }
            }
            return Ok(ReloadOutcome::Unloaded(unloaded));
        }

        let quest = ScriptedQuest::from_file(path)?;
        if !quest.autoload() && !self.is_loaded(quest.name()).await {
            return Ok(ReloadOutcome::Skipped);
        }
        let name = self.register(Arc::new(quest), Some(key.clone())).await?;

        // a renamed quest leaves its old registration behind
        for stale in self.names_from_source(&key).await {
            if stale != name {
                self.unload(&stale).await;
            }
        }
        Ok(ReloadOutcome::Loaded(name))
    }

    async fn names_from_source(&self, key: &Path) -> Vec<String> {
        self.quests
            .read()
            .await
            .values()
            .filter(|q| q.source.as_deref() == Some(key))
            .map(|q| q.info.name.clone())
            .collect()
    }

    /// Start a file watcher that reloads quest files as they change.
    /// Returns a channel receiver that reports each reload.
    pub fn start_file_watcher(self: &Arc<Self>) -> Result<mpsc::Receiver<HotReloadEvent>> {
        use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            DialogueError::Config(format!("hot reload needs a tokio runtime: {}", e))
        })?;
        let (tx, rx) = mpsc::channel(32);
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = notify_tx.send(event);
                }
                Err(e) => error!("File watcher error: {}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;
        watcher.watch(&self.quest_dir, RecursiveMode::Recursive)?;
        info!("Quest hot-reload watcher started for {:?}", self.quest_dir);

        let registry = Arc::clone(self);
        std::thread::spawn(move || {
            // dropping the watcher stops the notifications
            let _watcher = watcher;
            while let Ok(event) = notify_rx.recv() {
                if tx.is_closed() {
                    break;
                }
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    continue;
                }
                for path in event.paths.into_iter().filter(|p| is_quest_file(p)) {
                    info!("Detected change in {:?}, reloading", path);
                    let registry = Arc::clone(&registry);
                    let tx = tx.clone();
                    runtime.spawn(async move {
                        let event = match registry.reload_file(&path).await {
                            Ok(ReloadOutcome::Loaded(name)) => HotReloadEvent::Reloaded(name),
                            Ok(ReloadOutcome::Unloaded(names)) if !names.is_empty() => {
                                HotReloadEvent::Unloaded(names)
                            }
                            Ok(_) => return,
                            Err(e) => {
                                error!("Hot-reload of {:?} failed: {}", path, e);
                                HotReloadEvent::Error(format!("{}: {}", path.display(), e))
                            }
                        };
                        let _ = tx.send(event).await;
                    });
                }
            }
            debug!("Quest watcher thread exiting");
        });

        Ok(rx)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn info(&self, name: &str) -> Option<QuestInfo> {
        self.quests.read().await.get(name).map(|q| q.info.clone())
    }

    /// Names of all loaded quests, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.quests.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.quests.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.quests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.quests.read().await.is_empty()
    }

    pub async fn history(&self, name: &str, player: &PlayerId) -> Result<Vec<String>> {
        self.evaluate(name, player, |quest, ctx| quest.history(ctx)).await
    }

    pub async fn is_repeatable(&self, name: &str, player: &PlayerId) -> Result<bool> {
        self.evaluate(name, player, |quest, ctx| quest.is_repeatable(ctx)).await
    }

    pub async fn is_completed(&self, name: &str, player: &PlayerId) -> Result<bool> {
        self.evaluate(name, player, |quest, ctx| quest.is_completed(ctx)).await
    }

    /// Whether the player may take the quest now: high enough level, not
    /// already on it, and not finished unless it can be repeated
    pub async fn can_start(&self, name: &str, player: &PlayerId) -> Result<bool> {
        self.evaluate(name, player, |quest, ctx| {
            let services = ctx.services;
            if services.stats.level(ctx.player) < quest.min_level() {
                return false;
            }
            if services.slots.is_active(ctx.player, quest.slot_name()) {
                return false;
            }
            !quest.is_completed(ctx) || quest.is_repeatable(ctx)
        })
        .await
    }

    /// Quests with rules on the named NPC, sorted by name
    pub async fn quests_for_npc(&self, npc_name: &str) -> Vec<QuestInfo> {
        let Some(id) = self.world.npc_id(npc_name) else {
            return Vec::new();
        };
        self.collect_info(|q| q.npcs.contains(&id)).await
    }

    pub async fn quests_in_region(&self, region: &str) -> Vec<QuestInfo> {
        self.collect_info(|q| {
            q.info
                .region
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(region))
        })
        .await
    }

    /// Quests the player has touched but not completed
    pub async fn started_quests(&self, player: &PlayerId) -> Vec<String> {
        self.player_quests(player, |quest, ctx| {
            ctx.services.slots.has_quest(ctx.player, quest.slot_name()) && !quest.is_completed(ctx)
        })
        .await
    }

    pub async fn completed_quests(&self, player: &PlayerId) -> Vec<String> {
        self.player_quests(player, |quest, ctx| quest.is_completed(ctx)).await
    }

    async fn collect_info<F>(&self, mut keep: F) -> Vec<QuestInfo>
    where
        F: FnMut(&RegisteredQuest) -> bool,
    {
        let mut found: Vec<QuestInfo> = self
            .quests
            .read()
            .await
            .values()
            .filter(|q| keep(q))
            .map(|q| q.info.clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    async fn player_quests<F>(&self, player: &PlayerId, mut keep: F) -> Vec<String>
    where
        F: FnMut(&dyn QuestDefinition, &EvaluationContext<'_>) -> bool,
    {
        let quests = self.quests.read().await;
        let sentence = Sentence::empty();
        let mut names: Vec<String> = quests
            .values()
            .filter(|q| keep(q.definition.as_ref(), &self.context(q, player, &sentence)))
            .map(|q| q.info.name.clone())
            .collect();
        names.sort();
        names
    }

    async fn evaluate<T, F>(&self, name: &str, player: &PlayerId, f: F) -> Result<T>
    where
        F: FnOnce(&dyn QuestDefinition, &EvaluationContext<'_>) -> T,
    {
        let quests = self.quests.read().await;
        let quest = quests
            .get(name)
            .ok_or_else(|| DialogueError::QuestNotFound(name.to_string()))?;
        let sentence = Sentence::empty();
        Ok(f(quest.definition.as_ref(), &self.context(quest, player, &sentence)))
    }

    fn context<'a>(
        &'a self,
        quest: &'a RegisteredQuest,
        player: &'a PlayerId,
        sentence: &'a Sentence,
    ) -> EvaluationContext<'a> {
        let services = self.world.services();
        let ctx = EvaluationContext::new(player, sentence, services, self.world.extensions())
            .with_quest_slot(Some(quest.info.slot.as_str()));
        match quest.info.npc.as_deref() {
            Some(npc) => ctx.with_npc(npc),
            None => ctx,
        }
    }
}

/// Recursively collect quest files (non-async to avoid boxing)
fn collect_quest_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_quest_files(&path, paths)?;
        } else if is_quest_file(&path) {
            paths.push(path);
        }
    }
    Ok(())
}

fn is_quest_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

/// Stable key for a quest file, also for files that no longer exist
fn source_key(path: &Path) -> PathBuf {
    if let Ok(path) = path.canonicalize() {
        return path;
    }
    match (path.parent().and_then(|p| p.canonicalize().ok()), path.file_name()) {
        (Some(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

/// Events from the hot-reload watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotReloadEvent {
    /// A quest was (re)loaded from a changed file
    Reloaded(String),
    /// A quest file was deleted
    Unloaded(Vec<String>),
    /// An error occurred during reload
    Error(String),
}
