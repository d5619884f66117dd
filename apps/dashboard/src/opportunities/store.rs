//! Opportunity state store: per-record read/favorite/reject/undecided tracking.
//!
//! Transitions, per record id:
//! - first encounter: `unread += id`
//! - select:          `unread -= id`; `undecided` set iff neither favorited nor rejected
//! - favorite:        `favorited += id`, `undecided -= id`
//! - unfavorite:      `favorited -= id`; `undecided += id` unless rejected
//! - reject:          `rejected += id`, `undecided -= id`
//! - unreject:        `rejected -= id`; `undecided += id` unless favorited
//!
//! Nothing moves a record back to unread. Every mutation writes the affected
//! keys straight through to the [`KvStore`]; a failed write undoes the mutation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::documents::UploadedDocument;
use crate::opportunities::models::{ChatMessage, Counts, Flags, OpportunityState};
use crate::opportunities::storage::{KvStore, StateKey, StorageError};

pub struct OpportunityStore {
    kv: Arc<dyn KvStore>,
    favorites: BTreeSet<String>,
    rejected: BTreeSet<String>,
    unread: BTreeSet<String>,
    undecided: BTreeSet<String>,
    states: BTreeMap<String, OpportunityState>,
    favorite_chats: BTreeMap<String, Vec<ChatMessage>>,
}

impl OpportunityStore {
    /// Loads every key from `kv`. A missing or unreadable key starts empty.
    pub fn load(kv: Arc<dyn KvStore>) -> Result<Self, StorageError> {
        let store = Self {
            favorites: read_key(kv.as_ref(), StateKey::Favorites)?,
            rejected: read_key(kv.as_ref(), StateKey::RejectedItems)?,
            unread: read_key(kv.as_ref(), StateKey::UnreadItems)?,
            undecided: read_key(kv.as_ref(), StateKey::UndecidedItems)?,
            states: read_key(kv.as_ref(), StateKey::OpportunityStates)?,
            favorite_chats: read_key(kv.as_ref(), StateKey::FavoriteChats)?,
            kv,
        };
        info!(
            "Opportunity state loaded: {} tracked, {} favorites, {} rejected",
            store.states.len(),
            store.favorites.len(),
            store.rejected.len()
        );
        Ok(store)
    }

    pub fn flags(&self, id: &str) -> Flags {
        Flags {
            favorited: self.favorites.contains(id),
            rejected: self.rejected.contains(id),
            unread: self.unread.contains(id),
            undecided: self.undecided.contains(id),
        }
    }

    pub fn counts(&self) -> Counts {
        Counts {
            favorited: self.favorites.len(),
            rejected: self.rejected.len(),
            unread: self.unread.len(),
            undecided: self.undecided.len(),
        }
    }

    pub fn state(&self, id: &str) -> Option<&OpportunityState> {
        self.states.get(id)
    }

    /// Starts tracking ids seen for the first time: they become unread.
    /// Returns how many ids were new.
    pub fn register<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> Result<usize, StorageError> {
        let fresh: Vec<String> = ids
            .into_iter()
            .filter(|id| !self.states.contains_key(*id))
            .map(String::from)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }
        self.commit(&[StateKey::UnreadItems, StateKey::OpportunityStates], |s| {
            for id in &fresh {
                s.states.insert(id.clone(), OpportunityState::default());
                s.unread.insert(id.clone());
            }
        })?;
        Ok(fresh.len())
    }

    /// Drops every id that is no longer part of the sheet, from all sets and maps.
    pub fn reconcile(&mut self, current: &HashSet<&str>) -> Result<usize, StorageError> {
        let before = self.entry_count();
        let keep = |id: &String| current.contains(id.as_str());
        let stale = self.favorites.iter().any(|id| !keep(id))
            || self.rejected.iter().any(|id| !keep(id))
            || self.unread.iter().any(|id| !keep(id))
            || self.undecided.iter().any(|id| !keep(id))
            || self.states.keys().any(|id| !keep(id))
            || self.favorite_chats.keys().any(|id| !keep(id));
        if !stale {
            return Ok(0);
        }

        self.commit(&StateKey::ALL, |s| {
            s.favorites.retain(|id| current.contains(id.as_str()));
            s.rejected.retain(|id| current.contains(id.as_str()));
            s.unread.retain(|id| current.contains(id.as_str()));
            s.undecided.retain(|id| current.contains(id.as_str()));
            s.states.retain(|id, _| current.contains(id.as_str()));
            s.favorite_chats.retain(|id, _| current.contains(id.as_str()));
        })?;
        let pruned = before - self.entry_count();
        info!("Pruned {pruned} stale state entries");
        Ok(pruned)
    }

    /// Marks a record read and files it as undecided unless it is already judged.
    pub fn select(&mut self, id: &str) -> Result<(), StorageError> {
        let undecided = !self.favorites.contains(id) && !self.rejected.contains(id);
        debug!("Selected {id} (undecided: {undecided})");
        self.commit(
            &[
                StateKey::UnreadItems,
                StateKey::UndecidedItems,
                StateKey::OpportunityStates,
            ],
            |s| {
                s.unread.remove(id);
                s.states.entry(id.to_string()).or_default().read = true;
                s.set_undecided(id, undecided);
            },
        )
    }

    pub fn favorite(&mut self, id: &str) -> Result<(), StorageError> {
        self.commit(
            &[
                StateKey::Favorites,
                StateKey::UndecidedItems,
                StateKey::FavoriteChats,
                StateKey::OpportunityStates,
            ],
            |s| {
                s.favorites.insert(id.to_string());
                s.set_undecided(id, false);
                if let Some(chat) = s.states.get(id).and_then(|st| st.chat_history.clone()) {
                    s.favorite_chats.insert(id.to_string(), chat);
                }
            },
        )
    }

    pub fn unfavorite(&mut self, id: &str) -> Result<(), StorageError> {
        self.commit(
            &[
                StateKey::Favorites,
                StateKey::UndecidedItems,
                StateKey::FavoriteChats,
                StateKey::OpportunityStates,
            ],
            |s| {
                s.favorites.remove(id);
                s.favorite_chats.remove(id);
                if !s.rejected.contains(id) {
                    s.set_undecided(id, true);
                }
            },
        )
    }

    pub fn reject(&mut self, id: &str) -> Result<(), StorageError> {
        self.commit(
            &[
                StateKey::RejectedItems,
                StateKey::UndecidedItems,
                StateKey::OpportunityStates,
            ],
            |s| {
                s.rejected.insert(id.to_string());
                s.set_undecided(id, false);
            },
        )
    }

    pub fn unreject(&mut self, id: &str) -> Result<(), StorageError> {
        self.commit(
            &[
                StateKey::RejectedItems,
                StateKey::UndecidedItems,
                StateKey::OpportunityStates,
            ],
            |s| {
                s.rejected.remove(id);
                if !s.favorites.contains(id) {
                    s.set_undecided(id, true);
                }
            },
        )
    }

    /// Flips favorite membership and returns the new value.
    pub fn toggle_favorite(&mut self, id: &str) -> Result<bool, StorageError> {
        if self.favorites.contains(id) {
            self.unfavorite(id)?;
            Ok(false)
        } else {
            self.favorite(id)?;
            Ok(true)
        }
    }

    /// Flips reject membership and returns the new value.
    pub fn toggle_reject(&mut self, id: &str) -> Result<bool, StorageError> {
        if self.rejected.contains(id) {
            self.unreject(id)?;
            Ok(false)
        } else {
            self.reject(id)?;
            Ok(true)
        }
    }

    /// Saves a record's transcript and document list.
    pub fn save_session(
        &mut self,
        id: &str,
        transcript: &[ChatMessage],
        documents: &[UploadedDocument],
    ) -> Result<(), StorageError> {
        let keys: &[StateKey] = if self.favorites.contains(id) {
            &[StateKey::OpportunityStates, StateKey::FavoriteChats]
        } else {
            &[StateKey::OpportunityStates]
        };
        self.commit(keys, |s| {
            let state = s.states.entry(id.to_string()).or_default();
            state.chat_history = (!transcript.is_empty()).then(|| transcript.to_vec());
            state.documents = (!documents.is_empty()).then(|| documents.to_vec());
            if s.favorites.contains(id) && !transcript.is_empty() {
                s.favorite_chats.insert(id.to_string(), transcript.to_vec());
            }
        })
        .inspect_err(|e| warn!("Could not save session for {id}: {e}"))
    }

    pub fn favorite_chat(&self, id: &str) -> Option<&[ChatMessage]> {
        self.favorite_chats.get(id).map(Vec::as_slice)
    }

    fn set_undecided(&mut self, id: &str, undecided: bool) {
        if undecided {
            self.undecided.insert(id.to_string());
        } else {
            self.undecided.remove(id);
        }
        if let Some(state) = self.states.get_mut(id) {
            state.undecided = undecided;
        }
    }

    fn entry_count(&self) -> usize {
        self.states.len()
            + self.favorites.len()
            + self.rejected.len()
            + self.unread.len()
            + self.undecided.len()
            + self.favorite_chats.len()
    }

    /// Applies `change` and writes `keys` through. If any write fails, memory is
    /// restored from a snapshot of `keys` and the restored values are written
    /// back, so memory and storage agree with the state before the call.
    fn commit(&mut self, keys: &[StateKey], change: impl FnOnce(&mut Self)) -> Result<(), StorageError> {
        let snapshot = Snapshot::take(self, keys);
        change(self);
        match self.persist(keys) {
            Ok(()) => Ok(()),
            Err(e) => {
                snapshot.restore(self);
                if let Err(undo) = self.persist(keys) {
                    warn!("Could not restore persisted state after failed write: {undo}");
                }
                Err(e)
            }
        }
    }

    fn persist(&self, keys: &[StateKey]) -> Result<(), StorageError> {
        for key in keys {
            let value = match key {
                StateKey::Favorites => serde_json::to_string(&self.favorites)?,
                StateKey::RejectedItems => serde_json::to_string(&self.rejected)?,
                StateKey::UnreadItems => serde_json::to_string(&self.unread)?,
                StateKey::UndecidedItems => serde_json::to_string(&self.undecided)?,
                StateKey::OpportunityStates => serde_json::to_string(&self.states)?,
                StateKey::FavoriteChats => serde_json::to_string(&self.favorite_chats)?,
            };
            self.kv.set(key.as_str(), value)?;
        }
        Ok(())
    }
}

/// Copies of the in-memory values behind a set of keys.
#[derive(Default)]
struct Snapshot {
    favorites: Option<BTreeSet<String>>,
    rejected: Option<BTreeSet<String>>,
    unread: Option<BTreeSet<String>>,
    undecided: Option<BTreeSet<String>>,
    states: Option<BTreeMap<String, OpportunityState>>,
    favorite_chats: Option<BTreeMap<String, Vec<ChatMessage>>>,
}

impl Snapshot {
    fn take(store: &OpportunityStore, keys: &[StateKey]) -> Self {
        let mut snapshot = Snapshot::default();
        for key in keys {
            match key {
                StateKey::Favorites => snapshot.favorites = Some(store.favorites.clone()),
                StateKey::RejectedItems => snapshot.rejected = Some(store.rejected.clone()),
                StateKey::UnreadItems => snapshot.unread = Some(store.unread.clone()),
                StateKey::UndecidedItems => snapshot.undecided = Some(store.undecided.clone()),
                StateKey::OpportunityStates => snapshot.states = Some(store.states.clone()),
                StateKey::FavoriteChats => snapshot.favorite_chats = Some(store.favorite_chats.clone()),
            }
        }
        snapshot
    }

    fn restore(self, store: &mut OpportunityStore) {
        if let Some(v) = self.favorites {
            store.favorites = v;
        }
        if let Some(v) = self.rejected {
            store.rejected = v;
        }
        if let Some(v) = self.unread {
            store.unread = v;
        }
        if let Some(v) = self.undecided {
            store.undecided = v;
        }
        if let Some(v) = self.states {
            store.states = v;
        }
        if let Some(v) = self.favorite_chats {
            store.favorite_chats = v;
        }
    }
}

fn read_key<T: DeserializeOwned + Default>(
    kv: &dyn KvStore,
    key: StateKey,
) -> Result<T, StorageError> {
    let Some(raw) = kv.get(key.as_str())? else {
        return Ok(T::default());
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("Ignoring unreadable '{}': {e}", key.as_str());
            Ok(T::default())
        }
    }
}
