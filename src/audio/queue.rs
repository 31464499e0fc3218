use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serenity::model::id::GuildId;
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, info};

use crate::{audio::error::PlaybackError, sources::Track};

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub track: Track,
    pub requested_by: String,
    pub added_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(track: Track, requested_by: impl Into<String>) -> Self {
        Self {
            track,
            requested_by: requested_by.into(),
            added_at: Utc::now(),
        }
    }
}

/// Cola ordenada de una guild
#[derive(Debug, Default)]
pub struct GuildQueue {
    items: VecDeque<QueueItem>,
}

impl GuildQueue {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }
}

/// Colas de todas las guilds. Cada cola tiene su propio lock; nunca se
/// bloquea más de una guild a la vez.
pub struct QueueStore {
    queues: DashMap<GuildId, Arc<Mutex<GuildQueue>>>,
    max_size: usize,
}

impl QueueStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            queues: DashMap::new(),
            max_size,
        }
    }

    /// Obtiene la cola de la guild, creándola vacía la primera vez
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<Mutex<GuildQueue>> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("Creando cola para guild {}", guild_id);
                Arc::new(Mutex::new(GuildQueue::default()))
            })
            .clone()
    }

    /// Agrega al final; devuelve la posición (largo de la cola tras insertar)
    pub fn enqueue(&self, guild_id: GuildId, item: QueueItem) -> Result<usize, PlaybackError> {
        let queue = self.get_or_create(guild_id);
        let mut q = queue.lock();

        if q.items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola de guild {}: {}", guild_id, item.track.title());
        q.items.push_back(item);
        Ok(q.items.len())
    }

    /// Agrega un lote conservando el orden. Si no cabe entero se trunca al
    /// espacio disponible; devuelve cuántos se agregaron.
    pub fn enqueue_all(
        &self,
        guild_id: GuildId,
        items: Vec<QueueItem>,
    ) -> Result<usize, PlaybackError> {
        let queue = self.get_or_create(guild_id);
        let mut q = queue.lock();

        let available = self.max_size.saturating_sub(q.items.len());
        if available == 0 && !items.is_empty() {
            return Err(PlaybackError::QueueFull(self.max_size));
        }

        let to_add = items.len().min(available);
        q.items.extend(items.into_iter().take(to_add));

        info!("➕ Agregadas {} canciones a la cola de guild {}", to_add, guild_id);
        Ok(to_add)
    }

    /// Saca el primer track (FIFO)
    pub fn dequeue_front(&self, guild_id: GuildId) -> Option<QueueItem> {
        let queue = self.get_or_create(guild_id);
        let next = queue.lock().items.pop_front();
        if next.is_none() {
            debug!("📭 Cola vacía en guild {}", guild_id);
        }
        next
    }

    /// Vacía la cola; devuelve cuántos tracks se quitaron
    pub fn clear(&self, guild_id: GuildId) -> usize {
        let Some(queue) = self.queues.get(&guild_id).map(|q| q.clone()) else {
            return 0;
        };

        let mut q = queue.lock();
        let cleared = q.items.len();
        q.items.clear();
        if cleared > 0 {
            info!("🗑️ Cola de guild {} limpiada: {} tracks", guild_id, cleared);
        }
        cleared
    }

    /// Mezcla uniformemente (Fisher–Yates). `false` si hay menos de 2 tracks.
    pub fn shuffle(&self, guild_id: GuildId) -> bool {
        let queue = self.get_or_create(guild_id);
        let mut q = queue.lock();

        if q.items.len() < 2 {
            return false;
        }

        q.items.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola de guild {} mezclada ({} tracks)", guild_id, q.items.len());
        true
    }

    pub fn size(&self, guild_id: GuildId) -> usize {
        self.queues
            .get(&guild_id)
            .map(|queue| queue.lock().len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, guild_id: GuildId) -> bool {
        self.size(guild_id) == 0
    }

    /// Copia del contenido actual, para mostrar
    pub fn snapshot(&self, guild_id: GuildId) -> Vec<QueueItem> {
        self.queues
            .get(&guild_id)
            .map(|queue| queue.lock().iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(title: &str) -> QueueItem {
        QueueItem::new(
            Track::new(title, format!("https://cdn/{}", title)).unwrap(),
            "tester",
        )
    }

    fn titles(items: &[QueueItem]) -> Vec<String> {
        items.iter().map(|i| i.track.title().to_string()).collect()
    }

    #[test]
    fn test_fifo_order() {
        let store = QueueStore::new(100);
        let guild = GuildId::new(1);

        for (i, title) in ["a", "b", "c", "d"].iter().enumerate() {
            assert_eq!(store.enqueue(guild, item(title)).unwrap(), i + 1);
        }

        let mut drained = Vec::new();
        while let Some(next) = store.dequeue_front(guild) {
            drained.push(next.track.title().to_string());
        }
        assert_eq!(drained, vec!["a", "b", "c", "d"]);
        assert!(store.is_empty(guild));
    }

    #[test]
    fn test_shuffle_preserves_tracks() {
        let store = QueueStore::new(100);
        let guild = GuildId::new(1);
        let titles_in: Vec<String> = (0..20).map(|i| format!("t{}", i)).collect();
        for title in &titles_in {
            store.enqueue(guild, item(title)).unwrap();
        }

        assert!(store.shuffle(guild));

        let mut after = titles(&store.snapshot(guild));
        after.sort();
        let mut expected = titles_in.clone();
        expected.sort();
        assert_eq!(after, expected);
    }

    #[test]
    fn test_shuffle_needs_two_tracks() {
        let store = QueueStore::new(100);
        let guild = GuildId::new(1);
        assert!(!store.shuffle(guild));

        store.enqueue(guild, item("solo")).unwrap();
        assert!(!store.shuffle(guild));
        assert_eq!(titles(&store.snapshot(guild)), vec!["solo"]);
    }

    #[test]
    fn test_shuffle_reaches_every_permutation() {
        let store = QueueStore::new(100);
        let guild = GuildId::new(1);
        for title in ["a", "b", "c"] {
            store.enqueue(guild, item(title)).unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..600 {
            store.shuffle(guild);
            seen.insert(titles(&store.snapshot(guild)).join(""));
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_clear_is_idempotent_and_per_guild() {
        let store = QueueStore::new(100);
        let a = GuildId::new(1);
        let b = GuildId::new(2);
        store.enqueue(a, item("x")).unwrap();
        store.enqueue(b, item("y")).unwrap();

        assert_eq!(store.clear(a), 1);
        assert_eq!(store.clear(a), 0);
        assert_eq!(store.clear(GuildId::new(3)), 0);
        assert_eq!(store.size(b), 1);
    }

    #[test]
    fn test_capacity_limits() {
        let store = QueueStore::new(3);
        let guild = GuildId::new(1);
        store.enqueue(guild, item("a")).unwrap();

        let added = store
            .enqueue_all(guild, vec![item("b"), item("c"), item("d")])
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(titles(&store.snapshot(guild)), vec!["a", "b", "c"]);

        assert_eq!(
            store.enqueue(guild, item("e")),
            Err(PlaybackError::QueueFull(3))
        );
        assert_eq!(
            store.enqueue_all(guild, vec![item("f")]),
            Err(PlaybackError::QueueFull(3))
        );
    }
}
