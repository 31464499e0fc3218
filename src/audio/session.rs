use anyhow::Result;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::audio::{
    error::PlaybackError,
    queue::QueueItem,
    transport::{AudioTransport, GuildEvent, TrackEndNotifier},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Idle,
    Playing,
    Paused,
}

/// Estado de voz de una guild. `channel_id == None` significa desconectado,
/// y en ese caso el estado siempre es `Idle`.
#[derive(Debug)]
pub struct VoiceSession {
    channel_id: Option<ChannelId>,
    state: PlayState,
    active_play: Option<u64>,
    current: Option<QueueItem>,
}

impl Default for VoiceSession {
    fn default() -> Self {
        Self {
            channel_id: None,
            state: PlayState::Idle,
            active_play: None,
            current: None,
        }
    }
}

impl VoiceSession {
    pub fn is_connected(&self) -> bool {
        self.channel_id.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlayState::Paused
    }

    pub fn is_idle(&self) -> bool {
        self.state == PlayState::Idle
    }

    pub fn current(&self) -> Option<&QueueItem> {
        self.current.as_ref()
    }
}

/// Resultado de `ensure_connected`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Existing(ChannelId),
    Established(ChannelId),
}

/// Registro de sesiones de voz. Cada guild tiene su propio `Mutex` async,
/// que es el dominio de exclusión para todo lo que toca su reproducción.
pub struct VoiceSessions {
    transport: Arc<dyn AudioTransport>,
    sessions: DashMap<GuildId, Arc<Mutex<VoiceSession>>>,
    play_ids: AtomicU64,
    events: flume::Sender<GuildEvent>,
}

impl VoiceSessions {
    pub fn new(transport: Arc<dyn AudioTransport>, events: flume::Sender<GuildEvent>) -> Self {
        Self {
            transport,
            sessions: DashMap::new(),
            play_ids: AtomicU64::new(0),
            events,
        }
    }

    /// Toma el lock de la guild
    pub async fn lock(&self, guild_id: GuildId) -> GuildVoice<'_> {
        let session = self
            .sessions
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(VoiceSession::default())))
            .clone();

        GuildVoice {
            guild_id,
            registry: self,
            session: session.lock_owned().await,
        }
    }

    pub async fn is_connected(&self, guild_id: GuildId) -> bool {
        self.lock(guild_id).await.is_connected()
    }

    pub async fn is_playing(&self, guild_id: GuildId) -> bool {
        self.lock(guild_id).await.is_playing()
    }

    pub async fn is_paused(&self, guild_id: GuildId) -> bool {
        self.lock(guild_id).await.is_paused()
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Option<QueueItem> {
        self.lock(guild_id).await.current().cloned()
    }

    /// Guilds con sesión registrada
    pub fn guilds(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }
}

/// Sesión de una guild con su lock tomado
pub struct GuildVoice<'a> {
    guild_id: GuildId,
    registry: &'a VoiceSessions,
    session: OwnedMutexGuard<VoiceSession>,
}

impl std::ops::Deref for GuildVoice<'_> {
    type Target = VoiceSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl GuildVoice<'_> {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Conecta a `requested` si no hay conexión. Nunca mueve una sesión
    /// existente a otro canal.
    pub async fn ensure_connected(
        &mut self,
        requested: Option<ChannelId>,
    ) -> Result<Connection, PlaybackError> {
        if let Some(channel_id) = self.session.channel_id {
            return Ok(Connection::Existing(channel_id));
        }

        let channel_id = requested.ok_or(PlaybackError::NotInChannel)?;

        info!("🔊 Conectando al canal {} en guild {}", channel_id, self.guild_id);
        self.registry
            .transport
            .connect(self.guild_id, channel_id)
            .await
            .map_err(|e| {
                error!("Error al conectar en guild {}: {:?}", self.guild_id, e);
                PlaybackError::ConnectionFailed(e.to_string())
            })?;

        *self.session = VoiceSession {
            channel_id: Some(channel_id),
            ..VoiceSession::default()
        };
        info!("✅ Conectado al canal {} en guild {}", channel_id, self.guild_id);
        Ok(Connection::Established(channel_id))
    }

    /// Empieza a reproducir `item`. `Ok(false)` si no hay conexión o si ya
    /// hay un track activo; `Err` si el transporte no pudo arrancarlo (el
    /// estado queda en `Idle`).
    pub async fn play(&mut self, item: QueueItem) -> Result<bool> {
        if !self.session.is_connected() {
            return Ok(false);
        }
        if !self.session.is_idle() {
            warn!("Ya hay un track activo en guild {}", self.guild_id);
            return Ok(false);
        }

        let play_id = self.registry.play_ids.fetch_add(1, Ordering::SeqCst) + 1;
        let notifier =
            TrackEndNotifier::new(self.guild_id, play_id, self.registry.events.clone());

        self.registry
            .transport
            .play(self.guild_id, &item.track, notifier)
            .await?;

        self.session.state = PlayState::Playing;
        self.session.active_play = Some(play_id);
        self.session.current = Some(item);
        Ok(true)
    }

    pub async fn pause(&mut self) -> Result<bool> {
        if !self.session.is_playing() {
            return Ok(false);
        }
        self.registry.transport.pause(self.guild_id).await?;
        self.session.state = PlayState::Paused;
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(true)
    }

    pub async fn resume(&mut self) -> Result<bool> {
        if !self.session.is_paused() {
            return Ok(false);
        }
        self.registry.transport.resume(self.guild_id).await?;
        self.session.state = PlayState::Playing;
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(true)
    }

    /// Detiene el track en curso. El estado pasa a `Idle` cuando llega su
    /// aviso de fin, igual que si hubiera terminado solo.
    pub async fn stop(&mut self) -> Result<bool> {
        if !self.session.is_playing() {
            return Ok(false);
        }
        self.registry.transport.stop(self.guild_id).await?;
        info!("⏹️ Track detenido en guild {}", self.guild_id);
        Ok(true)
    }

    /// Cierra la conexión. No hace nada si ya estaba desconectado.
    pub async fn disconnect(&mut self) {
        if !self.session.is_connected() {
            return;
        }

        // El estado se limpia antes de avisar al transporte para que el
        // fin de track que provoque la desconexión llegue obsoleto
        self.forget();

        if let Err(e) = self.registry.transport.disconnect(self.guild_id).await {
            error!("Error al desconectar en guild {}: {:?}", self.guild_id, e);
        }
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
    }

    /// Olvida la sesión sin tocar el transporte (desconexión externa)
    pub fn forget(&mut self) {
        *self.session = VoiceSession::default();
    }

    /// Procesa el fin de `play_id`. Devuelve `false` si el aviso es de una
    /// reproducción que ya no está activa.
    pub fn finish(&mut self, play_id: u64) -> bool {
        if self.session.active_play != Some(play_id) {
            debug!(
                "Fin de track obsoleto en guild {} (play {})",
                self.guild_id, play_id
            );
            return false;
        }

        self.session.state = PlayState::Idle;
        self.session.active_play = None;
        self.session.current = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::transport::fake::FakeTransport, sources::Track};

    fn item(title: &str) -> QueueItem {
        QueueItem::new(Track::new(title, format!("https://cdn/{}", title)).unwrap(), "tester")
    }

    fn setup() -> (VoiceSessions, Arc<FakeTransport>, flume::Receiver<GuildEvent>) {
        let transport = Arc::new(FakeTransport::default());
        let (tx, rx) = flume::unbounded();
        (VoiceSessions::new(transport.clone(), tx), transport, rx)
    }

    #[tokio::test]
    async fn test_ensure_connected_requires_channel() {
        let (sessions, transport, _rx) = setup();
        let guild = GuildId::new(1);

        let mut voice = sessions.lock(guild).await;
        assert_eq!(voice.ensure_connected(None).await, Err(PlaybackError::NotInChannel));

        transport.fail_connect.store(true, Ordering::SeqCst);
        assert!(matches!(
            voice.ensure_connected(Some(ChannelId::new(10))).await,
            Err(PlaybackError::ConnectionFailed(_))
        ));
        assert!(!voice.is_connected());
    }

    #[tokio::test]
    async fn test_existing_connection_is_never_moved() {
        let (sessions, transport, _rx) = setup();
        let guild = GuildId::new(1);

        let mut voice = sessions.lock(guild).await;
        assert_eq!(
            voice.ensure_connected(Some(ChannelId::new(10))).await,
            Ok(Connection::Established(ChannelId::new(10)))
        );
        assert_eq!(
            voice.ensure_connected(Some(ChannelId::new(20))).await,
            Ok(Connection::Existing(ChannelId::new(10)))
        );
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let (sessions, transport, rx) = setup();
        let guild = GuildId::new(1);

        let mut voice = sessions.lock(guild).await;
        assert!(!voice.play(item("a")).await.unwrap());
        assert!(!voice.pause().await.unwrap());

        voice.ensure_connected(Some(ChannelId::new(10))).await.unwrap();
        assert!(!voice.resume().await.unwrap());
        assert!(voice.play(item("a")).await.unwrap());
        assert!(voice.is_playing() && !voice.is_paused());

        assert!(voice.pause().await.unwrap());
        assert!(voice.is_paused() && !voice.is_playing());
        assert!(!voice.pause().await.unwrap());
        assert!(!voice.stop().await.unwrap());

        assert!(voice.resume().await.unwrap());
        assert!(voice.stop().await.unwrap());
        assert!(!transport.has_pending(guild));

        let GuildEvent::TrackEnded { play_id, .. } = rx.try_recv().unwrap() else {
            panic!("se esperaba TrackEnded");
        };
        assert!(voice.finish(play_id));
        assert!(voice.is_idle() && voice.is_connected());
        assert!(!voice.finish(play_id));
    }

    #[tokio::test]
    async fn test_disconnect_makes_pending_completion_stale() {
        let (sessions, transport, rx) = setup();
        let guild = GuildId::new(1);

        let mut voice = sessions.lock(guild).await;
        voice.ensure_connected(Some(ChannelId::new(10))).await.unwrap();
        voice.play(item("a")).await.unwrap();

        voice.disconnect().await;
        voice.disconnect().await;
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(!voice.is_connected() && voice.is_idle());

        let GuildEvent::TrackEnded { play_id, .. } = rx.try_recv().unwrap() else {
            panic!("se esperaba TrackEnded");
        };
        assert!(!voice.finish(play_id));
    }
}
