use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        error::PlaybackError,
        inactivity::{InactivityTimer, DEFAULT_INACTIVITY_TIMEOUT},
        queue::{QueueItem, QueueStore},
        session::{Connection, GuildVoice, VoiceSessions},
        transport::{AudioTransport, GuildEvent},
    },
    config::Config,
    sources::{is_playlist_query, is_url, pack, PackFilter, Track, TrackResolver},
};

/// Parámetros del orquestador
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub inactivity_timeout: Duration,
    pub max_queue_size: usize,
    pub playlist_limit: usize,
    pub pack_filter: PackFilter,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            max_queue_size: 1000,
            playlist_limit: 10,
            pack_filter: PackFilter::default(),
        }
    }
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            inactivity_timeout: config.inactivity_timeout,
            max_queue_size: config.max_queue_size,
            playlist_limit: config.playlist_limit,
            pack_filter: PackFilter::new(
                config.pack_max_duration,
                config.pack_blocked_keywords.iter().cloned(),
            ),
        }
    }
}

/// Avisos para la capa de presentación
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackNotice {
    NowPlaying { guild_id: GuildId, item: QueueItem },
    QueueDrained { guild_id: GuildId },
    IdleDisconnect { guild_id: GuildId },
    TrackFailed { guild_id: GuildId, title: String, reason: String },
}

/// Resultado de una petición de reproducción
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Track {
        item: QueueItem,
        position: usize,
        started: bool,
    },
    Batch {
        count: usize,
        started: bool,
    },
}

/// Canales que el orquestador entrega a quien lo crea
pub struct OrchestratorChannels {
    pub events: flume::Receiver<GuildEvent>,
    pub notices: flume::Receiver<PlaybackNotice>,
}

/// Orquestador de reproducción: une cola, sesión de voz y temporizador de
/// inactividad de cada guild.
///
/// Los comandos, los avisos de fin de track y los vencimientos del
/// temporizador se serializan con el lock de la guild en [`VoiceSessions`];
/// guilds distintas nunca comparten lock.
pub struct PlaybackOrchestrator {
    queues: QueueStore,
    sessions: VoiceSessions,
    inactivity: InactivityTimer,
    resolver: Arc<dyn TrackResolver>,
    notices: flume::Sender<PlaybackNotice>,
    playlist_limit: usize,
    pack_filter: PackFilter,
}

impl PlaybackOrchestrator {
    pub fn new(
        transport: Arc<dyn AudioTransport>,
        resolver: Arc<dyn TrackResolver>,
        settings: PlayerSettings,
    ) -> (Arc<Self>, OrchestratorChannels) {
        let (events_tx, events_rx) = flume::unbounded();
        let (notices_tx, notices_rx) = flume::unbounded();

        let orchestrator = Arc::new(Self {
            queues: QueueStore::new(settings.max_queue_size),
            sessions: VoiceSessions::new(transport, events_tx.clone()),
            inactivity: InactivityTimer::new(settings.inactivity_timeout, events_tx),
            resolver,
            notices: notices_tx,
            playlist_limit: settings.playlist_limit,
            pack_filter: settings.pack_filter,
        });

        (
            orchestrator,
            OrchestratorChannels {
                events: events_rx,
                notices: notices_rx,
            },
        )
    }

    /// Lanza el bucle que consume los eventos asíncronos. Cada evento se
    /// procesa en su propia tarea para que una guild lenta no frene al resto.
    pub fn spawn_event_loop(self: &Arc<Self>, events: flume::Receiver<GuildEvent>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                debug!("Evento {:?} para guild {}", event, event.guild_id());
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    orchestrator.handle_event(event).await;
                });
            }
            debug!("Bucle de eventos de reproducción terminado");
        })
    }

    pub async fn handle_event(&self, event: GuildEvent) {
        match event {
            GuildEvent::TrackEnded { guild_id, play_id } => {
                let mut voice = self.sessions.lock(guild_id).await;
                if voice.finish(play_id) {
                    debug!("🎵 Track terminado en guild {}", guild_id);
                    self.advance_locked(&mut voice).await;
                }
            }
            GuildEvent::InactivityExpired {
                guild_id,
                generation,
            } => {
                let mut voice = self.sessions.lock(guild_id).await;
                if !self.inactivity.claim(guild_id, generation) {
                    debug!("Vencimiento de inactividad obsoleto en guild {}", guild_id);
                    return;
                }
                if !voice.is_connected() || voice.is_playing() {
                    debug!("Inactividad ignorada en guild {}", guild_id);
                    return;
                }

                info!("💤 Desconectando por inactividad en guild {}", guild_id);
                voice.disconnect().await;
                self.queues.clear(guild_id);
                self.notify(PlaybackNotice::IdleDisconnect { guild_id });
            }
        }
    }

    /// Conecta al canal pedido si no hay sesión. Una conexión nueva arma el
    /// temporizador de inactividad.
    pub async fn ensure_connected(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
    ) -> Result<(), PlaybackError> {
        let mut voice = self.sessions.lock(guild_id).await;
        match voice.ensure_connected(channel_id).await? {
            Connection::Established(channel) => {
                debug!(
                    "Desconexión de {} por inactividad en {} si no suena nada",
                    channel,
                    humantime::format_duration(self.inactivity.timeout())
                );
                self.inactivity.reset(guild_id);
            }
            Connection::Existing(channel) => {
                debug!("Guild {} ya conectada a {}", guild_id, channel);
            }
        }
        Ok(())
    }

    /// Agrega un track. La posición cuenta el track que suena ahora, así que
    /// `1` significa "es el siguiente en sonar" solo si no hay nada activo.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        track: Track,
        requester: &str,
    ) -> Result<usize, PlaybackError> {
        let active = usize::from(!self.sessions.lock(guild_id).await.is_idle());
        let queued = self.queues.enqueue(guild_id, QueueItem::new(track, requester))?;
        Ok(queued + active)
    }

    /// Agrega un lote en orden, pensado para un único `advance` posterior
    pub fn bulk_enqueue(
        &self,
        guild_id: GuildId,
        tracks: Vec<Track>,
        requester: &str,
    ) -> Result<usize, PlaybackError> {
        let items = tracks
            .into_iter()
            .map(|track| QueueItem::new(track, requester))
            .collect();
        self.queues.enqueue_all(guild_id, items)
    }

    /// Saca el siguiente track y lo reproduce; si la cola está vacía arma el
    /// temporizador de inactividad.
    pub async fn advance(&self, guild_id: GuildId) {
        let mut voice = self.sessions.lock(guild_id).await;
        self.advance_locked(&mut voice).await;
    }

    async fn advance_locked(&self, voice: &mut GuildVoice<'_>) {
        let guild_id = voice.guild_id();

        loop {
            if !voice.is_idle() {
                debug!("Guild {} ya está reproduciendo, no se avanza", guild_id);
                return;
            }

            let Some(item) = self.queues.dequeue_front(guild_id) else {
                debug!("Cola vacía en guild {}, iniciando temporizador de inactividad", guild_id);
                self.inactivity.reset(guild_id);
                self.notify(PlaybackNotice::QueueDrained { guild_id });
                return;
            };

            if !voice.is_connected() {
                warn!(
                    "🔌 Sin conexión en guild {}, se descarta: {}",
                    guild_id,
                    item.track.title()
                );
                self.notify(PlaybackNotice::TrackFailed {
                    guild_id,
                    title: item.track.title().to_string(),
                    reason: "el bot no está conectado a un canal de voz".to_string(),
                });
                return;
            }

            match voice.play(item.clone()).await {
                Ok(true) => {
                    self.inactivity.cancel(guild_id);
                    info!("🎵 Reproduciendo en guild {}: {}", guild_id, item.track.title());
                    self.notify(PlaybackNotice::NowPlaying { guild_id, item });
                    return;
                }
                Ok(false) => {
                    warn!("No se pudo iniciar {} en guild {}", item.track.title(), guild_id);
                    return;
                }
                Err(e) => {
                    // Un track roto no detiene la cola: se pasa al siguiente
                    error!(
                        "❌ Error al reproducir {} en guild {}: {:?}",
                        item.track.title(),
                        guild_id,
                        e
                    );
                    self.notify(PlaybackNotice::TrackFailed {
                        guild_id,
                        title: item.track.title().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Avanza solo si no hay nada sonando ni pausado. Devuelve si avanzó.
    async fn start_if_idle(&self, guild_id: GuildId) -> bool {
        let mut voice = self.sessions.lock(guild_id).await;
        if !voice.is_idle() {
            return false;
        }
        self.advance_locked(&mut voice).await;
        true
    }

    /// Flujo completo de `/play`: conectar, resolver, encolar y arrancar si
    /// estaba en silencio.
    pub async fn request(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        query: &str,
        requester: &str,
    ) -> Result<PlayOutcome, PlaybackError> {
        self.ensure_connected(guild_id, channel_id).await?;

        if is_url(query) && is_playlist_query(query) {
            info!("📋 Procesando playlist en guild {}", guild_id);
            let tracks = self
                .resolver
                .playlist(query, self.playlist_limit)
                .await
                .map_err(|e| PlaybackError::TrackResolutionFailed(e.to_string()))?;
            if tracks.is_empty() {
                return Err(PlaybackError::TrackResolutionFailed(
                    "la playlist no tiene canciones disponibles".to_string(),
                ));
            }

            let count = self.bulk_enqueue(guild_id, tracks, requester)?;
            let started = self.start_if_idle(guild_id).await;
            return Ok(PlayOutcome::Batch { count, started });
        }

        let track = self
            .resolver
            .resolve(query)
            .await
            .map_err(|e| PlaybackError::TrackResolutionFailed(e.to_string()))?;
        let item = QueueItem::new(track.clone(), requester);
        let position = self.enqueue(guild_id, track, requester).await?;
        let started = self.start_if_idle(guild_id).await;

        Ok(PlayOutcome::Track {
            item,
            position,
            started,
        })
    }

    /// Genera un pack por género y lo encola de una vez
    pub async fn request_pack(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        genre: &str,
        count: usize,
        requester: &str,
    ) -> Result<PlayOutcome, PlaybackError> {
        self.ensure_connected(guild_id, channel_id).await?;

        let tracks = pack::generate_pack(self.resolver.as_ref(), &self.pack_filter, genre, count)
            .await
            .map_err(|e| PlaybackError::TrackResolutionFailed(e.to_string()))?;
        if tracks.is_empty() {
            return Err(PlaybackError::TrackResolutionFailed(format!(
                "no se encontraron canciones de {}",
                genre
            )));
        }

        let count = self.bulk_enqueue(guild_id, tracks, requester)?;
        let started = self.start_if_idle(guild_id).await;
        Ok(PlayOutcome::Batch { count, started })
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let mut voice = self.sessions.lock(guild_id).await;
        match voice.pause().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(PlaybackError::PreconditionNotMet(
                "No hay música sonando",
            )),
            Err(e) => {
                error!("Error al pausar en guild {}: {:?}", guild_id, e);
                Err(PlaybackError::PreconditionNotMet("No se pudo pausar"))
            }
        }
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let mut voice = self.sessions.lock(guild_id).await;
        match voice.resume().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(PlaybackError::PreconditionNotMet(
                "No hay música pausada",
            )),
            Err(e) => {
                error!("Error al reanudar en guild {}: {:?}", guild_id, e);
                Err(PlaybackError::PreconditionNotMet("No se pudo reanudar"))
            }
        }
    }

    /// Detiene el track actual; su aviso de fin hace avanzar la cola
    pub async fn skip(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let mut voice = self.sessions.lock(guild_id).await;
        match voice.stop().await {
            Ok(true) => {
                info!("⏭️ Track saltado en guild {}", guild_id);
                Ok(())
            }
            Ok(false) => Err(PlaybackError::PreconditionNotMet(
                "No hay ninguna canción para saltar",
            )),
            Err(e) => {
                error!("Error al saltar en guild {}: {:?}", guild_id, e);
                Err(PlaybackError::PreconditionNotMet("No se pudo saltar la canción"))
            }
        }
    }

    /// Vacía la cola y desconecta
    pub async fn stop(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let mut voice = self.sessions.lock(guild_id).await;
        if !voice.is_connected() {
            return Err(PlaybackError::PreconditionNotMet(
                "El bot no está en un canal de voz",
            ));
        }

        self.queues.clear(guild_id);
        self.inactivity.cancel(guild_id);
        voice.disconnect().await;
        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        Ok(())
    }

    /// Mezcla la cola; devuelve cuántos tracks quedaron mezclados
    pub fn shuffle(&self, guild_id: GuildId) -> Result<usize, PlaybackError> {
        if self.queues.shuffle(guild_id) {
            Ok(self.queues.size(guild_id))
        } else {
            Err(PlaybackError::PreconditionNotMet(
                "No hay suficientes canciones en la cola para mezclar",
            ))
        }
    }

    /// El bot fue sacado del canal desde fuera
    pub async fn handle_forced_disconnect(&self, guild_id: GuildId) {
        let mut voice = self.sessions.lock(guild_id).await;
        if !voice.is_connected() {
            return;
        }
        info!("🔌 Bot desconectado externamente en guild {}", guild_id);
        voice.forget();
        if !self.queues.is_empty(guild_id) {
            debug!(
                "Se descartan {} canciones en cola de guild {}",
                self.queues.size(guild_id),
                guild_id
            );
        }
        self.queues.clear(guild_id);
        self.inactivity.cancel(guild_id);
    }

    /// Desconecta todas las guilds (apagado ordenado)
    pub async fn shutdown(&self) {
        let guilds = self.sessions.guilds();
        info!(
            "🛑 Cerrando {} sesiones de voz ({} temporizadores pendientes)",
            guilds.len(),
            self.inactivity.armed_count()
        );
        join_all(guilds.into_iter().map(|guild_id| async move {
            let mut voice = self.sessions.lock(guild_id).await;
            self.inactivity.cancel(guild_id);
            self.queues.clear(guild_id);
            voice.disconnect().await;
        }))
        .await;
        info!("🛑 Todas las sesiones de voz cerradas");
    }

    pub fn queue_snapshot(&self, guild_id: GuildId) -> Vec<QueueItem> {
        self.queues.snapshot(guild_id)
    }

    pub fn queue_size(&self, guild_id: GuildId) -> usize {
        self.queues.size(guild_id)
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Option<QueueItem> {
        self.sessions.now_playing(guild_id).await
    }

    pub async fn is_connected(&self, guild_id: GuildId) -> bool {
        self.sessions.is_connected(guild_id).await
    }

    pub async fn is_playing(&self, guild_id: GuildId) -> bool {
        self.sessions.is_playing(guild_id).await
    }

    pub async fn is_paused(&self, guild_id: GuildId) -> bool {
        self.sessions.is_paused(guild_id).await
    }

    fn notify(&self, notice: PlaybackNotice) {
        if self.notices.send(notice).is_err() {
            debug!("Nadie escucha los avisos de reproducción");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::transport::fake::FakeTransport, sources::MockTrackResolver};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    const GUILD: GuildId = GuildId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(10);

    struct Harness {
        player: Arc<PlaybackOrchestrator>,
        transport: Arc<FakeTransport>,
        channels: OrchestratorChannels,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_resolver(MockTrackResolver::new())
        }

        fn with_resolver(resolver: MockTrackResolver) -> Self {
            let transport = Arc::new(FakeTransport::default());
            let (player, channels) = PlaybackOrchestrator::new(
                transport.clone(),
                Arc::new(resolver),
                PlayerSettings::default(),
            );
            Self {
                player,
                transport,
                channels,
            }
        }

        /// Entrega al orquestador el siguiente evento pendiente
        async fn pump(&self) {
            let event = self
                .channels
                .events
                .try_recv()
                .expect("se esperaba un evento pendiente");
            self.player.handle_event(event).await;
        }

        fn notices(&self) -> Vec<PlaybackNotice> {
            self.channels.notices.try_iter().collect()
        }
    }

    fn track(title: &str) -> Track {
        Track::new(title, format!("https://cdn/{}", title)).unwrap()
    }

    #[tokio::test]
    async fn test_advance_on_empty_queue_arms_timer_without_playing() {
        let h = Harness::new();
        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();
        let arms_before = h.player.inactivity.arm_count();

        h.player.advance(GUILD).await;

        assert!(h.transport.played(GUILD).is_empty());
        assert_eq!(h.player.inactivity.arm_count(), arms_before + 1);
        assert!(h.player.inactivity.is_armed(GUILD));
        assert!(h
            .notices()
            .contains(&PlaybackNotice::QueueDrained { guild_id: GUILD }));
    }

    #[tokio::test]
    async fn test_advances_only_after_completion() {
        let h = Harness::new();
        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();
        for title in ["a", "b", "c"] {
            h.player.enqueue(GUILD, track(title), "alice").await.unwrap();
        }

        h.player.advance(GUILD).await;
        assert_eq!(h.transport.played(GUILD), vec!["a"]);
        assert!(!h.player.inactivity.is_armed(GUILD));

        // Sin aviso de fin no se avanza
        h.player.advance(GUILD).await;
        assert_eq!(h.transport.played(GUILD), vec!["a"]);

        assert!(h.transport.finish(GUILD));
        h.pump().await;
        assert_eq!(h.transport.played(GUILD), vec!["a", "b"]);

        assert!(h.transport.finish(GUILD));
        h.pump().await;
        assert!(h.transport.finish(GUILD));
        h.pump().await;
        assert_eq!(h.transport.played(GUILD), vec!["a", "b", "c"]);
        assert!(!h.player.is_playing(GUILD).await);
        assert!(h.player.inactivity.is_armed(GUILD));
    }

    #[tokio::test]
    async fn test_end_to_end_enqueue_while_playing() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|query| Ok(track(query)));
        let h = Harness::with_resolver(resolver);

        let first = h
            .player
            .request(GUILD, Some(CHANNEL), "T1", "alice")
            .await
            .unwrap();
        assert!(matches!(first, PlayOutcome::Track { position: 1, started: true, .. }));
        assert_eq!(h.transport.played(GUILD), vec!["T1"]);
        assert!(h.player.is_playing(GUILD).await);

        let second = h
            .player
            .request(GUILD, Some(CHANNEL), "T2", "bob")
            .await
            .unwrap();
        assert!(matches!(second, PlayOutcome::Track { position: 2, started: false, .. }));
        assert_eq!(h.transport.played(GUILD), vec!["T1"]);
        assert_eq!(h.player.queue_size(GUILD), 1);

        h.transport.finish(GUILD);
        h.pump().await;
        assert_eq!(h.transport.played(GUILD), vec!["T1", "T2"]);
        assert_eq!(
            h.player.now_playing(GUILD).await.map(|i| i.requested_by),
            Some("bob".to_string())
        );
        assert_eq!(h.transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_without_channel_changes_nothing() {
        let h = Harness::new();
        let err = h
            .player
            .request(GUILD, None, "anything", "alice")
            .await
            .unwrap_err();
        assert_eq!(err, PlaybackError::NotInChannel);
        assert_eq!(h.player.queue_size(GUILD), 0);
        assert!(!h.player.is_connected(GUILD).await);
    }

    #[tokio::test]
    async fn test_resolution_failure_leaves_queue_untouched() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| Err(anyhow::anyhow!("sin resultados")));
        let h = Harness::with_resolver(resolver);

        let err = h
            .player
            .request(GUILD, Some(CHANNEL), "zzz", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::TrackResolutionFailed(_)));
        assert_eq!(h.player.queue_size(GUILD), 0);
    }

    #[tokio::test]
    async fn test_playlist_is_bulk_enqueued_then_advanced_once() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_playlist()
            .withf(|_, limit| *limit == 10)
            .times(1)
            .returning(|_, _| Ok(vec![track("p1"), track("p2"), track("p3")]));
        let h = Harness::with_resolver(resolver);

        let outcome = h
            .player
            .request(
                GUILD,
                Some(CHANNEL),
                "https://www.youtube.com/playlist?list=PL1",
                "alice",
            )
            .await
            .unwrap();

        assert_eq!(outcome, PlayOutcome::Batch { count: 3, started: true });
        assert_eq!(h.transport.played(GUILD), vec!["p1"]);
        let queued: Vec<_> = h
            .player
            .queue_snapshot(GUILD)
            .into_iter()
            .map(|i| i.track.title().to_string())
            .collect();
        assert_eq!(queued, vec!["p2", "p3"]);
    }

    #[tokio::test]
    async fn test_genre_pack_is_filtered_before_enqueue() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_search().returning(|_, _| {
            Ok(vec![
                track("Song A").with_duration(300),
                track("Song A").with_duration(300),
                track("Song B Mix").with_duration(200),
                track("Song C").with_duration(700),
                track("Song D").with_duration(100),
            ])
        });
        let h = Harness::with_resolver(resolver);

        let outcome = h
            .player
            .request_pack(GUILD, Some(CHANNEL), "rock", 3, "alice")
            .await
            .unwrap();
        assert_eq!(outcome, PlayOutcome::Batch { count: 2, started: true });
        assert_eq!(h.transport.played(GUILD), vec!["Song A"]);
        assert_eq!(h.player.queue_size(GUILD), 1);
    }

    #[tokio::test]
    async fn test_dropped_connection_discards_track() {
        let h = Harness::new();
        h.player.enqueue(GUILD, track("orphan"), "alice").await.unwrap();

        h.player.advance(GUILD).await;

        assert!(h.transport.played(GUILD).is_empty());
        assert_eq!(h.player.queue_size(GUILD), 0);
        assert!(h.notices().iter().any(|n| matches!(
            n,
            PlaybackNotice::TrackFailed { title, .. } if title == "orphan"
        )));
    }

    #[tokio::test]
    async fn test_broken_track_is_skipped() {
        let h = Harness::new();
        h.transport.fail_title("broken");
        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();
        h.player.enqueue(GUILD, track("broken"), "alice").await.unwrap();
        h.player.enqueue(GUILD, track("fine"), "alice").await.unwrap();

        h.player.advance(GUILD).await;

        assert_eq!(h.transport.played(GUILD), vec!["fine"]);
        assert!(h.player.is_playing(GUILD).await);
    }

    #[tokio::test]
    async fn test_skip_advances_through_completion() {
        let h = Harness::new();
        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();
        h.player.enqueue(GUILD, track("a"), "alice").await.unwrap();
        h.player.enqueue(GUILD, track("b"), "alice").await.unwrap();
        h.player.advance(GUILD).await;

        h.player.skip(GUILD).await.unwrap();
        h.pump().await;

        assert_eq!(h.transport.played(GUILD), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_controls_report_preconditions() {
        let h = Harness::new();
        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();

        assert!(matches!(
            h.player.pause(GUILD).await,
            Err(PlaybackError::PreconditionNotMet(_))
        ));
        assert!(matches!(
            h.player.resume(GUILD).await,
            Err(PlaybackError::PreconditionNotMet(_))
        ));
        assert!(matches!(
            h.player.skip(GUILD).await,
            Err(PlaybackError::PreconditionNotMet(_))
        ));
        assert!(matches!(
            h.player.shuffle(GUILD),
            Err(PlaybackError::PreconditionNotMet(_))
        ));

        h.player.enqueue(GUILD, track("a"), "alice").await.unwrap();
        h.player.advance(GUILD).await;
        h.player.pause(GUILD).await.unwrap();
        assert!(h.player.is_paused(GUILD).await);
        h.player.resume(GUILD).await.unwrap();
        assert!(h.player.is_playing(GUILD).await);
    }

    #[tokio::test]
    async fn test_stop_while_disconnected_keeps_queue() {
        let h = Harness::new();
        h.player.enqueue(GUILD, track("a"), "alice").await.unwrap();
        h.player.enqueue(GUILD, track("b"), "alice").await.unwrap();

        assert!(matches!(
            h.player.stop(GUILD).await,
            Err(PlaybackError::PreconditionNotMet(_))
        ));
        assert_eq!(h.player.queue_size(GUILD), 2);
        assert!(h.transport.played(GUILD).is_empty());
    }

    #[tokio::test]
    async fn test_stop_tears_down_and_ignores_late_completion() {
        let h = Harness::new();
        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();
        h.player.enqueue(GUILD, track("a"), "alice").await.unwrap();
        h.player.enqueue(GUILD, track("b"), "alice").await.unwrap();
        h.player.advance(GUILD).await;

        h.player.stop(GUILD).await.unwrap();
        assert!(!h.player.is_connected(GUILD).await);
        assert_eq!(h.player.queue_size(GUILD), 0);
        assert!(!h.player.inactivity.is_armed(GUILD));

        // El transporte avisa del fin al cortar la llamada: no debe avanzar
        h.pump().await;
        assert_eq!(h.transport.played(GUILD), vec!["a"]);
        assert!(!h.player.inactivity.is_armed(GUILD));

        assert!(matches!(
            h.player.stop(GUILD).await,
            Err(PlaybackError::PreconditionNotMet(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_disconnects_idle_session() {
        let h = Harness::new();
        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();
        h.player.enqueue(GUILD, track("a"), "alice").await.unwrap();
        h.player.advance(GUILD).await;
        h.transport.finish(GUILD);
        h.pump().await;
        h.player.enqueue(GUILD, track("late"), "alice").await.unwrap();

        tokio::time::sleep(DEFAULT_INACTIVITY_TIMEOUT + Duration::from_secs(1)).await;
        h.pump().await;

        assert!(!h.player.is_connected(GUILD).await);
        assert_eq!(h.player.queue_size(GUILD), 0);
        assert_eq!(h.transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(h
            .notices()
            .contains(&PlaybackNotice::IdleDisconnect { guild_id: GUILD }));
    }

    #[tokio::test]
    async fn test_inactivity_while_playing_is_noop() {
        let h = Harness::new();
        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();
        h.player.enqueue(GUILD, track("a"), "alice").await.unwrap();
        h.player.advance(GUILD).await;

        // Un vencimiento que se coló mientras suena música
        let generation = h.player.inactivity.reset(GUILD);
        h.player
            .handle_event(GuildEvent::InactivityExpired {
                guild_id: GUILD,
                generation,
            })
            .await;

        assert!(h.player.is_connected(GUILD).await);
        assert!(h.player.is_playing(GUILD).await);
        assert_eq!(h.transport.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_inactivity_generation_is_ignored() {
        let h = Harness::new();
        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();
        let stale = h.player.inactivity.reset(GUILD);
        h.player.inactivity.reset(GUILD);

        h.player
            .handle_event(GuildEvent::InactivityExpired {
                guild_id: GUILD,
                generation: stale,
            })
            .await;

        assert!(h.player.is_connected(GUILD).await);
        assert!(h.player.inactivity.is_armed(GUILD));
    }

    #[tokio::test]
    async fn test_guild_failure_does_not_affect_other_guilds() {
        let other = GuildId::new(2);
        let h = Harness::new();
        h.player.enqueue(GUILD, track("lost"), "alice").await.unwrap();
        h.player.ensure_connected(other, Some(ChannelId::new(20))).await.unwrap();
        h.player.enqueue(other, track("kept"), "bob").await.unwrap();

        h.player.advance(GUILD).await;
        h.player.advance(other).await;

        assert!(h.transport.played(GUILD).is_empty());
        assert_eq!(h.transport.played(other), vec!["kept"]);
        assert!(h.player.is_playing(other).await);
    }

    #[tokio::test]
    async fn test_forced_disconnect_clears_guild() {
        let h = Harness::new();
        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();
        h.player.enqueue(GUILD, track("a"), "alice").await.unwrap();
        h.player.enqueue(GUILD, track("b"), "alice").await.unwrap();
        h.player.advance(GUILD).await;

        h.player.handle_forced_disconnect(GUILD).await;
        assert!(!h.player.is_connected(GUILD).await);
        assert_eq!(h.player.queue_size(GUILD), 0);

        h.transport.finish(GUILD);
        h.pump().await;
        assert_eq!(h.transport.played(GUILD), vec!["a"]);
    }

    #[tokio::test]
    async fn test_event_loop_drives_playback() {
        let h = Harness::new();
        let events = h.channels.events.clone();
        let handle = h.player.spawn_event_loop(events);

        h.player.ensure_connected(GUILD, Some(CHANNEL)).await.unwrap();
        h.player.enqueue(GUILD, track("a"), "alice").await.unwrap();
        h.player.enqueue(GUILD, track("b"), "alice").await.unwrap();
        h.player.advance(GUILD).await;
        h.transport.finish(GUILD);

        tokio::time::timeout(Duration::from_secs(5), async {
            while h.transport.played(GUILD).len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("el bucle de eventos no avanzó la cola");

        handle.abort();
    }
}
