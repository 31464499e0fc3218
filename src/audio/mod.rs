//! # Audio Module
//!
//! Per-guild playback orchestration for Jukebox Bot.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Orchestrator
//! - Ties queue, voice session and inactivity timer together per guild
//! - Advances the queue only when the active track reports its end
//! - Consumes asynchronous [`transport::GuildEvent`]s in a single event loop
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue per guild with uniform shuffle
//! - Bounded by `MAX_QUEUE_SIZE`
//!
//! ### [`session`] - Voice Sessions
//! - Connection and play state per guild, behind a per-guild async lock
//! - Stale track completions are detected by play id and ignored
//!
//! ### [`inactivity`] - Idle Disconnect
//! - At most one pending timer per guild; re-arming cancels the previous one
//!
//! ### [`transport`] / [`songbird_transport`] - Audio Transport
//! - Seam between the orchestrator and the voice/streaming backend
//! - Production implementation on top of songbird
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use jukebox_bot::audio::player::{PlaybackOrchestrator, PlayerSettings};
//! # use std::sync::Arc;
//! # use serenity::all::{ChannelId, GuildId};
//!
//! # async fn example(
//! #     transport: Arc<dyn jukebox_bot::audio::transport::AudioTransport>,
//! #     resolver: Arc<dyn jukebox_bot::sources::TrackResolver>,
//! # ) -> anyhow::Result<()> {
//! let (player, channels) = PlaybackOrchestrator::new(transport, resolver, PlayerSettings::default());
//! player.spawn_event_loop(channels.events);
//!
//! let guild_id = GuildId::new(123456789);
//! player
//!     .request(guild_id, Some(ChannelId::new(42)), "never gonna give you up", "rick")
//!     .await?;
//! player.pause(guild_id).await?;
//! player.resume(guild_id).await?;
//! player.skip(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod inactivity;
pub mod player;
pub mod queue;
pub mod session;
pub mod songbird_transport;
pub mod transport;
