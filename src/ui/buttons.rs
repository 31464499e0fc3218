use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const SHUFFLE: &str = "music_shuffle";
    pub const QUEUE: &str = "music_queue";
}

/// Acción asociada a un botón del reproductor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    PlayPause,
    Skip,
    Stop,
    Shuffle,
    Queue,
}

impl ControlAction {
    pub fn from_custom_id(id: &str) -> Option<Self> {
        match id {
            button_ids::PLAY_PAUSE => Some(Self::PlayPause),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::STOP => Some(Self::Stop),
            button_ids::SHUFFLE => Some(Self::Shuffle),
            button_ids::QUEUE => Some(Self::Queue),
            _ => None,
        }
    }
}

/// Controles que acompañan al mensaje de "Reproduciendo Ahora"
pub fn create_player_controls(is_paused: bool) -> Vec<CreateActionRow> {
    let play_pause_emoji = if is_paused { '▶' } else { '⏸' };

    let play_pause_btn = CreateButton::new(button_ids::PLAY_PAUSE)
        .emoji(play_pause_emoji)
        .style(ButtonStyle::Primary);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Secondary);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    let shuffle_btn = CreateButton::new(button_ids::SHUFFLE)
        .emoji('🔀')
        .style(ButtonStyle::Secondary);

    let queue_btn = CreateButton::new(button_ids::QUEUE)
        .emoji('📋')
        .style(ButtonStyle::Secondary);

    vec![CreateActionRow::Buttons(vec![
        play_pause_btn,
        skip_btn,
        stop_btn,
        shuffle_btn,
        queue_btn,
    ])]
}
