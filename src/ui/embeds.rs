use serenity::builder::{CreateEmbed, CreateEmbedFooter};
use std::time::Duration;

use super::messages::format_duration;
use crate::audio::{queue::QueuePage, scheduler::GuildStatus, track::TrackDescriptor};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Tsuki Music";

/// Builds the `/queue` embed: the current track, one page of pending
/// tracks, and volume and total duration.
pub fn queue_embed(status: &GuildStatus, page: &QueuePage) -> CreateEmbed {
    let queue = &status.queue;

    let (label, colour) = match (&queue.current, status.paused) {
        (None, _) => ("🎧 Now playing", colors::NEUTRAL_GRAY),
        (Some(_), true) => ("⏸️ Paused", colors::WARNING_ORANGE),
        (Some(_), false) => ("🎧 Now playing", colors::MUSIC_PURPLE),
    };
    let current = queue
        .current
        .as_ref()
        .map_or_else(|| "Nothing.".to_string(), |now| track_line(&now.track));

    let mut embed = CreateEmbed::default()
        .title("📜 Music Queue")
        .description(up_next(status, page))
        .color(colour)
        .field(label, current, false)
        .field("🔊 Volume", format!("`{}%`", status.volume), true);

    if queue.total_duration > Duration::ZERO {
        embed = embed.field(
            "⏱️ Total",
            format!("`{}`", format_duration(queue.total_duration)),
            true,
        );
    }

    let footer = if page.total_pages > 1 {
        format!(
            "Page {}/{} • {}",
            page.current_page, page.total_pages, STANDARD_FOOTER
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed.footer(CreateEmbedFooter::new(footer))
}

/// Lista de la página con la línea de "… y N más"
fn up_next(status: &GuildStatus, page: &QueuePage) -> String {
    let total_pending = status.queue.total_pending;
    if total_pending == 0 || page.items.is_empty() {
        return "📭 The queue is currently empty.".to_string();
    }

    let mut lines = vec!["**Up next:**".to_string()];
    for (offset, track) in page.items.iter().enumerate() {
        lines.push(format!(
            "`{}.` {}",
            page.first_position + offset,
            track_line(track)
        ));
    }

    let shown_through = page.first_position + page.items.len() - 1;
    let remaining = total_pending.saturating_sub(shown_through);
    if remaining > 0 {
        lines.push(format!(
            "\n… and `{}` more track(s) in the queue.",
            remaining
        ));
    }

    lines.join("\n")
}

fn track_line(track: &TrackDescriptor) -> String {
    let duration = track
        .duration()
        .map(|d| format!(" `[{}]`", format_duration(d)))
        .unwrap_or_default();

    format!(
        "{} (requested by <@{}>){}",
        track.title(),
        track.requested_by(),
        duration
    )
}
