use std::{fmt::Display, time::Duration};

use crate::audio::{
    error::{EngineError, ResolutionError, StateError, TransportError, ValidationError},
    scheduler::EnqueueOutcome,
    track::TrackDescriptor,
};

pub fn now_playing(track: &TrackDescriptor) -> String {
    format!(
        "🎶 **Now playing:** {} (requested by <@{}>)",
        track.title(),
        track.requested_by()
    )
}

pub fn queue_finished() -> String {
    "👋 Queue is empty. Leaving the voice channel.".to_string()
}

pub fn idle_disconnect() -> String {
    "👋 Nothing to play. Leaving the voice channel.".to_string()
}

pub fn transport_lost() -> String {
    "🔌 Lost the voice connection. The queue was cleared.".to_string()
}

pub fn playback_failed(track: &TrackDescriptor, error: &impl Display) -> String {
    format!(
        "❌ **Failed to start playback of {}:** `{}`",
        track.title(),
        error
    )
}

/// Respuesta a `/play`
pub fn enqueue_outcome(outcome: &EnqueueOutcome) -> String {
    let mut text = match (&outcome.first, outcome.queued) {
        (_, 0) => "⚠️ Nothing was added: the queue is full.".to_string(),
        (Some(first), 1) => format!("✅ Added to queue: **{}**", first.title()),
        _ => format!("✅ Added `{}` track(s) to the queue.", outcome.queued),
    };

    if outcome.failed > 0 {
        text.push_str(&format!(
            "\n⚠️ `{}` track(s) could not be loaded and were skipped.",
            outcome.failed
        ));
    }

    if outcome.dropped > 0 {
        text.push_str(&format!(
            "\n⚠️ `{}` track(s) did not fit in the queue.",
            outcome.dropped
        ));
    }

    text
}

pub fn volume_set(percent: u8) -> String {
    format!("✅ **Volume set to:** `{}%`", percent)
}

pub fn volume_current(percent: u8) -> String {
    format!("🔊 **Current volume:** `{}%`", percent)
}

pub fn skipped(track: &TrackDescriptor) -> String {
    format!("⏭️ Skipped **{}**.", track.title())
}

pub fn paused(track: &TrackDescriptor) -> String {
    format!("⏸️ Paused **{}**.", track.title())
}

pub fn resumed(track: &TrackDescriptor) -> String {
    format!("▶️ Resumed **{}**.", track.title())
}

pub fn stopped() -> String {
    "⏹️ Playback stopped.".to_string()
}

pub fn joined() -> String {
    "✅ Connected to your voice channel.".to_string()
}

pub fn left() -> String {
    "👋 Disconnected.".to_string()
}

pub fn not_in_voice() -> String {
    "You must be in a voice channel to use this command.".to_string()
}

/// Traduce un error del motor a un mensaje para el usuario
pub fn engine_error(error: &EngineError) -> String {
    match error {
        EngineError::Resolution(ResolutionError::NoResults) => {
            "❌ No playable results for that query.".to_string()
        }
        EngineError::Resolution(ResolutionError::Timeout(after)) => format!(
            "⏱️ Looking that up took longer than {}. Try again later.",
            humantime::format_duration(*after)
        ),
        EngineError::Resolution(ResolutionError::Unreachable(reason)) => {
            format!("❌ The music source is unreachable right now: `{}`", reason)
        }
        EngineError::Transport(TransportError::Permission(reason)) => {
            format!("❌ I'm not allowed to join that channel: `{}`", reason)
        }
        EngineError::Transport(TransportError::AlreadyConnected) => {
            "⏳ Still connecting to voice, try again in a moment.".to_string()
        }
        EngineError::Transport(TransportError::Unreachable(reason)) => {
            format!("❌ Failed to connect to voice: `{}`", reason)
        }
        EngineError::Validation(ValidationError::OutOfRange { min, max, .. }) => {
            format!("❌ Volume must be between {} and {}.", min, max)
        }
        EngineError::State(StateError::NothingPlaying) => "Nothing is playing.".to_string(),
        EngineError::State(StateError::NotConnected) => "I'm not in a voice channel.".to_string(),
        EngineError::SchedulerGone(_) => {
            "❌ The player for this server is restarting, try again.".to_string()
        }
    }
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
