use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{EngineResult, MusicEngine},
    bot::TsukiBot,
    ui::{embeds, messages},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TsukiBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply(ctx, &command, "❌ This command only works inside a server.", true).await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let engine = bot.engine();
    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, engine, guild_id).await,
        "skip" => {
            let text = render(engine.skip(guild_id).await, |track| messages::skipped(&track));
            reply(ctx, &command, &text, false).await
        }
        "pause" => {
            let text = render(engine.pause(guild_id).await, |track| messages::paused(&track));
            reply(ctx, &command, &text, false).await
        }
        "resume" => {
            let text = render(engine.resume(guild_id).await, |track| messages::resumed(&track));
            reply(ctx, &command, &text, false).await
        }
        "stop" => {
            let text = render(engine.stop(guild_id).await, |_| messages::stopped());
            reply(ctx, &command, &text, false).await
        }
        "volume" => {
            let text = match int_option(&command, "level") {
                Some(level) => render(engine.set_volume(guild_id, level).await, messages::volume_set),
                None => render(engine.volume(guild_id).await, messages::volume_current),
            };
            reply(ctx, &command, &text, false).await
        }
        "join" => {
            let Some(voice) = user_voice_channel(ctx, guild_id, command.user.id) else {
                return reply(ctx, &command, &messages::not_in_voice(), true).await;
            };
            let text = render(engine.join(guild_id, voice).await, |_| messages::joined());
            reply(ctx, &command, &text, false).await
        }
        "leave" => {
            let text = render(engine.leave(guild_id).await, |_| messages::left());
            reply(ctx, &command, &text, false).await
        }
        "queue" => {
            let page = int_option(&command, "page")
                .and_then(|page| usize::try_from(page).ok())
                .unwrap_or(1)
                .max(1);
            let per_page = bot.config().status_page_size;
            match engine.snapshot(guild_id, page.saturating_mul(per_page)).await {
                Ok(status) => {
                    let listing = status.queue.page(page, per_page);
                    reply_embed(ctx, &command, embeds::queue_embed(&status, &listing)).await
                }
                Err(e) => reply(ctx, &command, &messages::engine_error(&e), true).await,
            }
        }
        other => {
            warn!("Comando desconocido: /{}", other);
            reply(ctx, &command, "❌ Unknown command", true).await
        }
    }
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    engine: &MusicEngine,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = str_option(command, "query") else {
        return reply(ctx, command, "❌ Missing query.", true).await;
    };

    let Some(voice) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, &messages::not_in_voice(), true).await;
    };

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let outcome = engine
        .enqueue(guild_id, query, command.user.id, voice, Some(command.channel_id))
        .await;
    let text = render(outcome, |outcome| messages::enqueue_outcome(&outcome));

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await?;

    Ok(())
}

// Funciones auxiliares

fn render<T>(result: EngineResult<T>, ok: impl FnOnce(T) -> String) -> String {
    match result {
        Ok(value) => ok(value),
        Err(e) => messages::engine_error(&e),
    }
}

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    text: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn reply_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

fn str_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

/// Canal de voz del usuario según la caché
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
