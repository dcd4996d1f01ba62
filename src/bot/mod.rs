//! # Bot Module
//!
//! Discord front end for the playback engine.
//!
//! [`TsukiBot`] implements Serenity's [`EventHandler`]. It registers the
//! slash commands, turns each interaction into a [`MusicEngine`] call and
//! tells the engine when Discord drops the bot from voice. It holds no
//! playback state of its own.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;

use crate::{audio::MusicEngine, config::Config};

pub use notifier::SerenityNotifier;

pub struct TsukiBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    engine: Arc<MusicEngine>,
}

impl TsukiBot {
    pub fn new(config: Arc<Config>, engine: Arc<MusicEngine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &MusicEngine {
        &self.engine
    }

    /// Registers the slash commands, per guild when `GUILD_ID` is set.
    ///
    /// - **Guild commands**: ~1 second propagation time
    /// - **Global commands**: ~1 hour propagation time
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for TsukiBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Reports to the engine when the bot itself is removed from voice
    /// (kicked, channel deleted, moved out by a moderator).
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        let left = old.and_then(|state| state.channel_id);
        if let (Some(guild_id), Some(left)) = (new.guild_id, left) {
            info!("🔌 Bot desconectado del canal {} en guild {}", left, guild_id);
            self.engine
                .transport_lost(guild_id, Some(left), "removed from the voice channel");
        }
    }
}
