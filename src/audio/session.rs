use serenity::model::id::{ChannelId, GuildId};
use tracing::{debug, info, warn};

use super::{
    error::{TransportError, ValidationError},
    transport::{Transport, TransportSession},
};

pub const MIN_VOLUME: u8 = 0;
pub const MAX_VOLUME: u8 = 100;

/// Lifecycle of a guild's voice connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

/// Checks a user-supplied volume before anything is mutated.
pub fn validate_volume(percent: i64) -> Result<u8, ValidationError> {
    if (i64::from(MIN_VOLUME)..=i64::from(MAX_VOLUME)).contains(&percent) {
        Ok(percent as u8)
    } else {
        Err(ValidationError::OutOfRange {
            value: percent,
            min: i64::from(MIN_VOLUME),
            max: i64::from(MAX_VOLUME),
        })
    }
}

/// Per-guild voice connection state machine.
///
/// ```text
/// Disconnected --join--> Connecting --ok--> Connected
///                        Connecting --err-> Disconnected
/// Connected --join(other)--> Connected (moved, or unchanged on error)
/// Connected --disconnect--> Disconnected
/// ```
///
/// The volume outlives connections: it is kept across tracks and reconnects
/// for as long as the guild's scheduler lives.
pub struct VoiceSession {
    guild: GuildId,
    state: ConnectionState,
    destination: Option<ChannelId>,
    volume: u8,
    link: Option<Box<dyn TransportSession>>,
}

impl VoiceSession {
    pub fn new(guild: GuildId, volume: u8) -> Self {
        Self {
            guild,
            state: ConnectionState::Disconnected,
            destination: None,
            volume: volume.min(MAX_VOLUME),
            link: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn destination(&self) -> Option<ChannelId> {
        self.destination
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// The live transport session, present only while Connected.
    pub fn link_mut(&mut self) -> Option<&mut (dyn TransportSession + 'static)> {
        self.link.as_deref_mut()
    }

    /// Connects to `destination`, or moves there if already connected
    /// elsewhere. Joining the channel already in use is a no-op.
    pub async fn join(
        &mut self,
        transport: &dyn Transport,
        destination: ChannelId,
    ) -> Result<(), TransportError> {
        match self.state {
            ConnectionState::Connected if self.destination == Some(destination) => {
                debug!("🔊 Guild {} ya está en el canal {}", self.guild, destination);
                Ok(())
            }
            ConnectionState::Connected => self.move_to(destination).await,
            ConnectionState::Connecting => Err(TransportError::AlreadyConnected),
            ConnectionState::Disconnected => self.connect(transport, destination).await,
        }
    }

    async fn connect(
        &mut self,
        transport: &dyn Transport,
        destination: ChannelId,
    ) -> Result<(), TransportError> {
        self.state = ConnectionState::Connecting;
        debug!("🔗 Conectando guild {} al canal {}", self.guild, destination);

        match transport.connect(self.guild, destination).await {
            Ok(mut link) => {
                link.set_volume(self.volume).await;
                self.link = Some(link);
                self.destination = Some(destination);
                self.state = ConnectionState::Connected;
                info!("🔊 Conectado al canal {} en guild {}", destination, self.guild);
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                self.destination = None;
                warn!("❌ No se pudo conectar en guild {}: {}", self.guild, e);
                Err(e)
            }
        }
    }

    async fn move_to(&mut self, destination: ChannelId) -> Result<(), TransportError> {
        let Some(link) = self.link.as_mut() else {
            return Err(TransportError::Unreachable("no live voice session".into()));
        };

        link.move_to(destination).await.inspect_err(|e| {
            warn!("❌ No se pudo mover en guild {}: {}", self.guild, e);
        })?;

        info!(
            "📍 Guild {} movida del canal {:?} a {}",
            self.guild, self.destination, destination
        );
        self.destination = Some(destination);
        Ok(())
    }

    /// Drops the connection and returns to Disconnected. Safe to call in any
    /// state.
    pub async fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.disconnect().await;
            info!("👋 Desconectado del canal de voz en guild {}", self.guild);
        }
        self.destination = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Stores the volume and applies it to the live session, if any.
    pub async fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
        if let Some(link) = self.link.as_mut() {
            link.set_volume(self.volume).await;
        }
        info!("🔊 Volumen de guild {} ajustado a {}%", self.guild, self.volume);
    }
}
