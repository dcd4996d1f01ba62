use async_trait::async_trait;
use serenity::{http::Http, model::id::ChannelId};
use std::sync::Arc;

use crate::audio::transport::Notifier;

/// Posts engine announcements as plain messages in a guild text channel.
pub struct SerenityNotifier {
    http: Arc<Http>,
}

impl SerenityNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for SerenityNotifier {
    async fn send(&self, channel: ChannelId, text: &str) -> anyhow::Result<()> {
        channel.say(self.http.as_ref(), text).await?;
        Ok(())
    }
}
