use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::bail;
use tokio::sync::broadcast::{self, Sender};
use tokio::sync::mpsc;

use buddies_utils::{async_utils, log_internal_error};

use crate::{ChatId, Message};

const SUBSCRIPTIONS_CLEANUP_INTERVAL: Duration = Duration::from_secs(5);
const CHANNEL_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct ChatFeed {
    channels: Arc<RwLock<HashMap<ChatId, Sender<Message>>>>,
}

impl ChatFeed {
    /// Must be called from within a tokio runtime, a cleanup job is spawned.
    pub fn new() -> Self {
        let channels: Arc<RwLock<HashMap<ChatId, Sender<Message>>>> = Arc::new(RwLock::new(HashMap::new()));

        Self::spawn_cleanup_job(Arc::downgrade(&channels));

        ChatFeed { channels }
    }

    pub fn subscribe(&self, chat_id: ChatId) -> anyhow::Result<mpsc::UnboundedReceiver<Message>> {
        let subscription = {
            let mut channels_lock = match self.channels.write() {
                Ok(res) => res,
                Err(e) => bail!("Could not lock chat feed channels for write: {e}"),
            };

            channels_lock.entry(chat_id).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0).subscribe()
        };

        Ok(async_utils::pipe_broadcast(subscription, Some))
    }

    pub fn publish(&self, message: &Message) -> anyhow::Result<()> {
        let channels_read = match self.channels.read() {
            Ok(read_lock) => read_lock,
            Err(e) => bail!("Could not lock chat feed channels for read: {e}"),
        };

        if let Some(sender) = channels_read.get(&message.chat_id) {
            // no receivers left is not an error, the cleanup job will drop the channel
            let _ = sender.send(message.clone());
        };

        Ok(())
    }

    pub fn close(&self, chat_id: &ChatId) -> anyhow::Result<()> {
        match self.channels.write() {
            Ok(mut write_lock) => {
                write_lock.remove(chat_id);
                Ok(())
            },
            Err(e) => bail!("Could not lock chat feed channels for write: {e}"),
        }
    }

    fn spawn_cleanup_job(channels: std::sync::Weak<RwLock<HashMap<ChatId, Sender<Message>>>>) {
        // Periodically removes channels nobody listens to, stops once the feed is gone
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SUBSCRIPTIONS_CLEANUP_INTERVAL).await;
                let channels = match channels.upgrade() {
                    Some(channels) => channels,
                    None => break,
                };
                match channels.write() {
                    Ok(mut write_lock) => {
                        write_lock.retain(|_, sender| sender.receiver_count() > 0);
                        write_lock.shrink_to_fit();
                    },
                    Err(e) => log_internal_error(e),
                };
            }
        });
    }
}
