//! Registry of admitted connections, keyed by client id.

use std::sync::Arc;

use dashmap::DashMap;
use tether_core::ClientId;
use tracing::{debug, warn};

use crate::channel::Channel;

/// Live connections, owned by the server instance.
pub struct ConnectionRegistry {
    channels: DashMap<ClientId, Arc<Channel>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Register `channel` under `client_id`, replacing any live entry with
    /// the same id.
    pub fn insert(&self, client_id: ClientId, channel: Arc<Channel>) {
        if let Some(previous) = self.channels.insert(client_id.clone(), channel) {
            warn!(
                client_id = %client_id,
                previous_closed = previous.is_closed(),
                "client id already registered, replacing entry"
            );
        }
    }

    /// Remove the entry for `client_id` only if it still refers to
    /// `channel`. Returns whether an entry was removed.
    pub fn remove_if_same(&self, client_id: &ClientId, channel: &Arc<Channel>) -> bool {
        let removed = self
            .channels
            .remove_if(client_id, |_, current| Arc::ptr_eq(current, channel))
            .is_some();
        if !removed {
            debug!(client_id = %client_id, "registry entry belongs to a newer connection, kept");
        }
        removed
    }

    pub fn get(&self, client_id: &ClientId) -> Option<Arc<Channel>> {
        self.channels.get(client_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Push a text frame to a registered client.
    ///
    /// Returns `false` if the client is unknown or the frame was not queued.
    pub fn send_to(&self, client_id: &ClientId, text: String) -> bool {
        match self.get(client_id) {
            Some(channel) => channel.send_text(text),
            None => {
                debug!(client_id = %client_id, "send_to unknown client");
                false
            }
        }
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.channels.contains_key(client_id)
    }

    pub fn count(&self) -> usize {
        self.channels.len()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.channels.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Close every registered channel. Each connection then runs its normal
    /// teardown and removes itself.
    pub fn close_all(&self) {
        let channels: Vec<Arc<Channel>> = self
            .channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for channel in channels {
            channel.close();
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::OutboundFrame;

    #[test]
    fn insert_and_get() {
        let reg = ConnectionRegistry::new();
        let (channel, _rx) = Channel::new(4);
        let id = ClientId::from_raw("alice");
        reg.insert(id.clone(), Arc::clone(&channel));

        assert!(reg.contains(&id));
        assert_eq!(reg.count(), 1);
        assert!(Arc::ptr_eq(&reg.get(&id).unwrap(), &channel));
        assert_eq!(reg.client_ids(), vec![id]);
    }

    #[tokio::test]
    async fn send_to_registered_client() {
        let reg = ConnectionRegistry::new();
        let (channel, mut rx) = Channel::new(4);
        let id = ClientId::new();
        reg.insert(id.clone(), channel);

        assert!(reg.send_to(&id, "push".into()));
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("push".into())));
        assert!(!reg.send_to(&ClientId::from_raw("nobody"), "x".into()));
    }

    #[test]
    fn overwrite_keeps_latest() {
        let reg = ConnectionRegistry::new();
        let (first, _rx1) = Channel::new(4);
        let (second, _rx2) = Channel::new(4);
        let id = ClientId::from_raw("dup");

        reg.insert(id.clone(), Arc::clone(&first));
        reg.insert(id.clone(), Arc::clone(&second));

        assert_eq!(reg.count(), 1);
        assert!(Arc::ptr_eq(&reg.get(&id).unwrap(), &second));
    }

    #[test]
    fn stale_removal_does_not_evict_newer_entry() {
        let reg = ConnectionRegistry::new();
        let (first, _rx1) = Channel::new(4);
        let (second, _rx2) = Channel::new(4);
        let id = ClientId::from_raw("dup");

        reg.insert(id.clone(), Arc::clone(&first));
        reg.insert(id.clone(), Arc::clone(&second));

        assert!(!reg.remove_if_same(&id, &first));
        assert!(reg.contains(&id));
        assert!(reg.remove_if_same(&id, &second));
        assert!(!reg.contains(&id));
    }

    #[test]
    fn close_all_closes_every_channel() {
        let reg = ConnectionRegistry::new();
        let (a, _rx_a) = Channel::new(4);
        let (b, _rx_b) = Channel::new(4);
        reg.insert(ClientId::new(), Arc::clone(&a));
        reg.insert(ClientId::new(), Arc::clone(&b));

        reg.close_all();
        assert!(a.is_closed());
        assert!(b.is_closed());
        // Entries are removed by each connection's teardown, not here.
        assert_eq!(reg.count(), 2);
    }
}
