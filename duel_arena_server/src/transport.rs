use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use duel_arena_core::{ServerMessage, Transport, UserId};

/// 通过每个连接的 MPSC 通道向玩家投递消息
///
/// 对局在持有锁时同步调用 `send`，所以这里只能 `try_send`，
/// 通道已满或已关闭时丢弃消息，玩家可以通过 AskDuel 重新同步。
#[derive(Default)]
pub struct ChannelTransport {
    senders: DashMap<UserId, mpsc::Sender<ServerMessage>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: UserId, sender: mpsc::Sender<ServerMessage>) {
        self.senders.insert(user_id, sender);
    }

    pub fn unregister(&self, user_id: &UserId) {
        self.senders.remove(user_id);
    }

    pub fn is_connected(&self, user_id: &UserId) -> bool {
        self.senders.contains_key(user_id)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, user_id: UserId, message: ServerMessage) {
        let Some(sender) = self.senders.get(&user_id).map(|s| s.clone()) else {
            warn!("玩家 {} 没有连接，丢弃消息", user_id);
            return;
        };
        if let Err(e) = sender.try_send(message) {
            warn!("向玩家 {} 发送消息失败: {}", user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_send_reaches_registered_channel_only() {
        let transport = ChannelTransport::new();
        let (tx, mut rx) = mpsc::channel(1);
        let user = Uuid::new_v4();
        transport.register(user, tx);
        assert!(transport.is_connected(&user));

        transport.send(user, ServerMessage::HeartBeat { server_seq: 1 });
        // 通道已满，丢弃
        transport.send(user, ServerMessage::HeartBeat { server_seq: 2 });
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::HeartBeat { server_seq: 1 })));
        assert!(rx.try_recv().is_err());

        transport.unregister(&user);
        assert!(!transport.is_connected(&user));
        transport.send(user, ServerMessage::HeartBeat { server_seq: 3 });
        assert!(rx.try_recv().is_err());
    }
}
