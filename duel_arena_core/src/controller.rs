use crate::card::{CardGuid, CardInstance, ControllerId};
use crate::message::{Operation, ServerMessage};
use crate::policy::Policy;
use crate::state::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 操控者的加载状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    None,       // 尚未请求对局
    AskDuel,    // 已请求对局数据
    InitFinish, // 加载完毕
}

/// 把消息投递给真人玩家的网络层
/// 投递失败由实现方处理，对局不会重试
pub trait Transport: Send + Sync {
    fn send(&self, user_id: UserId, message: ServerMessage);
}

/// 操控者背后的能力：真人或AI，二者必居其一
pub trait Seat: Send + Sync {
    fn notify(&self, message: &ServerMessage);

    fn is_automated(&self) -> bool;

    fn user_id(&self) -> Option<UserId> {
        None
    }

    /// AI根据已观察到的消息决定接下来的操作
    fn plan(&self, _controller: &Controller) -> Vec<Operation> {
        Vec::new()
    }
}

pub struct HumanSeat {
    user_id: UserId,
    transport: Arc<dyn Transport>,
}

impl HumanSeat {
    pub fn new(user_id: UserId, transport: Arc<dyn Transport>) -> Self {
        HumanSeat { user_id, transport }
    }
}

impl Seat for HumanSeat {
    fn notify(&self, message: &ServerMessage) {
        self.transport.send(self.user_id, message.clone());
    }

    fn is_automated(&self) -> bool {
        false
    }

    fn user_id(&self) -> Option<UserId> {
        Some(self.user_id)
    }
}

pub struct AutomatedSeat {
    controller_id: ControllerId,
    policy: Box<dyn Policy>,
}

impl AutomatedSeat {
    pub fn new(controller_id: ControllerId, policy: Box<dyn Policy>) -> Self {
        AutomatedSeat { controller_id, policy }
    }
}

impl Seat for AutomatedSeat {
    fn notify(&self, message: &ServerMessage) {
        // AI只关心消息包，心跳与预览都忽略
        if let ServerMessage::MessagePackNotify { packs, .. } = message {
            self.policy.observe(self.controller_id, packs);
        }
    }

    fn is_automated(&self) -> bool {
        true
    }

    fn plan(&self, controller: &Controller) -> Vec<Operation> {
        self.policy.plan(controller)
    }
}

/// 操控者 (对局中的一个座位)
pub struct Controller {
    id: ControllerId,
    active_zone: Vec<CardInstance>, // 角色牌列表
    hand: Vec<CardInstance>,        // 手牌列表
    load_state: LoadState,
    allow: bool,                    // 是否允许操作
    selected: CardGuid,             // 出战角色牌guid，0表示未选择
    seat: Box<dyn Seat>,
}

impl Controller {
    pub(crate) fn new(id: ControllerId, seat: Box<dyn Seat>) -> Self {
        // AI无需加载
        let load_state = if seat.is_automated() { LoadState::InitFinish } else { LoadState::None };
        Controller {
            id,
            active_zone: Vec::with_capacity(3),
            hand: Vec::new(),
            load_state,
            allow: true,
            selected: 0,
            seat,
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn allow(&self) -> bool {
        self.allow
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn selected_guid(&self) -> CardGuid {
        self.selected
    }

    pub fn is_automated(&self) -> bool {
        self.seat.is_automated()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.seat.user_id()
    }

    pub fn active_zone(&self) -> &[CardInstance] {
        &self.active_zone
    }

    pub fn hand(&self) -> &[CardInstance] {
        &self.hand
    }

    /// 当前选择的出战角色牌
    pub fn selected_card(&self) -> Option<&CardInstance> {
        self.active_card(self.selected)
    }

    pub fn active_card(&self, guid: CardGuid) -> Option<&CardInstance> {
        if guid == 0 {
            return None;
        }
        self.active_zone.iter().find(|c| c.guid == guid)
    }

    pub(crate) fn active_card_mut(&mut self, guid: CardGuid) -> Option<&mut CardInstance> {
        if guid == 0 {
            return None;
        }
        self.active_zone.iter_mut().find(|c| c.guid == guid)
    }

    pub(crate) fn set_allow(&mut self, allow: bool) {
        self.allow = allow;
    }

    pub(crate) fn set_selected(&mut self, guid: CardGuid) {
        self.selected = guid;
    }

    pub(crate) fn set_load_state(&mut self, state: LoadState) {
        self.load_state = state;
    }

    pub(crate) fn push_active(&mut self, card: CardInstance) {
        self.active_zone.push(card);
    }

    pub(crate) fn notify(&self, message: &ServerMessage) {
        self.seat.notify(message);
    }

    pub(crate) fn plan(&self) -> Vec<Operation> {
        self.seat.plan(self)
    }
}

/// 记录所有投递消息的网络层，仅用于测试
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: parking_lot::Mutex<Vec<(UserId, ServerMessage)>>,
}

#[cfg(test)]
impl RecordingTransport {
    pub(crate) fn all(&self) -> Vec<(UserId, ServerMessage)> {
        self.sent.lock().clone()
    }

    /// 某位玩家收到的所有消息包推送
    pub(crate) fn notifies(&self, user_id: UserId) -> Vec<(u32, Vec<crate::message::MessagePack>)> {
        self.sent
            .lock()
            .iter()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, m)| match m {
                ServerMessage::MessagePackNotify { server_seq, packs } => Some((*server_seq, packs.clone())),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, user_id: UserId, pred: impl Fn(&ServerMessage) -> bool) -> usize {
        self.sent.lock().iter().filter(|(u, m)| *u == user_id && pred(m)).count()
    }
}

#[cfg(test)]
impl Transport for RecordingTransport {
    fn send(&self, user_id: UserId, message: ServerMessage) {
        self.sent.lock().push((user_id, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FirstChoicePolicy;
    use uuid::Uuid;

    #[test]
    fn test_automated_controller_is_ready_immediately() {
        let ai = Controller::new(2, Box::new(AutomatedSeat::new(2, Box::new(FirstChoicePolicy::new()))));
        assert_eq!(ai.load_state(), LoadState::InitFinish);
        assert!(ai.is_automated());
        assert_eq!(ai.user_id(), None);

        let transport = Arc::new(RecordingTransport::default());
        let user_id = Uuid::new_v4();
        let human = Controller::new(1, Box::new(HumanSeat::new(user_id, transport.clone())));
        assert_eq!(human.load_state(), LoadState::None);
        assert_eq!(human.user_id(), Some(user_id));
        assert!(human.allow());
        assert!(human.selected_card().is_none());
    }

    #[test]
    fn test_human_seat_forwards_to_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let user_id = Uuid::new_v4();
        let human = Controller::new(1, Box::new(HumanSeat::new(user_id, transport.clone())));
        human.notify(&ServerMessage::HeartBeat { server_seq: 3 });
        let sent = transport.all();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, user_id);
        assert!(matches!(sent[0].1, ServerMessage::HeartBeat { server_seq: 3 }));
    }
}
