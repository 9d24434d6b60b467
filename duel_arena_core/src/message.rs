use crate::card::{CardGuid, CardInstance, ControllerId, CostKind, DiceSide, TokenKind};
use crate::profile::PlayerProfile;
use crate::state::{DuelId, Phase, RoomId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 操控者是否允许操作的列表
pub type AllowMap = Vec<(ControllerId, bool)>;

// --- 对局消息日志 ---
// 一个消息包 (MessagePack) 由一次逻辑动作或阶段切换产生，
// 客户端按顺序回放其中的消息来播放动画。

/// 消息包的动作类型
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    None,
    SendMessage,
    NextPhase,
    Roll,
    SelectOnStage,
    Attack,
    NotifyCost,
    PhaseExit,
}

/// 状态变化的原因
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Default,
    Cost,
    EffectDamage,
    Attack,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformKind {
    FirstHand, // 分配先手
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum DuelMessage {
    /// 阶段切换
    PhaseChange { before: Phase, after: Phase, allow: AllowMap },
    /// 跳过阶段 (无操作)
    PhaseContinue,
    /// 更新操控者允许状态
    UpdateController { allow: AllowMap },
    ClientPerform { perform: PerformKind, params: Vec<u32> },
    /// 切换出战角色
    SelectOnStage { controller_id: ControllerId, card_guid: CardGuid, reason: Reason },
    /// 回合信息变化
    DuelDataChange { round: u32 },
    /// 投掷骰子，AI只告知数量
    DiceRoll { controller_id: ControllerId, dice_num: u32, sides: Vec<DiceSide> },
    CostDice { controller_id: ControllerId, reason: Reason, dice_indices: Vec<u32> },
    UseSkill { card_guid: CardGuid, skill_id: u32 },
    UseSkillEnd { card_guid: CardGuid, skill_id: u32 },
    TokenChange { card_guid: CardGuid, reason: Reason, token: TokenKind, before: u32, after: u32 },
    SkillResult { target_card_guid: CardGuid, skill_id: u32, damage: u32 },
    CostRevise(CostRevise),
}

/// 消息包，controller_id 为 0 表示由系统产生
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessagePack {
    pub controller_id: ControllerId,
    pub action: ActionKind,
    pub messages: Vec<DuelMessage>,
}

/// 行动阶段的消耗信息
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CostRevise {
    pub controller_id: ControllerId,
    pub attack_costs: Vec<AttackCost>,
    pub switch_costs: Vec<SwitchCost>,
    pub can_attack: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AttackCost {
    pub skill_id: u32,
    pub cost: BTreeMap<CostKind, u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SwitchCost {
    pub card_guid: CardGuid,
    pub cost: BTreeMap<CostKind, u32>,
}

// --- 客户端 -> 服务器 的消息 ---

/// 对局内操作
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "op")]
pub enum Operation {
    /// 选择出战角色
    SelectActiveCard { card_guid: CardGuid, cost_dice: Vec<u32> },
    /// 确认重投骰子
    ConfirmReroll { dice_indices: Vec<u32> },
    /// 角色使用技能
    UseSkill { skill_id: u32, cost_dice: Vec<u32> },
    /// 无法识别的操作
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    // --- 房间管理消息 ---
    /// 创建房间，满员后开始对局
    CreateRoom { nickname: String, scenario_id: u32, seats: u8 },
    JoinRoom { room_id: RoomId, nickname: String },

    // --- 对局消息 ---
    /// 请求对局完整数据
    AskDuel,
    /// 客户端加载完成
    InitFinish,
    /// op_seq 由客户端分配，会在回包中原样返回
    Operation { op_seq: u32, op: Operation },
}

// --- 服务器 -> 客户端 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retcode {
    Succ,
    GameNotRunning,
    NotInDuel,
    SelectCardGuidError,
    DiceIndexInvalid,
    ActionNotAllowed,
    PhaseInvalid,
    CostNotEnough,
    TargetInvalid,
    SkillInvalid,
    ConfigError,
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ServerMessage {
    RoomJoined { your_id: UserId, room_id: RoomId, seats: u8, members: usize },
    /// 对局创建后的简要信息
    DuelBrief(DuelBrief),
    AskDuelRsp { retcode: Retcode, duel: Option<Box<DuelSnapshot>> },
    InitFinishRsp { retcode: Retcode },
    OperationRsp { op_seq: u32, retcode: Retcode },
    /// 一次提交的全部消息包
    MessagePackNotify { server_seq: u32, packs: Vec<MessagePack> },
    HeartBeat { server_seq: u32 },
    SkillPreview(SkillPreview),
    Info { message: String },
    Error { message: String },
}

// --- 快照与摘要 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PhaseSnapshot {
    pub phase: Phase,
    pub allow: AllowMap,
}

/// 对局内显示的头像名字
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ShowInfo {
    pub controller_id: ControllerId,
    pub profile: Option<PlayerProfile>,
}

/// 玩家牌盒信息
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerField {
    pub controller_id: ControllerId,
    pub active_zone: Vec<CardGuid>,
    pub hand: Vec<CardGuid>,
    pub selected: CardGuid,
    pub dice_count: u32,
}

/// 加入对局时下发的完整数据，中途加入的玩家据此回放
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DuelSnapshot {
    pub server_seq: u32,
    pub controller_id: ControllerId,
    pub round: u32,
    pub phase: PhaseSnapshot,
    pub show_infos: Vec<ShowInfo>,
    pub fields: Vec<PlayerField>,
    pub cards: Vec<CardInstance>,
    pub card_ids: Vec<u32>,
    pub history_cards: Vec<CardInstance>,
    pub history_packs: Vec<MessagePack>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerBrief {
    pub controller_id: ControllerId,
    pub user_id: Option<UserId>,
    pub profile: Option<PlayerProfile>,
    pub card_ids: Vec<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DuelBrief {
    pub duel_id: DuelId,
    pub scenario_id: u32,
    pub players: Vec<PlayerBrief>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SkillPreviewInfo {
    pub skill_id: u32,
    /// 对敌方出战角色造成的伤害
    pub damage: u32,
    /// 自身充能变化为的值
    pub energy_after: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SkillPreview {
    pub controller_id: ControllerId,
    pub onstage_card_guid: CardGuid,
    pub skills: Vec<SkillPreviewInfo>,
    /// 可切换到的其他角色牌
    pub switch_targets: Vec<CardGuid>,
}

impl From<Operation> for ClientMessage {
    fn from(op: Operation) -> Self {
        ClientMessage::Operation { op_seq: 0, op }
    }
}

impl MessagePack {
    pub fn new(controller_id: ControllerId, action: ActionKind, messages: Vec<DuelMessage>) -> Self {
        MessagePack { controller_id, action, messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_wire_format() {
        let op: Operation = serde_json::from_str(r#"{"op":"ConfirmReroll","dice_indices":[1,4]}"#).unwrap();
        assert_eq!(op, Operation::ConfirmReroll { dice_indices: vec![1, 4] });

        // 无法识别的操作不会导致解析失败
        let op: Operation = serde_json::from_str(r#"{"op":"PlayCard"}"#).unwrap();
        assert_eq!(op, Operation::Unknown);
    }

    #[test]
    fn test_operation_into_client_message() {
        let msg: ClientMessage = Operation::UseSkill { skill_id: 13011, cost_dice: vec![] }.into();
        assert!(matches!(msg, ClientMessage::Operation { op_seq: 0, op: Operation::UseSkill { skill_id: 13011, .. } }));
    }
}
