use crate::card::{CardGuid, CardInstance, ControllerId, DiceSide};
use crate::catalog::Catalog;
use crate::config::DuelConfig;
use crate::controller::{Controller, LoadState};
use crate::error::{DuelError, Result};
use crate::message::{
    AllowMap, DuelBrief, DuelSnapshot, MessagePack, PhaseSnapshot, PlayerBrief, PlayerField, ShowInfo,
};
use crate::phase::PhaseTable;
use crate::profile::Profiles;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub type DuelId = u32;
pub type UserId = Uuid;
pub type RoomId = Uuid;

/// 对局阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    None,
    Start,   // 开始
    Draw,    // 抽取手牌
    OnStage, // 选择出战角色
    Dice,    // 投掷骰子
    PreMain, // 战斗开始
    Main,    // 行动
}

/// 对局运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuelState {
    Waiting, // 等待玩家加载
    Running, // 运行中
    Stopped, // 已结束
}

/// 对局回合信息
#[derive(Debug, Clone)]
pub struct RoundInfo {
    pub round: u32,
    pub phase: Phase,
    pub first_controller: ControllerId, // 当前回合先手的操控者
    pub dice: BTreeMap<ControllerId, Vec<DiceSide>>,
}

/// 对局共享的只读环境
#[derive(Clone)]
pub struct DuelContext {
    pub phases: Arc<PhaseTable>,
    pub catalog: Arc<dyn Catalog>,
    pub config: Arc<DuelConfig>,
}

/// 一局对局
///
/// 对局本身是单线程的，所有修改都在持有该对局锁的情况下同步完成。
/// 消息先进入待发送区，由最外层的阶段切换统一提交。
pub struct Duel {
    pub(crate) guid: DuelId,
    pub(crate) scenario_id: u32,
    pub(crate) state: DuelState,
    pub(crate) tick: u32,
    pub(crate) server_seq: u32,
    pub(crate) controller_id_counter: u32,
    pub(crate) card_guid_counter: u32,
    pub(crate) round: RoundInfo,
    // 按Id排序，保证消息顺序稳定
    pub(crate) controllers: BTreeMap<ControllerId, Controller>,
    pub(crate) pending: Vec<MessagePack>,
    // 当前嵌套的阶段切换层数，只有最外层负责提交
    pub(crate) phase_depth: u32,
    pub(crate) history_packs: Vec<MessagePack>,
    pub(crate) history_cards: Vec<CardInstance>,
    pub(crate) ctx: DuelContext,
    pub(crate) rng: StdRng,
}

impl Duel {
    pub fn new(guid: DuelId, scenario_id: u32, ctx: DuelContext) -> Self {
        let rng = match ctx.config.dice_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        Duel {
            guid,
            scenario_id,
            state: DuelState::Waiting,
            tick: 0,
            server_seq: 0,
            controller_id_counter: 0,
            card_guid_counter: 0,
            round: RoundInfo {
                round: 1,            // 默认以第一回合开始
                phase: Phase::None,
                first_controller: 1, // 1号操控者为先手
                dice: BTreeMap::new(),
            },
            controllers: BTreeMap::new(),
            pending: Vec::with_capacity(10),
            phase_depth: 0,
            history_packs: Vec::with_capacity(50),
            history_cards: Vec::with_capacity(100),
            ctx,
            rng,
        }
    }

    pub fn guid(&self) -> DuelId {
        self.guid
    }

    pub fn scenario_id(&self) -> u32 {
        self.scenario_id
    }

    pub fn state(&self) -> DuelState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.round.phase
    }

    pub fn server_seq(&self) -> u32 {
        self.server_seq
    }

    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.controllers.values()
    }

    pub fn controller(&self, id: ControllerId) -> Result<&Controller> {
        self.controllers.get(&id).ok_or(DuelError::ControllerNotFound(id))
    }

    /// 通过玩家Id获取操控者
    pub fn controller_by_user(&self, user_id: UserId) -> Result<&Controller> {
        self.controllers
            .values()
            .find(|c| c.user_id() == Some(user_id))
            .ok_or(DuelError::NotInDuel(user_id))
    }

    /// 对局中所有真人玩家
    pub fn human_users(&self) -> Vec<UserId> {
        self.controllers.values().filter_map(|c| c.user_id()).collect()
    }

    pub fn dice(&self, id: ControllerId) -> &[DiceSide] {
        self.round.dice.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// 待发送区中尚未提交的消息包
    pub fn pending(&self) -> &[MessagePack] {
        &self.pending
    }

    pub fn history_packs(&self) -> &[MessagePack] {
        &self.history_packs
    }

    pub fn history_cards(&self) -> &[CardInstance] {
        &self.history_cards
    }

    pub fn allow_map(&self) -> AllowMap {
        self.controllers.values().map(|c| (c.id(), c.allow())).collect()
    }

    /// 所有操控者当前场上的卡牌
    pub fn cards(&self) -> impl Iterator<Item = &CardInstance> {
        self.controllers
            .values()
            .flat_map(|c| c.active_zone().iter().chain(c.hand().iter()))
    }

    pub fn card(&self, guid: CardGuid) -> Option<&CardInstance> {
        self.cards().find(|c| c.guid == guid)
    }

    /// 生成发给指定操控者的完整对局数据
    pub fn snapshot(&self, controller_id: ControllerId, profiles: &dyn Profiles) -> DuelSnapshot {
        let cards: Vec<CardInstance> = self.cards().cloned().collect();
        DuelSnapshot {
            server_seq: self.server_seq,
            controller_id,
            round: self.round.round,
            phase: PhaseSnapshot { phase: self.round.phase, allow: self.allow_map() },
            show_infos: self
                .controllers
                .values()
                .map(|c| ShowInfo {
                    controller_id: c.id(),
                    profile: c.user_id().and_then(|u| profiles.profile(u)),
                })
                .collect(),
            fields: self
                .controllers
                .values()
                .map(|c| PlayerField {
                    controller_id: c.id(),
                    active_zone: c.active_zone().iter().map(|card| card.guid).collect(),
                    hand: c.hand().iter().map(|card| card.guid).collect(),
                    selected: c.selected_guid(),
                    dice_count: self.dice(c.id()).len() as u32,
                })
                .collect(),
            card_ids: cards.iter().map(|c| c.card_id).collect(),
            cards,
            history_cards: self.history_cards.clone(),
            history_packs: self.history_packs.clone(),
        }
    }

    /// 对局创建时下发的简要信息
    pub fn brief(&self, profiles: &dyn Profiles) -> DuelBrief {
        DuelBrief {
            duel_id: self.guid,
            scenario_id: self.scenario_id,
            players: self
                .controllers
                .values()
                .map(|c| PlayerBrief {
                    controller_id: c.id(),
                    user_id: c.user_id(),
                    profile: c.user_id().and_then(|u| profiles.profile(u)),
                    card_ids: c.active_zone().iter().map(|card| card.card_id).collect(),
                })
                .collect(),
        }
    }

    /// 所有操控者是否加载完毕
    pub fn all_init_finished(&self) -> bool {
        self.controllers.values().all(|c| c.load_state() == LoadState::InitFinish)
    }
}
