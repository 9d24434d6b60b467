use crate::card::{CardGuid, CardInstance, ControllerId, DiceSide, SkillInfo, TokenKind};
use crate::controller::{AutomatedSeat, Controller, HumanSeat, LoadState, Transport};
use crate::error::{DuelError, Result};
use crate::message::{ActionKind, DuelMessage, MessagePack, Operation, PerformKind, Reason, ServerMessage};
use crate::policy::Policy;
use crate::state::{Duel, DuelState, Phase, UserId};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

// --- 座位与发牌 ---

impl Duel {
    /// 添加真人操控者，并发放初始角色牌
    pub fn add_human(&mut self, user_id: UserId, transport: Arc<dyn Transport>) -> ControllerId {
        let id = self.next_controller_id();
        self.seat_controller(Controller::new(id, Box::new(HumanSeat::new(user_id, transport))), true)
    }

    /// 添加AI操控者，并发放初始角色牌
    pub fn add_automated(&mut self, policy: Box<dyn Policy>) -> ControllerId {
        let id = self.next_controller_id();
        self.seat_controller(Controller::new(id, Box::new(AutomatedSeat::new(id, policy))), false)
    }

    fn next_controller_id(&mut self) -> ControllerId {
        self.controller_id_counter += 1;
        self.controller_id_counter
    }

    fn seat_controller(&mut self, controller: Controller, human: bool) -> ControllerId {
        let id = controller.id();
        self.controllers.insert(id, controller);
        let roster = if human {
            self.ctx.config.human_roster.clone()
        } else {
            self.ctx.config.automated_roster.clone()
        };
        for card_id in roster {
            // 配置缺失时该玩家拿不到这张牌，对局照常进行
            let _ = self.give_card(id, card_id);
        }
        id
    }

    /// 给予操控者角色卡牌
    pub fn give_card(&mut self, controller_id: ControllerId, card_id: u32) -> Result<CardGuid> {
        if !self.controllers.contains_key(&controller_id) {
            return Err(DuelError::ControllerNotFound(controller_id));
        }
        let catalog = Arc::clone(&self.ctx.catalog);
        let Some(def) = catalog.card(card_id) else {
            warn!("卡牌配置不存在, duel: {}, card_id: {}", self.guid, card_id);
            return Err(DuelError::UnknownCatalogEntry(card_id));
        };
        let mut skills = Vec::with_capacity(def.skills.len());
        for skill_id in &def.skills {
            let Some(skill) = catalog.skill(*skill_id) else {
                warn!("技能配置不存在, duel: {}, card_id: {}, skill_id: {}", self.guid, card_id, skill_id);
                return Err(DuelError::UnknownCatalogEntry(*skill_id));
            };
            skills.push(SkillInfo {
                skill_id: *skill_id,
                cost: skill.cost.clone(),
                damage: skill.damage,
            });
        }

        self.card_guid_counter += 1;
        let card = CardInstance {
            card_id,
            guid: self.card_guid_counter,
            controller_id,
            face_type: 0,
            tags: def.tags.clone(),
            tokens: BTreeMap::from([
                (TokenKind::CurHealth, def.hp),
                (TokenKind::MaxHealth, def.hp),
                (TokenKind::CurEnergy, 0),
                (TokenKind::MaxEnergy, def.max_energy),
            ]),
            skills,
            skill_limits: vec![],
            is_show: true,
        };
        let guid = card.guid;
        // 记录历史卡牌，供中途加入的玩家回放
        self.history_cards.push(card.clone());
        if let Some(controller) = self.controllers.get_mut(&controller_id) {
            controller.push_active(card);
        }
        Ok(guid)
    }
}

// --- 消息日志 ---

impl Duel {
    /// 添加消息包至待发送区
    pub fn append(&mut self, controller_id: ControllerId, action: ActionKind, messages: Vec<DuelMessage>) {
        self.pending.push(MessagePack::new(controller_id, action, messages));
    }

    /// 提交待发送区的所有消息包
    ///
    /// 对局运行中才会发给各操控者，否则只记入历史。
    pub fn flush(&mut self) {
        // 不发送空的消息包
        if self.pending.is_empty() {
            return;
        }
        let packs = std::mem::take(&mut self.pending);
        if self.state == DuelState::Running {
            self.server_seq += 1;
            let notify = ServerMessage::MessagePackNotify { server_seq: self.server_seq, packs: packs.clone() };
            for controller in self.controllers.values() {
                // 确保加载完成
                if controller.load_state() == LoadState::InitFinish {
                    controller.notify(&notify);
                }
            }
        }
        self.history_packs.extend(packs);
    }

    fn msg_update_controller(&self) -> DuelMessage {
        DuelMessage::UpdateController { allow: self.allow_map() }
    }
}

// --- 阶段与权限 ---

impl Duel {
    /// 更改对局阶段
    ///
    /// 阶段处理函数中可以再次切换阶段，嵌套的切换只会追加消息，
    /// 整条调用链的消息由最外层的切换一次性提交。
    pub fn change_phase(&mut self, phase: Phase) {
        let before = self.round.phase;
        self.round.phase = phase;
        self.phase_depth += 1;

        let allow = match phase {
            Phase::OnStage | Phase::Dice => {
                self.set_all_allow(true, false);
                self.allow_map()
            }
            Phase::Main => {
                // 只保留原本就允许操作的操控者
                let allowed: Vec<ControllerId> =
                    self.controllers.values().filter(|c| c.allow()).map(|c| c.id()).collect();
                for id in &allowed {
                    self.set_controller_allow(*id, true, false);
                }
                allowed.into_iter().map(|id| (id, true)).collect()
            }
            _ => Vec::new(),
        };
        self.append(0, ActionKind::NextPhase, vec![DuelMessage::PhaseChange { before, after: phase, allow }]);

        let phases = Arc::clone(&self.ctx.phases);
        phases.dispatch(phase, self);

        self.phase_depth -= 1;
        if self.phase_depth == 0 {
            self.flush();
        }
    }

    /// 当前是否处于阶段切换的调用链中
    pub fn in_phase_transition(&self) -> bool {
        self.phase_depth > 0
    }

    /// 设置操控者是否允许操作
    pub(crate) fn set_controller_allow(&mut self, controller_id: ControllerId, allow: bool, add_msg: bool) {
        if let Some(controller) = self.controllers.get_mut(&controller_id) {
            controller.set_allow(allow);
        }
        if add_msg {
            self.append(0, ActionKind::None, vec![self.msg_update_controller()]);
        }
    }

    pub(crate) fn set_all_allow(&mut self, allow: bool, add_msg: bool) {
        for controller in self.controllers.values_mut() {
            controller.set_allow(allow);
        }
        if add_msg {
            self.append(0, ActionKind::None, vec![self.msg_update_controller()]);
        }
    }

    /// 设置除了指定的操控者以外的是否允许操作
    pub(crate) fn set_except_allow(&mut self, controller_id: ControllerId, allow: bool, add_msg: bool) {
        for controller in self.controllers.values_mut().filter(|c| c.id() != controller_id) {
            controller.set_allow(allow);
        }
        if add_msg {
            self.append(0, ActionKind::None, vec![self.msg_update_controller()]);
        }
    }
}

// --- 对局生命周期 ---

impl Duel {
    /// 进入开始阶段，此时对局仍在等待玩家加载
    pub fn init_game(&mut self) {
        self.state = DuelState::Waiting;
        self.change_phase(Phase::Start);
    }

    /// 玩家请求对局数据
    pub fn ask_duel(&mut self, controller_id: ControllerId) -> Result<()> {
        let controller = self.controllers.get_mut(&controller_id).ok_or(DuelError::ControllerNotFound(controller_id))?;
        controller.set_load_state(LoadState::AskDuel);
        self.server_seq += 1;
        Ok(())
    }

    /// 玩家加载完成，所有人都完成后开始对局
    pub fn init_finish(&mut self, controller_id: ControllerId) -> Result<()> {
        let controller = self.controllers.get_mut(&controller_id).ok_or(DuelError::ControllerNotFound(controller_id))?;
        controller.set_load_state(LoadState::InitFinish);
        self.check_all_init_finish();
        Ok(())
    }

    fn check_all_init_finish(&mut self) {
        if self.state == DuelState::Running {
            debug!("对局 {} 已在运行中", self.guid);
            return;
        }
        if self.state == DuelState::Stopped || !self.all_init_finished() {
            return;
        }
        self.start_game();
    }

    fn start_game(&mut self) {
        self.state = DuelState::Running;
        info!("对局 {} 开始运行", self.guid);

        // 游戏开始设置所有玩家不允许操作
        self.set_all_allow(false, true);
        // 分配先手
        let first = self.round.first_controller;
        self.append(0, ActionKind::PhaseExit, vec![DuelMessage::ClientPerform {
            perform: PerformKind::FirstHand,
            params: vec![first],
        }]);
        self.change_phase(Phase::Draw);
    }

    pub fn stop(&mut self) {
        self.flush();
        self.state = DuelState::Stopped;
    }

    /// 对局的tick，仅在运行中计数
    pub fn on_tick(&mut self) {
        if self.state != DuelState::Running {
            return;
        }
        let period = self.ctx.config.heartbeat_ticks.max(1);
        if self.tick % period == 0 {
            let heartbeat = ServerMessage::HeartBeat { server_seq: self.server_seq };
            for controller in self.controllers.values().filter(|c| !c.is_automated()) {
                controller.notify(&heartbeat);
            }
        }
        self.tick += 1;
    }
}

// --- 操控者操作 ---

impl Duel {
    /// 处理操控者的一次操作
    pub fn operate(&mut self, controller_id: ControllerId, op: Operation) -> Result<()> {
        let result = match op {
            Operation::SelectActiveCard { card_guid, cost_dice } => {
                self.select_active_card(controller_id, card_guid, &cost_dice)
            }
            Operation::ConfirmReroll { dice_indices } => self.confirm_reroll(controller_id, &dice_indices),
            Operation::UseSkill { skill_id, cost_dice } => self.use_skill(controller_id, skill_id, &cost_dice),
            Operation::Unknown => Err(DuelError::UnhandledAction),
        };
        if let Err(e) = &result {
            debug!("对局 {} 拒绝了操控者 {} 的操作: {}", self.guid, controller_id, e);
        }
        result
    }

    /// 检查操控者存在且允许操作
    fn ensure_allowed(&self, controller_id: ControllerId) -> Result<&Controller> {
        let controller = self.controller(controller_id)?;
        if !controller.allow() {
            return Err(DuelError::ActionNotAllowed(controller_id));
        }
        Ok(controller)
    }

    /// 判断骰子索引是否有效
    fn validate_dice(&self, controller_id: ControllerId, indices: &[u32]) -> Result<()> {
        let faces = self.dice(controller_id).len();
        let mut seen = HashSet::with_capacity(indices.len());
        for &index in indices {
            if index as usize >= faces || !seen.insert(index) {
                return Err(DuelError::DiceIndexInvalid(index));
            }
        }
        Ok(())
    }

    /// 消耗指定的骰子，调用前需已校验
    fn take_dice(&mut self, controller_id: ControllerId, indices: &[u32]) {
        let Some(faces) = self.round.dice.get_mut(&controller_id) else {
            return;
        };
        let mut sorted: Vec<usize> = indices.iter().map(|&i| i as usize).collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        for index in sorted {
            faces.remove(index);
        }
    }

    /// 操控者选择出战角色卡牌
    pub fn select_active_card(&mut self, controller_id: ControllerId, card_guid: CardGuid, cost_dice: &[u32]) -> Result<()> {
        let controller = self.ensure_allowed(controller_id)?;
        let phase = self.round.phase;
        if !matches!(phase, Phase::OnStage | Phase::Main) {
            return Err(DuelError::WrongPhase(phase));
        }
        if controller.active_card(card_guid).is_none() {
            return Err(DuelError::CardNotOwned(card_guid));
        }
        // 角色卡牌仅在未选择时无需消耗元素骰子
        let switching = controller.selected_guid() != 0;
        if switching {
            if cost_dice.is_empty() {
                return Err(DuelError::CostRequired);
            }
            self.validate_dice(controller_id, cost_dice)?;
        }

        let mut messages = Vec::with_capacity(2);
        if switching {
            // TODO: 按目录中的切换费用校验骰子数量与元素
            self.take_dice(controller_id, cost_dice);
            messages.push(DuelMessage::CostDice {
                controller_id,
                reason: Reason::Cost,
                dice_indices: cost_dice.to_vec(),
            });
        }
        messages.push(DuelMessage::SelectOnStage { controller_id, card_guid, reason: Reason::Default });
        if let Some(controller) = self.controllers.get_mut(&controller_id) {
            controller.set_selected(card_guid);
        }

        if phase == Phase::Main {
            // 行动阶段切换角色视为一次行动，交给对手
            self.set_except_allow(controller_id, true, false);
            self.set_controller_allow(controller_id, false, true);
            self.append(controller_id, ActionKind::SelectOnStage, messages);
            self.change_phase(Phase::Main);
            return Ok(());
        }

        // 设置玩家禁止操作
        self.set_controller_allow(controller_id, false, true);
        self.append(controller_id, ActionKind::SelectOnStage, messages);

        let all_selected = self.controllers.values().all(|c| c.selected_guid() != 0);
        if all_selected {
            self.append(0, ActionKind::SendMessage, vec![DuelMessage::DuelDataChange { round: self.round.round }]);
            self.change_phase(Phase::Dice);
        } else {
            // 跳过该阶段并立刻发送
            self.append(0, ActionKind::SendMessage, vec![DuelMessage::PhaseContinue]);
            self.flush();
        }
        Ok(())
    }

    /// 操控者确认重投骰子
    pub fn confirm_reroll(&mut self, controller_id: ControllerId, dice_indices: &[u32]) -> Result<()> {
        let controller = self.ensure_allowed(controller_id)?;
        let automated = controller.is_automated();
        if self.round.phase != Phase::Dice {
            return Err(DuelError::WrongPhase(self.round.phase));
        }
        self.validate_dice(controller_id, dice_indices)?;

        if !dice_indices.is_empty() {
            let mut rerolled = self.round.dice.get(&controller_id).cloned().unwrap_or_default();
            for &index in dice_indices {
                rerolled[index as usize] = DiceSide::roll(&mut self.rng);
            }
            let message = DuelMessage::DiceRoll {
                controller_id,
                dice_num: rerolled.len() as u32,
                sides: if automated { vec![] } else { rerolled.clone() },
            };
            self.round.dice.insert(controller_id, rerolled);
            self.append(controller_id, ActionKind::Roll, vec![message]);
        }

        self.set_all_allow(false, true);
        self.change_phase(Phase::PreMain);
        Ok(())
    }

    /// 操控者使用技能
    ///
    /// 技能的消息按 消耗骰子 -> 技能开始 -> 目标数值变化 -> 技能结果 -> 技能结束 -> 自身充能
    /// 的固定顺序放入同一个消息包，客户端据此先播放原因再播放结果。
    pub fn use_skill(&mut self, controller_id: ControllerId, skill_id: u32, cost_dice: &[u32]) -> Result<()> {
        let controller = self.ensure_allowed(controller_id)?;
        if self.round.phase != Phase::Main {
            return Err(DuelError::WrongPhase(self.round.phase));
        }
        let actor_card = controller.selected_card().ok_or(DuelError::NoActiveCard)?;
        let actor_guid = actor_card.guid;
        let damage = actor_card.skill(skill_id).ok_or(DuelError::SkillNotOwned(skill_id))?.damage;
        // 对方出战的角色牌
        let (target_owner, target_guid) = self
            .controllers
            .values()
            .filter(|c| c.id() != controller_id)
            .find_map(|c| c.selected_card().map(|card| (c.id(), card.guid)))
            .ok_or(DuelError::NoTargetSelected)?;
        self.validate_dice(controller_id, cost_dice)?;

        self.take_dice(controller_id, cost_dice);
        // 仅更新此操控者的allow
        self.set_except_allow(controller_id, true, false);
        self.set_controller_allow(controller_id, false, true);

        let mut messages = Vec::with_capacity(6);
        messages.push(DuelMessage::CostDice { controller_id, reason: Reason::Cost, dice_indices: cost_dice.to_vec() });
        messages.push(DuelMessage::UseSkill { card_guid: actor_guid, skill_id });
        if let Some(target) = self.controllers.get_mut(&target_owner).and_then(|c| c.active_card_mut(target_guid)) {
            let (before, after) = target.take_damage(damage);
            messages.push(DuelMessage::TokenChange {
                card_guid: target_guid,
                reason: Reason::EffectDamage,
                token: TokenKind::CurHealth,
                before,
                after,
            });
        }
        messages.push(DuelMessage::SkillResult { target_card_guid: target_guid, skill_id, damage });
        messages.push(DuelMessage::UseSkillEnd { card_guid: actor_guid, skill_id });
        // 因为使用技能自身充能+1
        if let Some(actor) = self.controllers.get_mut(&controller_id).and_then(|c| c.active_card_mut(actor_guid)) {
            let (before, after) = actor.charge(1);
            messages.push(DuelMessage::TokenChange {
                card_guid: actor_guid,
                reason: Reason::Attack,
                token: TokenKind::CurEnergy,
                before,
                after,
            });
        }
        self.append(controller_id, ActionKind::Attack, messages);
        self.change_phase(Phase::Main);
        Ok(())
    }

    /// 执行AI计划的操作，直到没有新的操作或达到上限
    pub fn run_automated(&mut self) {
        for _ in 0..self.ctx.config.max_automated_steps {
            let planned: Vec<(ControllerId, Operation)> = self
                .controllers
                .values()
                .filter(|c| c.is_automated())
                .flat_map(|c| c.plan().into_iter().map(move |op| (c.id(), op)))
                .collect();
            if planned.is_empty() {
                return;
            }
            for (controller_id, op) in planned {
                // 被拒绝的操作已在 operate 中记录
                let _ = self.operate(controller_id, op);
            }
        }
        warn!("对局 {} 的AI操作达到上限 {}", self.guid, self.ctx.config.max_automated_steps);
    }
}
