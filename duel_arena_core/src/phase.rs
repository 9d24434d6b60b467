//! 对局阶段处理
//!
//! 阶段处理函数登记在 `PhaseTable` 中，`Duel::change_phase` 切换阶段后按表分发。
//! 没有登记处理函数的阶段只是等待玩家操作的停留点。

use crate::card::{ControllerId, CostKind, DiceSide, TokenKind};
use crate::controller::Controller;
use crate::message::{
    ActionKind, AttackCost, CostRevise, DuelMessage, ServerMessage, SkillPreview, SkillPreviewInfo, SwitchCost,
};
use crate::state::{Duel, Phase};
use std::collections::{BTreeMap, HashMap};
use tracing::error;

pub type PhaseHandler = fn(&mut Duel);

/// 阶段处理函数表，创建后不再修改
#[derive(Clone, Default)]
pub struct PhaseTable {
    handlers: HashMap<Phase, PhaseHandler>,
}

impl PhaseTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 标准的阶段流程
    pub fn standard() -> Self {
        Self::empty()
            .with(Phase::Start, phase_start)
            .with(Phase::Draw, phase_draw)
            .with(Phase::Dice, phase_roll_dice)
            .with(Phase::PreMain, phase_pre_main)
            .with(Phase::Main, phase_main)
    }

    pub fn with(mut self, phase: Phase, handler: PhaseHandler) -> Self {
        self.handlers.insert(phase, handler);
        self
    }

    pub fn has_handler(&self, phase: Phase) -> bool {
        self.handlers.contains_key(&phase)
    }

    /// 执行该阶段的处理函数，返回是否存在处理函数
    pub fn dispatch(&self, phase: Phase, duel: &mut Duel) -> bool {
        match self.handlers.get(&phase) {
            Some(handler) => {
                handler(duel);
                true
            }
            None => false,
        }
    }
}

/// 阶段开始
fn phase_start(duel: &mut Duel) {
    // 设置除了先手的玩家不允许操控
    let first = duel.round.first_controller;
    duel.set_except_allow(first, false, true);
    duel.append(0, ActionKind::SendMessage, vec![DuelMessage::PhaseContinue]);
    // 等待玩家进入
}

/// 阶段抽取手牌
fn phase_draw(duel: &mut Duel) {
    duel.change_phase(Phase::OnStage);
}

/// 阶段投掷骰子
fn phase_roll_dice(duel: &mut Duel) {
    let count = duel.ctx.config.dice_per_round;
    let seats: Vec<(ControllerId, bool)> = duel.controllers().map(|c| (c.id(), c.is_automated())).collect();
    for (controller_id, automated) in seats {
        let sides: Vec<DiceSide> = (0..count).map(|_| DiceSide::roll(&mut duel.rng)).collect();
        // AI仅发送骰子数量
        let shown = if automated { vec![] } else { sides.clone() };
        duel.round.dice.insert(controller_id, sides);
        duel.append(controller_id, ActionKind::Roll, vec![DuelMessage::DiceRoll {
            controller_id,
            dice_num: count as u32,
            sides: shown,
        }]);
    }
    // 等待玩家确认重投骰子
}

/// 阶段战斗开始
fn phase_pre_main(duel: &mut Duel) {
    // 设置先手允许操控
    let first = duel.round.first_controller;
    duel.set_controller_allow(first, true, false);
    duel.change_phase(Phase::Main);
}

/// 阶段行动
fn phase_main(duel: &mut Duel) {
    let mut packs = Vec::new();
    for controller in duel.controllers().filter(|c| !c.is_automated()) {
        let Some(revise) = cost_revise(controller) else {
            error!("操控者 {} 没有出战角色, duel: {}", controller.id(), duel.guid());
            continue;
        };
        packs.push(DuelMessage::CostRevise(revise));
        if controller.allow() {
            if let Some(preview) = skill_preview(controller) {
                controller.notify(&ServerMessage::SkillPreview(preview));
            }
        }
    }
    for msg in packs {
        duel.append(0, ActionKind::NotifyCost, vec![msg]);
    }
}

/// 当前出战角色的消耗信息
fn cost_revise(controller: &Controller) -> Option<CostRevise> {
    let selected = controller.selected_card()?;
    Some(CostRevise {
        controller_id: controller.id(),
        attack_costs: selected
            .skills
            .iter()
            .map(|s| AttackCost { skill_id: s.skill_id, cost: s.cost.clone() })
            .collect(),
        // 切换角色固定消耗一个任意元素
        switch_costs: controller
            .active_zone()
            .iter()
            .filter(|c| c.guid != selected.guid)
            .map(|c| SwitchCost { card_guid: c.guid, cost: BTreeMap::from([(CostKind::Unaligned, 1)]) })
            .collect(),
        can_attack: true,
    })
}

/// 技能预览
fn skill_preview(controller: &Controller) -> Option<SkillPreview> {
    let selected = controller.selected_card()?;
    let energy_after = (selected.token(TokenKind::CurEnergy) + 1).min(selected.token(TokenKind::MaxEnergy));
    Some(SkillPreview {
        controller_id: controller.id(),
        onstage_card_guid: selected.guid,
        skills: selected
            .skills
            .iter()
            .map(|s| SkillPreviewInfo { skill_id: s.skill_id, damage: s.damage, energy_after })
            .collect(),
        switch_targets: controller
            .active_zone()
            .iter()
            .filter(|c| c.guid != selected.guid)
            .map(|c| c.guid)
            .collect(),
    })
}
