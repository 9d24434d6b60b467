//! AI 操控者的决策
//!
//! AI 与真人一样只通过消息包了解对局，观察到轮到自己时记下意图，
//! 由注册表在本次请求处理完之后取出并执行。

use crate::card::ControllerId;
use crate::controller::Controller;
use crate::message::{DuelMessage, MessagePack, Operation};
use crate::state::Phase;
use parking_lot::Mutex;
use std::collections::VecDeque;

pub trait Policy: Send + Sync {
    fn observe(&self, me: ControllerId, packs: &[MessagePack]);
    fn plan(&self, me: &Controller) -> Vec<Operation>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    SelectFirst,
    Attack,
}

/// 总是选择第一个可用选项的AI
#[derive(Debug, Default)]
pub struct FirstChoicePolicy {
    pending: Mutex<VecDeque<Intent>>,
}

impl FirstChoicePolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for FirstChoicePolicy {
    fn observe(&self, me: ControllerId, packs: &[MessagePack]) {
        let mut pending = self.pending.lock();
        for msg in packs.iter().flat_map(|p| p.messages.iter()) {
            if let DuelMessage::PhaseChange { after, allow, .. } = msg {
                if !allow.contains(&(me, true)) {
                    continue;
                }
                let intent = match after {
                    Phase::OnStage => Intent::SelectFirst,
                    // 重投由真人确认，AI不抢先结束投骰阶段
                    Phase::Main => Intent::Attack,
                    _ => continue,
                };
                pending.push_back(intent);
            }
        }
    }

    fn plan(&self, me: &Controller) -> Vec<Operation> {
        let mut ops = Vec::new();
        for intent in self.pending.lock().drain(..) {
            let op = match intent {
                Intent::SelectFirst => me.active_zone().first().map(|c| Operation::SelectActiveCard {
                    card_guid: c.guid,
                    cost_dice: vec![],
                }),
                Intent::Attack => me.selected_card().and_then(|c| c.skills.first()).map(|s| Operation::UseSkill {
                    skill_id: s.skill_id,
                    cost_dice: vec![],
                }),
            };
            ops.extend(op);
        }
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ActionKind;

    fn phase_pack(after: Phase, allow: Vec<(ControllerId, bool)>) -> MessagePack {
        MessagePack::new(0, ActionKind::NextPhase, vec![DuelMessage::PhaseChange { before: Phase::None, after, allow }])
    }

    #[test]
    fn test_observe_ignores_phases_without_permission() {
        let policy = FirstChoicePolicy::new();
        policy.observe(2, &[
            phase_pack(Phase::OnStage, vec![(1, true), (2, false)]),
            phase_pack(Phase::Main, vec![(1, true)]),
            phase_pack(Phase::Dice, vec![(1, true), (2, true)]),
        ]);
        assert!(policy.pending.lock().is_empty());

        policy.observe(2, &[phase_pack(Phase::OnStage, vec![(1, true), (2, true)]), phase_pack(Phase::Main, vec![(2, true)])]);
        assert_eq!(policy.pending.lock().iter().copied().collect::<Vec<_>>(), vec![Intent::SelectFirst, Intent::Attack]);
    }
}
