use crate::catalog::Catalog;
use crate::config::DuelConfig;
use crate::controller::Transport;
use crate::error::{DuelError, Result};
use crate::message::{DuelBrief, DuelSnapshot, Operation};
use crate::phase::PhaseTable;
use crate::policy::FirstChoicePolicy;
use crate::profile::Profiles;
use crate::state::{Duel, DuelContext, DuelId, UserId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

pub type SharedDuel = Arc<Mutex<Duel>>;

/// 对局管理器
///
/// 不同对局之间互不影响，可以并行处理；同一对局同一时间只允许一个操作修改。
/// 锁的顺序：先从表中取出对局的 Arc 并释放表的分片锁，再锁对局。
pub struct DuelRegistry {
    duels: DashMap<DuelId, SharedDuel>,
    // 玩家当前所在的对局
    seats: DashMap<UserId, DuelId>,
    guid_counter: AtomicU32,
    ctx: DuelContext,
    transport: Arc<dyn Transport>,
    profiles: Arc<dyn Profiles>,
}

impl DuelRegistry {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        transport: Arc<dyn Transport>,
        profiles: Arc<dyn Profiles>,
        config: DuelConfig,
    ) -> Self {
        Self::with_phases(PhaseTable::standard(), catalog, transport, profiles, config)
    }

    pub fn with_phases(
        phases: PhaseTable,
        catalog: Arc<dyn Catalog>,
        transport: Arc<dyn Transport>,
        profiles: Arc<dyn Profiles>,
        config: DuelConfig,
    ) -> Self {
        DuelRegistry {
            duels: DashMap::new(),
            seats: DashMap::new(),
            guid_counter: AtomicU32::new(0),
            ctx: DuelContext { phases: Arc::new(phases), catalog, config: Arc::new(config) },
            transport,
            profiles,
        }
    }

    pub fn len(&self) -> usize {
        self.duels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.duels.is_empty()
    }

    /// 创建对局
    ///
    /// 每位真人玩家一个操控者，不足的座位由AI补齐，随后同步执行开始阶段。
    pub fn create_duel(&self, scenario_id: u32, humans: &[UserId]) -> Result<SharedDuel> {
        if humans.is_empty() {
            return Err(DuelError::NoHumanParticipants);
        }
        let guid = self.guid_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut duel = Duel::new(guid, scenario_id, self.ctx.clone());
        for user_id in humans {
            duel.add_human(*user_id, Arc::clone(&self.transport));
        }
        while duel.controllers.len() < self.ctx.config.seats {
            duel.add_automated(Box::new(FirstChoicePolicy::new()));
        }
        duel.init_game();

        let shared = Arc::new(Mutex::new(duel));
        self.duels.insert(guid, Arc::clone(&shared));
        for user_id in humans {
            self.seats.insert(*user_id, guid);
        }
        info!("创建对局 {}，场景 {}，真人玩家 {} 位", guid, scenario_id, humans.len());
        Ok(shared)
    }

    /// 销毁对局
    pub fn destroy_duel(&self, duel_id: DuelId) -> Result<()> {
        let (_, duel) = self.duels.remove(&duel_id).ok_or(DuelError::DuelNotFound(duel_id))?;
        let mut duel = duel.lock();
        duel.stop();
        for user_id in duel.human_users() {
            self.seats.remove_if(&user_id, |_, id| *id == duel_id);
        }
        info!("对局 {} 已销毁", duel_id);
        Ok(())
    }

    pub fn get(&self, duel_id: DuelId) -> Result<SharedDuel> {
        self.duels
            .get(&duel_id)
            .map(|d| Arc::clone(d.value()))
            .ok_or(DuelError::DuelNotFound(duel_id))
    }

    /// 玩家所在的对局
    pub fn duel_of(&self, user_id: UserId) -> Result<SharedDuel> {
        let duel_id = self.seats.get(&user_id).map(|id| *id).ok_or(DuelError::NotInDuel(user_id))?;
        self.get(duel_id)
    }

    pub fn brief(&self, duel_id: DuelId) -> Result<DuelBrief> {
        let duel = self.get(duel_id)?;
        let brief = duel.lock().brief(self.profiles.as_ref());
        Ok(brief)
    }

    /// 玩家请求对局数据
    pub fn ask_duel(&self, user_id: UserId) -> Result<DuelSnapshot> {
        let duel = self.duel_of(user_id)?;
        let mut duel = duel.lock();
        let controller_id = duel.controller_by_user(user_id)?.id();
        duel.ask_duel(controller_id)?;
        Ok(duel.snapshot(controller_id, self.profiles.as_ref()))
    }

    /// 玩家加载完成
    pub fn init_finish(&self, user_id: UserId) -> Result<()> {
        let duel = self.duel_of(user_id)?;
        let mut duel = duel.lock();
        let controller_id = duel.controller_by_user(user_id)?.id();
        duel.init_finish(controller_id)?;
        duel.run_automated();
        Ok(())
    }

    /// 玩家在对局内的操作
    pub fn operate(&self, user_id: UserId, op: Operation) -> Result<()> {
        let duel = self.duel_of(user_id)?;
        let mut duel = duel.lock();
        let controller_id = duel.controller_by_user(user_id)?.id();
        duel.operate(controller_id, op)?;
        duel.run_automated();
        Ok(())
    }

    /// 驱动所有对局的tick
    pub fn tick_all(&self) {
        let duels: Vec<SharedDuel> = self.duels.iter().map(|d| Arc::clone(d.value())).collect();
        for duel in duels {
            duel.lock().on_tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::TokenKind;
    use crate::catalog::StaticCatalog;
    use crate::controller::RecordingTransport;
    use crate::message::{MessagePack, ServerMessage};
    use crate::profile::{PlayerProfile, ProfileBook};
    use crate::state::{DuelState, Phase};
    use uuid::Uuid;

    fn setup_registry() -> (DuelRegistry, Arc<RecordingTransport>, Arc<ProfileBook>) {
        let transport = Arc::new(RecordingTransport::default());
        let profiles = Arc::new(ProfileBook::new());
        let registry = DuelRegistry::new(
            Arc::new(StaticCatalog::builtin()),
            transport.clone(),
            profiles.clone(),
            DuelConfig { dice_seed: Some(42), ..DuelConfig::default() },
        );
        (registry, transport, profiles)
    }

    #[test]
    fn test_create_duel_requires_a_human() {
        let (registry, _, _) = setup_registry();
        assert!(matches!(registry.create_duel(1, &[]), Err(DuelError::NoHumanParticipants)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_duel_fills_seats_with_automated() {
        let (registry, _, profiles) = setup_registry();
        let user = Uuid::new_v4();
        profiles.insert(user, PlayerProfile { nickname: "Lumine".to_string(), avatar_id: 1, costume_id: 0 });

        let duel = registry.create_duel(7, &[user]).unwrap();
        let duel_id = duel.lock().guid();
        assert_eq!(duel_id, 1);
        assert_eq!(duel.lock().phase(), Phase::Start);
        assert_eq!(registry.len(), 1);

        let brief = registry.brief(duel_id).unwrap();
        assert_eq!(brief.scenario_id, 7);
        assert_eq!(brief.players.len(), 2);
        assert_eq!(brief.players[0].user_id, Some(user));
        assert_eq!(brief.players[0].profile.as_ref().map(|p| p.nickname.as_str()), Some("Lumine"));
        assert_eq!(brief.players[0].card_ids, vec![1301, 1103]);
        assert_eq!(brief.players[1].user_id, None);
        assert_eq!(brief.players[1].card_ids, vec![3001, 3302]);

        // 第二局的Id递增
        let other = registry.create_duel(7, &[Uuid::new_v4()]).unwrap();
        assert_eq!(other.lock().guid(), 2);
    }

    #[test]
    fn test_create_duel_with_two_humans() {
        let (registry, transport, _) = setup_registry();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let duel = registry.create_duel(1, &[u1, u2]).unwrap();

        {
            let duel = duel.lock();
            // 座位已满，不补AI
            assert_eq!(duel.controllers().count(), 2);
            assert!(duel.controllers().all(|c| !c.is_automated()));
            assert_eq!(duel.phase(), Phase::Start);
            assert_eq!(duel.allow_map(), vec![(1, true), (2, false)]);
            assert_eq!(duel.human_users(), vec![u1, u2]);
        }
        assert!(Arc::ptr_eq(&registry.duel_of(u1).unwrap(), &registry.duel_of(u2).unwrap()));
        assert!(transport.all().is_empty());

        registry.init_finish(u1).unwrap();
        assert_eq!(duel.lock().state(), DuelState::Waiting);
        registry.init_finish(u2).unwrap();
        assert_eq!(duel.lock().phase(), Phase::OnStage);
    }

    #[test]
    fn test_duels_run_in_parallel() {
        let (registry, transport, _) = setup_registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let user = Uuid::new_v4();
                    registry.create_duel(1, &[user]).unwrap();
                    registry.ask_duel(user).unwrap();
                    registry.init_finish(user).unwrap();
                    registry.operate(user, Operation::SelectActiveCard { card_guid: 1, cost_dice: vec![] }).unwrap();
                    registry.operate(user, Operation::ConfirmReroll { dice_indices: vec![] }).unwrap();
                    registry.operate(user, Operation::UseSkill { skill_id: 13011, cost_dice: vec![] }).unwrap();
                    user
                })
            })
            .collect();
        let users: Vec<UserId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 4);
        for user in users {
            let duel = registry.duel_of(user).unwrap();
            let duel = duel.lock();
            assert_eq!(duel.phase(), Phase::Main);
            assert_eq!(duel.card(3).unwrap().token(TokenKind::CurHealth), 8);

            let notifies = transport.notifies(user);
            let seqs: Vec<u32> = notifies.iter().map(|(seq, _)| *seq).collect();
            assert!(seqs.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(seqs.last().copied(), Some(duel.server_seq()));
            // 开始阶段的3个包在对局运行前只进入历史
            let delivered: Vec<MessagePack> = notifies.into_iter().flat_map(|(_, packs)| packs).collect();
            assert_eq!(&duel.history_packs()[3..], delivered.as_slice());
        }
    }

    #[test]
    fn test_unknown_user_and_duel() {
        let (registry, _, _) = setup_registry();
        let stranger = Uuid::new_v4();
        assert!(matches!(registry.duel_of(stranger), Err(DuelError::NotInDuel(u)) if u == stranger));
        assert!(matches!(registry.get(3), Err(DuelError::DuelNotFound(3))));
        assert_eq!(registry.operate(stranger, Operation::Unknown), Err(DuelError::NotInDuel(stranger)));
        assert_eq!(registry.destroy_duel(3), Err(DuelError::DuelNotFound(3)));
    }

    #[test]
    fn test_full_round_against_automated() {
        let (registry, transport, _) = setup_registry();
        let user = Uuid::new_v4();
        let duel = registry.create_duel(1, &[user]).unwrap();

        let snapshot = registry.ask_duel(user).unwrap();
        assert_eq!(snapshot.controller_id, 1);
        assert_eq!(snapshot.phase.phase, Phase::Start);
        assert_eq!(snapshot.history_packs.len(), 3);
        assert_eq!(snapshot.cards.len(), 4);
        assert_eq!(snapshot.history_cards.len(), 4);

        registry.init_finish(user).unwrap();
        {
            let duel = duel.lock();
            assert_eq!(duel.state(), DuelState::Running);
            // AI已经选好出战角色
            assert_eq!(duel.controller(2).unwrap().selected_guid(), 3);
        }

        registry.operate(user, Operation::SelectActiveCard { card_guid: 1, cost_dice: vec![] }).unwrap();
        registry.operate(user, Operation::ConfirmReroll { dice_indices: vec![0] }).unwrap();
        registry.operate(user, Operation::UseSkill { skill_id: 13012, cost_dice: vec![1, 2, 3] }).unwrap();

        let duel = duel.lock();
        assert_eq!(duel.phase(), Phase::Main);
        assert_eq!(duel.card(3).unwrap().token(TokenKind::CurHealth), 7);
        // AI反击
        assert_eq!(duel.card(1).unwrap().token(TokenKind::CurHealth), 9);
        assert!(duel.controller(1).unwrap().allow());
        assert!(transport.count(user, |m| matches!(m, ServerMessage::MessagePackNotify { .. })) >= 5);
    }

    #[test]
    fn test_destroy_duel_releases_seats() {
        let (registry, _, _) = setup_registry();
        let user = Uuid::new_v4();
        let duel = registry.create_duel(1, &[user]).unwrap();
        let duel_id = duel.lock().guid();

        registry.destroy_duel(duel_id).unwrap();
        assert!(registry.is_empty());
        assert_eq!(duel.lock().state(), DuelState::Stopped);
        assert!(matches!(registry.duel_of(user), Err(DuelError::NotInDuel(_))));
    }

    #[test]
    fn test_tick_all_sends_heartbeats_to_running_duels() {
        let (registry, transport, _) = setup_registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        registry.create_duel(1, &[a]).unwrap();
        registry.create_duel(1, &[b]).unwrap();
        registry.init_finish(a).unwrap();

        registry.tick_all();
        let is_heartbeat = |m: &ServerMessage| matches!(m, ServerMessage::HeartBeat { .. });
        assert_eq!(transport.count(a, is_heartbeat), 1);
        assert_eq!(transport.count(b, is_heartbeat), 0);
    }
}
