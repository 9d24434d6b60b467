use serde::{Deserialize, Serialize};

/// 对局的可调参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuelConfig {
    /// 每局的座位数，真人不足时由AI补齐
    pub seats: usize,
    /// 每回合每位操控者的骰子数
    pub dice_per_round: usize,
    /// 每隔多少个tick发送一次心跳
    pub heartbeat_ticks: u32,
    /// 真人操控者的初始角色牌
    pub human_roster: Vec<u32>,
    /// AI操控者的初始角色牌
    pub automated_roster: Vec<u32>,
    /// 单次请求后AI连续行动的上限
    pub max_automated_steps: usize,
    /// 骰子随机种子，None 时使用系统熵
    pub dice_seed: Option<u64>,
}

impl Default for DuelConfig {
    fn default() -> Self {
        DuelConfig {
            seats: 2,
            dice_per_round: 8,
            heartbeat_ticks: 10,
            human_roster: vec![1301, 1103],
            automated_roster: vec![3001, 3302],
            max_automated_steps: 32,
            dice_seed: None,
        }
    }
}
