use crate::state::UserId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// 玩家的外观信息，对局只读取不修改
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub nickname: String,
    pub avatar_id: u32,
    pub costume_id: u32,
}

pub trait Profiles: Send + Sync {
    fn profile(&self, user_id: UserId) -> Option<PlayerProfile>;
}

/// 内存中的玩家信息表
#[derive(Debug, Default)]
pub struct ProfileBook {
    entries: DashMap<UserId, PlayerProfile>,
}

impl ProfileBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, profile: PlayerProfile) {
        self.entries.insert(user_id, profile);
    }

    pub fn remove(&self, user_id: &UserId) {
        self.entries.remove(user_id);
    }
}

impl Profiles for ProfileBook {
    fn profile(&self, user_id: UserId) -> Option<PlayerProfile> {
        self.entries.get(&user_id).map(|p| p.clone())
    }
}
