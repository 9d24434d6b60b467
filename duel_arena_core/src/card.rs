use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type CardGuid = u32;
pub type ControllerId = u32;

// --- 核心数据结构定义 ---

/// 卡牌上的数值 (Token)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    CurHealth, // 当前血量
    MaxHealth, // 最大血量
    CurEnergy, // 当前充能
    MaxEnergy, // 充能条上限
}

/// 骰子面 (DiceSide)
/// 每回合每位操控者固定投出若干个骰子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiceSide {
    Cryo,
    Hydro,
    Pyro,
    Electro,
    Anemo,
    Geo,
    Dendro,
    Omni, // 万能
}

/// 技能消耗的种类，作为消耗表的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CostKind {
    Cryo,
    Hydro,
    Pyro,
    Electro,
    Anemo,
    Geo,
    Dendro,
    Unaligned, // 任意元素
    Matching,  // 同色元素
    Energy,    // 充能
}

impl DiceSide {
    pub const ALL: [DiceSide; 8] = [
        DiceSide::Cryo, DiceSide::Hydro, DiceSide::Pyro, DiceSide::Electro,
        DiceSide::Anemo, DiceSide::Geo, DiceSide::Dendro, DiceSide::Omni,
    ];

    /// 投掷一个骰子
    pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> DiceSide {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}

/// 对局内卡牌技能信息
/// 由目录数据深拷贝而来，之后对消耗的修改不会影响目录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillInfo {
    pub skill_id: u32,
    pub cost: BTreeMap<CostKind, u32>, // 消耗的元素骰子
    pub damage: u32,                   // 技能伤害
}

/// 对局内卡牌实例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInstance {
    pub card_id: u32,                     // 目录中的卡牌Id
    pub guid: CardGuid,                   // 对局内唯一Id
    pub controller_id: ControllerId,      // 拥有它的操控者
    pub face_type: u32,                   // 卡面类型，1为金卡
    pub tags: Vec<u32>,
    pub tokens: BTreeMap<TokenKind, u32>,
    pub skills: Vec<SkillInfo>,
    pub skill_limits: Vec<u32>,           // 技能限制列表
    pub is_show: bool,                    // 是否展示
}

// --- CardInstance 的实现方法 ---

impl CardInstance {
    pub fn token(&self, kind: TokenKind) -> u32 {
        self.tokens.get(&kind).copied().unwrap_or(0)
    }

    /// 直接设置某个token，返回 (修改前, 修改后)
    pub fn set_token(&mut self, kind: TokenKind, value: u32) -> (u32, u32) {
        let before = self.tokens.insert(kind, value).unwrap_or(0);
        (before, value)
    }

    /// 受到伤害，血量最低为0
    pub fn take_damage(&mut self, amount: u32) -> (u32, u32) {
        let hp = self.token(TokenKind::CurHealth);
        self.set_token(TokenKind::CurHealth, hp.saturating_sub(amount))
    }

    /// 充能，不超过充能条上限
    pub fn charge(&mut self, amount: u32) -> (u32, u32) {
        let cur = self.token(TokenKind::CurEnergy);
        let max = self.token(TokenKind::MaxEnergy);
        self.set_token(TokenKind::CurEnergy, cur.saturating_add(amount).min(max))
    }

    pub fn is_alive(&self) -> bool {
        self.token(TokenKind::CurHealth) > 0
    }

    pub fn skill(&self, skill_id: u32) -> Option<&SkillInfo> {
        self.skills.iter().find(|s| s.skill_id == skill_id)
    }
}

impl fmt::Display for DiceSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            DiceSide::Cryo => "冰",
            DiceSide::Hydro => "水",
            DiceSide::Pyro => "火",
            DiceSide::Electro => "雷",
            DiceSide::Anemo => "风",
            DiceSide::Geo => "岩",
            DiceSide::Dendro => "草",
            DiceSide::Omni => "万能",
        })
    }
}

impl fmt::Display for CardInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "#{}({}) HP {}/{} 充能 {}/{}",
            self.guid,
            self.card_id,
            self.token(TokenKind::CurHealth),
            self.token(TokenKind::MaxHealth),
            self.token(TokenKind::CurEnergy),
            self.token(TokenKind::MaxEnergy),
        )
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn card(hp: u32, max_energy: u32) -> CardInstance {
        CardInstance {
            card_id: 1301,
            guid: 1,
            controller_id: 1,
            face_type: 0,
            tags: vec![],
            tokens: BTreeMap::from([
                (TokenKind::CurHealth, hp),
                (TokenKind::MaxHealth, hp),
                (TokenKind::CurEnergy, 0),
                (TokenKind::MaxEnergy, max_energy),
            ]),
            skills: vec![SkillInfo { skill_id: 13011, cost: BTreeMap::new(), damage: 2 }],
            skill_limits: vec![],
            is_show: true,
        }
    }

    #[test]
    fn test_damage_saturates_at_zero() {
        let mut c = card(3, 2);
        assert_eq!(c.take_damage(2), (3, 1));
        assert_eq!(c.take_damage(5), (1, 0));
        assert!(!c.is_alive());
    }

    #[test]
    fn test_charge_is_capped() {
        let mut c = card(10, 2);
        assert_eq!(c.charge(1), (0, 1));
        assert_eq!(c.charge(1), (1, 2));
        assert_eq!(c.charge(1), (2, 2)); // 充能条已满
    }

    #[test]
    fn test_missing_token_reads_zero() {
        let mut c = card(10, 2);
        c.tokens.remove(&TokenKind::CurEnergy);
        assert_eq!(c.token(TokenKind::CurEnergy), 0);
        assert_eq!(c.skill(13011).map(|s| s.damage), Some(2));
        assert!(c.skill(99999).is_none());
    }

    #[test]
    fn test_roll_covers_only_known_faces() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            assert!(DiceSide::ALL.contains(&DiceSide::roll(&mut rng)));
        }
    }
}
