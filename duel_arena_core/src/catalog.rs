//! 卡牌与技能的只读目录
//!
//! 对局只在发牌时查询目录，查询结果会被深拷贝进卡牌实例。

use crate::card::CostKind;
use std::collections::{BTreeMap, HashMap};

/// 角色卡牌配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDefinition {
    pub card_id: u32,
    pub hp: u32,
    pub max_energy: u32,
    pub tags: Vec<u32>,
    pub skills: Vec<u32>,
}

/// 技能配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillDefinition {
    pub skill_id: u32,
    pub cost: BTreeMap<CostKind, u32>,
    pub damage: u32,
}

pub trait Catalog: Send + Sync {
    fn card(&self, card_id: u32) -> Option<&CardDefinition>;
    fn skill(&self, skill_id: u32) -> Option<&SkillDefinition>;
}

/// 内存中的目录实现
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    cards: HashMap<u32, CardDefinition>,
    skills: HashMap<u32, SkillDefinition>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置的四张初始角色牌
    pub fn builtin() -> Self {
        use CostKind::*;
        let mut catalog = Self::new();

        // (卡牌Id, 血量, 充能上限, tag, [(技能Id, 伤害, 消耗)])
        let table: [(u32, u32, u32, u32, [(u32, u32, &[(CostKind, u32)]); 3]); 4] = [
            (1301, 10, 3, 1, [
                (13011, 2, &[(Pyro, 1), (Unaligned, 2)]),
                (13012, 3, &[(Pyro, 3)]),
                (13013, 8, &[(Pyro, 4), (Energy, 3)]),
            ]),
            (1103, 10, 2, 2, [
                (11031, 2, &[(Cryo, 1), (Unaligned, 2)]),
                (11032, 3, &[(Cryo, 3)]),
                (11033, 1, &[(Cryo, 4), (Energy, 2)]),
            ]),
            (3001, 10, 2, 3, [
                (30011, 1, &[(Matching, 3)]),
                (30012, 2, &[(Hydro, 3)]),
                (30013, 3, &[(Hydro, 3), (Energy, 2)]),
            ]),
            (3302, 10, 3, 4, [
                (33021, 2, &[(Matching, 3)]),
                (33022, 3, &[(Electro, 3)]),
                (33023, 5, &[(Electro, 3), (Energy, 3)]),
            ]),
        ];

        for (card_id, hp, max_energy, tag, skills) in table {
            for (skill_id, damage, cost) in skills {
                catalog.insert_skill(SkillDefinition {
                    skill_id,
                    cost: cost.iter().copied().collect(),
                    damage,
                });
            }
            catalog.insert_card(CardDefinition {
                card_id,
                hp,
                max_energy,
                tags: vec![tag],
                skills: skills.iter().map(|(id, ..)| *id).collect(),
            });
        }
        catalog
    }

    pub fn insert_card(&mut self, def: CardDefinition) {
        self.cards.insert(def.card_id, def);
    }

    pub fn insert_skill(&mut self, def: SkillDefinition) {
        self.skills.insert(def.skill_id, def);
    }
}

impl Catalog for StaticCatalog {
    fn card(&self, card_id: u32) -> Option<&CardDefinition> {
        self.cards.get(&card_id)
    }

    fn skill(&self, skill_id: u32) -> Option<&SkillDefinition> {
        self.skills.get(&skill_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_cards_resolve_all_skills() {
        let catalog = StaticCatalog::builtin();
        for card_id in [1301, 1103, 3001, 3302] {
            let card = catalog.card(card_id).expect("内置卡牌应存在");
            assert_eq!(card.skills.len(), 3);
            for skill_id in &card.skills {
                assert!(catalog.skill(*skill_id).is_some(), "技能 {} 缺失", skill_id);
            }
        }
    }

    #[test]
    fn test_unknown_ids_are_none() {
        let catalog = StaticCatalog::builtin();
        assert!(catalog.card(42).is_none());
        assert!(catalog.skill(42).is_none());
    }

    #[test]
    fn test_insert_overrides() {
        let mut catalog = StaticCatalog::new();
        catalog.insert_card(CardDefinition { card_id: 7, hp: 1, max_energy: 1, tags: vec![], skills: vec![] });
        catalog.insert_card(CardDefinition { card_id: 7, hp: 5, max_energy: 1, tags: vec![], skills: vec![] });
        assert_eq!(catalog.card(7).map(|c| c.hp), Some(5));
    }
}
