use crate::card::{CardGuid, ControllerId};
use crate::message::Retcode;
use crate::state::{DuelId, Phase, UserId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DuelError>;

/// 对局引擎的错误
///
/// 任何返回错误的操作都不会修改对局状态，也不会产生消息包。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DuelError {
    // --- 调用方错误 ---
    #[error("duel {0} not found")]
    DuelNotFound(DuelId),
    #[error("user {0} is not seated in this duel")]
    NotInDuel(UserId),
    #[error("controller {0} not found")]
    ControllerNotFound(ControllerId),
    #[error("a duel needs at least one human participant")]
    NoHumanParticipants,
    #[error("card {0} is not owned by the acting controller")]
    CardNotOwned(CardGuid),

    // --- 权限 ---
    #[error("controller {0} is not allowed to act")]
    ActionNotAllowed(ControllerId),

    // --- 校验错误 ---
    #[error("dice index {0} is out of range")]
    DiceIndexInvalid(u32),
    #[error("operation not legal in phase {0:?}")]
    WrongPhase(Phase),
    #[error("switching the active card requires cost dice")]
    CostRequired,
    #[error("no opposing active card to target")]
    NoTargetSelected,
    #[error("acting controller has no active card")]
    NoActiveCard,
    #[error("skill {0} does not belong to the active card")]
    SkillNotOwned(u32),

    // --- 数据错误 ---
    #[error("catalog entry {0} not found")]
    UnknownCatalogEntry(u32),

    #[error("unhandled operation")]
    UnhandledAction,
}

impl DuelError {
    /// 回包中使用的错误码
    pub fn retcode(&self) -> Retcode {
        match self {
            DuelError::DuelNotFound(_) => Retcode::GameNotRunning,
            DuelError::NotInDuel(_)
            | DuelError::ControllerNotFound(_)
            | DuelError::NoHumanParticipants => Retcode::NotInDuel,
            DuelError::CardNotOwned(_) => Retcode::SelectCardGuidError,
            DuelError::ActionNotAllowed(_) => Retcode::ActionNotAllowed,
            DuelError::DiceIndexInvalid(_) => Retcode::DiceIndexInvalid,
            DuelError::WrongPhase(_) => Retcode::PhaseInvalid,
            DuelError::CostRequired => Retcode::CostNotEnough,
            DuelError::NoTargetSelected | DuelError::NoActiveCard => Retcode::TargetInvalid,
            DuelError::SkillNotOwned(_) => Retcode::SkillInvalid,
            DuelError::UnknownCatalogEntry(_) => Retcode::ConfigError,
            DuelError::UnhandledAction => Retcode::Unknown,
        }
    }
}
