//! # 卡牌对决核心逻辑库
//!
//! 这个 `core` crate 包含了回合制卡牌对决的对局状态、阶段流转、
//! 消息日志的批量提交、操控者权限以及客户端-服务器通信消息的定义。
//! 它不依赖具体的网络实现，消息通过 `Transport` 发往真人玩家，
//! AI 操控者通过 `Policy` 决策。

mod card;
mod catalog;
mod config;
mod controller;
mod error;
mod logic;
mod message;
mod phase;
mod policy;
mod profile;
mod registry;
mod state;

pub use card::*;
pub use catalog::*;
pub use config::*;
pub use controller::*;
pub use error::*;

pub use message::*;

pub use phase::*;
pub use policy::*;
pub use profile::*;
pub use registry::*;

pub use state::*;
