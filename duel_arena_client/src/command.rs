use duel_arena_core::{ClientMessage, Operation, RoomId};

/// 控制台输入解析后的命令
#[derive(Debug, PartialEq)]
pub enum Command {
    Send(ClientMessage),
    Exit,
}

/// 解析一行输入，失败时返回用法提示
pub fn parse_command(line: &str) -> Result<Command, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let msg = match parts.first().copied() {
        Some("create") => {
            let nickname = parts.get(1).unwrap_or(&"新玩家").to_string();
            let seats = parse_or(parts.get(2), 1, "用法: create <昵称> [座位数] [场景]")?;
            let scenario_id = parse_or(parts.get(3), 1, "用法: create <昵称> [座位数] [场景]")?;
            ClientMessage::CreateRoom { nickname, scenario_id, seats }
        }
        Some("join") => {
            if parts.len() < 3 {
                return Err("用法: join <房间ID> <昵称>".to_string());
            }
            let room_id: RoomId = parts[1].parse().map_err(|_| "无效的房间ID格式".to_string())?;
            ClientMessage::JoinRoom { room_id, nickname: parts[2].to_string() }
        }
        Some("ask") => ClientMessage::AskDuel,
        Some("ready") => ClientMessage::InitFinish,
        Some("select") => {
            let card_guid = parse_required(parts.get(1), "用法: select <角色guid> [骰子..]")?;
            let cost_dice = parse_indices(&parts[2..])?;
            Operation::SelectActiveCard { card_guid, cost_dice }.into()
        }
        Some("reroll") => {
            let dice_indices = parse_indices(&parts[1..])?;
            Operation::ConfirmReroll { dice_indices }.into()
        }
        Some("skill") => {
            let skill_id = parse_required(parts.get(1), "用法: skill <技能Id> [骰子..]")?;
            let cost_dice = parse_indices(&parts[2..])?;
            Operation::UseSkill { skill_id, cost_dice }.into()
        }
        Some("exit") => return Ok(Command::Exit),
        _ => return Err(format!("未知命令: {}", line)),
    };
    Ok(Command::Send(msg))
}

fn parse_required<T: std::str::FromStr>(arg: Option<&&str>, usage: &str) -> Result<T, String> {
    arg.and_then(|s| s.parse().ok()).ok_or_else(|| usage.to_string())
}

fn parse_or<T: std::str::FromStr>(arg: Option<&&str>, default: T, usage: &str) -> Result<T, String> {
    match arg {
        Some(s) => s.parse().map_err(|_| usage.to_string()),
        None => Ok(default),
    }
}

fn parse_indices(args: &[&str]) -> Result<Vec<u32>, String> {
    args.iter()
        .map(|s| s.parse().map_err(|_| format!("无效的骰子序号: {}", s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(cmd: Command) -> Operation {
        match cmd {
            Command::Send(ClientMessage::Operation { op, .. }) => op,
            other => panic!("不是对局操作: {:?}", other),
        }
    }

    #[test]
    fn test_parse_operations() {
        assert_eq!(
            op(parse_command("select 2 0 3").unwrap()),
            Operation::SelectActiveCard { card_guid: 2, cost_dice: vec![0, 3] }
        );
        assert_eq!(op(parse_command("reroll").unwrap()), Operation::ConfirmReroll { dice_indices: vec![] });
        assert_eq!(
            op(parse_command("skill 13011 1 2 3").unwrap()),
            Operation::UseSkill { skill_id: 13011, cost_dice: vec![1, 2, 3] }
        );
    }

    #[test]
    fn test_parse_create_defaults() {
        match parse_command("create Aether").unwrap() {
            Command::Send(ClientMessage::CreateRoom { nickname, scenario_id, seats }) => {
                assert_eq!(nickname, "Aether");
                assert_eq!(scenario_id, 1);
                assert_eq!(seats, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("select").is_err());
        assert!(parse_command("reroll x").is_err());
        assert!(parse_command("join abc").is_err());
        assert!(parse_command("dance").is_err());
        assert_eq!(parse_command("exit"), Ok(Command::Exit));
    }
}
