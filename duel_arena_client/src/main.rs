mod command;

use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use duel_arena_core::{ClientMessage, ServerMessage};

use crate::command::{parse_command, Command};

const DEFAULT_URL: &str = "ws://127.0.0.1:25917/ws";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(&std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string()))?;

    println!("正在连接到: {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();

    // 启动一个任务来处理从服务器接收的消息
    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(server_msg) => {
                            // 简单地将收到的消息打印到控制台
                            println!("\n<-- [服务器消息]:\n{:#?}\n", server_msg);
                            print!("> "); // 重新显示输入提示符
                            let _ = std::io::stdout().flush();
                        }
                        Err(e) => eprintln!("解析服务器消息失败: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            }
        }
    });

    // 主任务处理用户输入
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("--- 卡牌对决客户端 ---");
    println!("可用命令:");
    println!("  create <昵称> [座位数] [场景]  - 创建一个新房间");
    println!("  join <房间ID> <昵称>           - 加入一个房间");
    println!("  ask                            - 请求对局数据");
    println!("  ready                          - 加载完成");
    println!("  select <角色guid> [骰子..]     - 选择出战角色");
    println!("  reroll [骰子..]                - 确认重投骰子");
    println!("  skill <技能Id> [骰子..]        - 使用技能");
    println!("  exit                           - 退出");

    let mut op_seq = 0u32;
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = stdin.next_line().await? else {
            break;
        };
        let client_msg = match parse_command(&line) {
            Ok(Command::Exit) => {
                println!("正在断开连接...");
                break;
            }
            Ok(Command::Send(ClientMessage::Operation { op, .. })) => {
                op_seq += 1;
                ClientMessage::Operation { op_seq, op }
            }
            Ok(Command::Send(msg)) => msg,
            Err(usage) => {
                println!("{}", usage);
                continue;
            }
        };

        let payload = serde_json::to_string(&client_msg)?;
        write.send(Message::Text(payload.into())).await?;
    }

    Ok(())
}
