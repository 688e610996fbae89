//! OrchestrIA - 命令行对话入口
//!
//! 加载配置、初始化日志，按行读取 stdin：普通文本发给助手并流式打印回复，
//! `/briefing` `/tasks` `/reset` `/reload` `/quit` 为本地命令。回复输出期间 Ctrl+C 取消当前回合。

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use futures_util::StreamExt;
use orchestria::config::load_config;
use orchestria::llm::create_backend_from_config;
use orchestria::memory::Role;
use orchestria::{observability, MessageUpdate, SessionManager};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path.clone()).context("Failed to load configuration")?;
    let session = SessionManager::from_config(&config);

    for message in session.messages() {
        println!("{}", message.text);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset().await;
                println!("(new conversation)");
            }
            "/reload" => match load_config(config_path.clone()) {
                Ok(config) => {
                    session
                        .replace_backend(create_backend_from_config(&config))
                        .await;
                    println!("(configuration reloaded, provider: {})", config.llm.provider);
                }
                Err(e) => println!("Failed to reload configuration: {}", e),
            },
            "/briefing" => println!("{}", session.morning_briefing().await),
            "/tasks" => print_tasks(&session).await,
            text => stream_reply(&session, text).await?,
        }
    }

    Ok(())
}

fn prompt() -> anyhow::Result<()> {
    print!("> ");
    std::io::stdout().flush().context("Failed to flush stdout")
}

/// 流式打印助手回复：同一条消息只输出新增的后缀
async fn stream_reply(session: &SessionManager, text: &str) -> anyhow::Result<()> {
    let mut updates = session.send(text);
    let mut printed: HashMap<Uuid, usize> = HashMap::new();
    let mut stdout = std::io::stdout();

    loop {
        let update = tokio::select! {
            u = updates.next() => u,
            _ = tokio::signal::ctrl_c() => {
                session.cancel();
                println!("\n(cancelled)");
                continue;
            }
        };
        let Some(MessageUpdate { message }) = update else {
            break;
        };
        if message.role == Role::User {
            continue;
        }
        let seen = printed.entry(message.id).or_insert(0);
        if let Some(suffix) = message.text.get(*seen..) {
            write!(stdout, "{}", suffix).context("Failed to write reply")?;
            *seen = message.text.len();
        }
        if !message.streaming {
            writeln!(stdout).context("Failed to write reply")?;
        }
        stdout.flush().context("Failed to flush stdout")?;
    }
    Ok(())
}

async fn print_tasks(session: &SessionManager) {
    match session.store().list_tasks().await {
        Ok(tasks) => {
            for task in tasks {
                println!(
                    "{:<10} {:<12} {:<9} {}",
                    task.id,
                    task.status.as_str(),
                    format!("{:?}", task.priority),
                    task.title
                );
            }
        }
        Err(e) => println!("Failed to list tasks: {}", e),
    }
}
