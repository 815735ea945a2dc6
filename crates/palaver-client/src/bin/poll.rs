//! Polling chat client.
//!
//! Periodically asks the server "what's new since position N", prints
//! the result, and advances its cursor by the number of messages
//! received. Typed lines are sent through the REST write endpoint.

use anyhow::Result;
use palaver_client::{format_message, server_url};
use palaver_core::Message;
use serde_json::json;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Duration};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let base = server_url();
    let client = reqwest::Client::new();

    println!("--- Palaver polling client ---");
    print!("Enter your user name: ");
    std::io::stdout().flush()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let user_name = match lines.next_line().await? {
        Some(line) => line.trim().to_string(),
        None => return Ok(()),
    };
    if user_name.is_empty() {
        println!("User name cannot be empty");
        return Ok(());
    }

    println!("Connected! Type messages (or 'quit' to exit).");
    println!(
        "Messages refresh every {} seconds\n",
        POLL_INTERVAL.as_secs()
    );

    // The background poller owns the cursor; it only ever advances.
    let poll_client = client.clone();
    let poll_base = base.clone();
    let poller = tokio::spawn(async move {
        let mut cursor = 0usize;
        let mut errors = 0u32;
        let mut ticker = interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;
            match poll_once(&poll_client, &poll_base, cursor).await {
                Ok(messages) => {
                    for message in &messages {
                        println!("{}", format_message(message));
                    }
                    cursor += messages.len();
                    errors = 0;
                }
                Err(e) => {
                    errors += 1;
                    // Surface the 1st, 6th, 11th... consecutive failure.
                    if errors % 5 == 1 {
                        eprintln!("Poll failed: {e}");
                    }
                }
            }
        }
    });

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if let Err(e) = send_message(&client, &base, &user_name, line).await {
            eprintln!("Send failed: {e}");
        }
    }

    poller.abort();
    println!("\nGoodbye!");
    Ok(())
}

async fn poll_once(client: &reqwest::Client, base: &str, cursor: usize) -> Result<Vec<Message>> {
    let url = format!("{base}/api/messages?since={cursor}");
    let messages = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<Vec<Message>>()
        .await?;
    Ok(messages)
}

async fn send_message(
    client: &reqwest::Client,
    base: &str,
    user_name: &str,
    content: &str,
) -> Result<()> {
    let response = client
        .post(format!("{base}/api/messages"))
        .json(&json!({ "userName": user_name, "content": content }))
        .send()
        .await?;

    if response.status() != reqwest::StatusCode::CREATED {
        anyhow::bail!("Server rejected message: {}", response.status());
    }
    Ok(())
}
