//! Streaming chat client.
//!
//! Opens a WebSocket to the server, prints the history backfill burst,
//! then prints live messages as they arrive. Typed lines are sent as
//! JSON frames over the same socket.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use palaver_client::{format_message, ws_url};
use palaver_core::Message;
use serde_json::json;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Palaver streaming client ===");
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

    let url = ws_url();
    let (socket, _response) = connect_async(&url).await?;
    println!("Connected to {url}. Type messages (or 'quit' to exit).\n");

    let (mut tx, mut rx) = socket.split();

    let reader = tokio::spawn(async move {
        while let Some(frame) = rx.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<Message>(&text) {
                    Ok(message) => println!("{}", format_message(&message)),
                    Err(e) => eprintln!("Unparseable message: {e}"),
                },
                Ok(WsMessage::Close(_)) => {
                    println!("Disconnected by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Connection error: {e}");
                    break;
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
        let frame = json!({ "userName": user_name, "content": line }).to_string();
        if tx.send(WsMessage::Text(frame)).await.is_err() {
            eprintln!("Connection lost");
            break;
        }
    }

    let _ = tx.close().await;
    reader.abort();
    println!("Goodbye!");
    Ok(())
}
