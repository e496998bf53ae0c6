use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Prints ticks pushed by a running server_ticker", long_about = None)]
struct Args {
    /// WebSocket endpoint of the ticker server
    #[clap(short, long, default_value = "ws://127.0.0.1:5000/chat")]
    url: String,

    /// Cancel the stream after this many ticks (runs until Ctrl+C when unset)
    #[clap(short, long)]
    count: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("Connecting to {}...", args.url);
    let (ws_stream, _) = connect_async(args.url.as_str()).await.context("Failed to connect")?;
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(json!({ "type": "stream" }).to_string().into()))
        .await
        .context("Failed to request stream")?;
    println!("Stream requested. Press Ctrl+C to stop.");

    let mut received: u64 = 0;
    let mut previous: Option<DateTime<FixedOffset>> = None;
    let mut cancel_sent = false;

    while let Some(frame) = read.next().await {
        let text = match frame.context("Connection error")? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let parsed: Value = serde_json::from_str(text.as_str()).context("Invalid server message")?;

        match parsed["type"].as_str() {
            Some("tick") => {
                let raw = parsed["message"].as_str().unwrap_or_default();
                let at = DateTime::parse_from_rfc3339(raw).with_context(|| format!("Bad timestamp {}", raw))?;
                match previous {
                    Some(prev) => println!("tick {} (+{} ms)", at, (at - prev).num_milliseconds()),
                    None => println!("tick {}", at),
                }
                previous = Some(at);
                received += 1;

                if !cancel_sent && args.count.is_some_and(|limit| received >= limit) {
                    write
                        .send(Message::Text(json!({ "type": "cancel" }).to_string().into()))
                        .await
                        .context("Failed to cancel stream")?;
                    cancel_sent = true;
                }
            }
            Some("ack") if parsed["message"] == "cancel" => {
                println!("Stream cancelled after {} tick(s).", received);
                break;
            }
            Some("ack") => {}
            Some("error") => bail!("Server error: {}", parsed["error"]),
            _ => println!("Unexpected message: {}", text.as_str()),
        }
    }

    Ok(())
}
