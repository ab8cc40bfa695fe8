use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use serde::Serialize;

use amqmux_peer::EventContext;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    connection: u64,
    container: &'a str,
    channel: Option<u16>,
    handle: Option<u32>,
    size: usize,
    body: String,
    timestamp: String,
}

pub fn print_message(context: &EventContext, format: OutputFormat) {
    let payload = context.payload.as_deref().unwrap_or(&[]);
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                connection: context.connection_id,
                container: &context.container_id,
                channel: context.channel,
                handle: context.handle,
                size: payload.len(),
                body: body_preview(payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            println!(
                "connection={} channel={} handle={} size={} body={}",
                context.connection_id,
                context.channel.unwrap_or(0),
                context.handle.unwrap_or(0),
                payload.len(),
                body_preview(payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(payload);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn body_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
