use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use meterlink_net::DatagramEvent;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct DatagramOutput<'a> {
    kind: &'a str,
    sender_addr: String,
    sender_port: u16,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_datagram(event: &DatagramEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DatagramOutput {
                kind: "datagram",
                sender_addr: event.sender_addr.to_string(),
                sender_port: event.sender_port,
                payload_size: event.payload.len(),
                payload: payload_preview(event.payload.as_ref()),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SENDER", "PORT", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    event.sender_addr.to_string(),
                    event.sender_port.to_string(),
                    event.payload.len().to_string(),
                    payload_preview(event.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "from={}:{} size={} payload={}",
                event.sender_addr,
                event.sender_port,
                event.payload.len(),
                payload_preview(event.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(event.payload.as_ref());
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    kind: &'a str,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_reply(payload: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ReplyOutput {
                kind: "reply",
                payload_size: payload.len(),
                payload: payload_preview(payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SIZE", "PAYLOAD"])
                .add_row(vec![payload.len().to_string(), payload_preview(payload)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("size={} payload={}", payload.len(), payload_preview(payload));
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

fn payload_preview(payload: &[u8]) -> String {
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
