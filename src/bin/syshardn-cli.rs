//! syshardn CLI client
//!
//! Sends operations to the orchestrator daemon over UDP and prints the
//! result envelope. With no subcommand it starts an interactive prompt
//! (rustyline, with history) that accepts the same subcommands.

#[allow(dead_code)]
#[path = "../envelope.rs"]
mod envelope;
#[allow(dead_code)]
#[path = "../operation.rs"]
mod operation;
#[allow(dead_code)]
#[path = "../settings/mod.rs"]
mod settings;

use clap::{Parser, Subcommand};
use envelope::ResultEnvelope;
use operation::{Operation, ScanConfig};
use rmp_serde::decode::Deserializer;
use rmp_serde::encode::Serializer;
use rustyline::Editor;
use rustyline::history::FileHistory;
use serde::{Deserialize, Serialize};
use settings::SshSettings;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Message types
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum MsgType {
    Request = 0x01,
    RequestAck = 0x02,
    Response = 0x03,
}

/// Request payload
#[derive(Debug, Serialize)]
struct RequestPayload {
    operation: Operation,
}

/// CLI arguments
#[derive(Debug, Parser)]
#[command(name = "syshardn-cli")]
#[command(about = "syshardn orchestrator CLI client")]
struct Args {
    /// Daemon address (e.g., 127.0.0.1:9710)
    #[arg(short, long, default_value = "127.0.0.1:9710")]
    target: SocketAddr,

    /// ACK timeout in seconds
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Seconds to wait for a result once acknowledged
    #[arg(long, default_value = "900")]
    response_timeout: u64,

    /// Maximum retry attempts
    #[arg(short, long, default_value = "3")]
    max_retries: u32,

    /// History file path
    #[arg(long)]
    history_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a compliance check
    Check {
        /// Hardening profile (basic, moderate, strict)
        #[arg(short, long)]
        profile: Option<String>,
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        rules: Vec<String>,
    },
    /// Apply fixes for the given rules
    Apply {
        #[arg(required = true, value_delimiter = ',')]
        rule_ids: Vec<String>,
    },
    /// Roll back the latest change for a rule
    Rollback { rule_id: String },
    ListRules,
    /// Generate a report file
    Report {
        #[arg(short, long, default_value = "html")]
        format: String,
    },
    /// Check SSH credentials without running the tool
    TestConnection {
        #[arg(long)]
        host: String,
        #[arg(short, long)]
        username: String,
        #[arg(long, default_value = "22")]
        port: u16,
        #[arg(long)]
        password: Option<String>,
        /// Private key file
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Show current settings
    Settings,
    /// Merge a JSON object into the settings and persist it
    SaveSettings { json: String },
    ReloadSettings,
    SystemInfo,
    Backups,
    Cancel,
}

impl Command {
    fn into_operation(self) -> Result<Operation, String> {
        let operation = match self {
            Command::Check {
                profile,
                categories,
                rules,
            } => Operation::Check(ScanConfig {
                profile,
                categories,
                rules,
            }),
            Command::Apply { rule_ids } => Operation::Apply { rule_ids },
            Command::Rollback { rule_id } => Operation::Rollback { rule_id },
            Command::ListRules => Operation::ListRules,
            Command::Report { format } => Operation::GenerateReport { format },
            Command::TestConnection {
                host,
                username,
                port,
                password,
                key,
            } => Operation::TestConnection(SshSettings {
                enabled: true,
                host,
                port,
                username,
                password,
                private_key_path: key,
                ..Default::default()
            }),
            Command::Settings => Operation::GetSettings,
            Command::SaveSettings { json } => Operation::SaveSettings(
                serde_json::from_str(&json).map_err(|e| format!("invalid JSON: {}", e))?,
            ),
            Command::ReloadSettings => Operation::ReloadSettings,
            Command::SystemInfo => Operation::SystemInfo,
            Command::Backups => Operation::Backups,
            Command::Cancel => Operation::Cancel,
        };
        Ok(operation)
    }
}

/// One line typed at the prompt
#[derive(Debug, Parser)]
#[command(name = "syshardn", no_binary_name = true)]
struct PromptLine {
    #[command(subcommand)]
    command: Command,
}

/// Whitespace split, except `save-settings` keeps the rest of the line as its JSON
fn split_line(line: &str) -> Vec<String> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("save-settings") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            let mut words = vec!["save-settings".to_string()];
            if !rest.trim().is_empty() {
                words.push(rest.trim().to_string());
            }
            return words;
        }
    }
    line.split_whitespace().map(str::to_string).collect()
}

/// CLI configuration
#[derive(Debug, Clone)]
struct Config {
    target: SocketAddr,
    ack_timeout_secs: u64,
    response_timeout_secs: u64,
    max_retries: u32,
    history_file: PathBuf,
}

impl Config {
    fn from_args(args: &Args) -> Self {
        let history_file = args.history_file.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|p| p.join(".syshardn_history"))
                .unwrap_or_else(|| PathBuf::from(".syshardn_history"))
        });

        Self {
            target: args.target,
            ack_timeout_secs: args.timeout,
            response_timeout_secs: args.response_timeout,
            max_retries: args.max_retries,
            history_file,
        }
    }
}

/// Main client state
struct Client {
    socket: UdpSocket,
    config: Config,
    seq: AtomicU32,
}

impl Client {
    async fn new(config: Config) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;

        Ok(Self {
            socket,
            config,
            seq: AtomicU32::new(1),
        })
    }

    /// Send an operation and wait for its envelope
    async fn send_request(&self, operation: Operation) -> io::Result<ResultEnvelope> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);

        let payload = RequestPayload { operation };
        let mut payload_bytes = Vec::new();
        let mut ser = Serializer::new(&mut payload_bytes).with_struct_map();
        payload
            .serialize(&mut ser)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // Build packet: type (1) + seq (4) + payload
        let mut packet = vec![MsgType::Request as u8];
        packet.extend_from_slice(&seq.to_be_bytes());
        packet.extend_from_slice(&payload_bytes);

        for _attempt in 0..self.config.max_retries {
            self.socket.send_to(&packet, self.config.target).await?;

            match self.wait_for_ack(seq).await {
                Ok(true) => match self.wait_for_response(seq).await {
                    Ok(response) => return Ok(response),
                    Err(_) => {
                        eprintln!("[warning] Response timeout, retrying...");
                        continue;
                    }
                },
                Ok(false) => continue,
                Err(_) => continue,
            }
        }

        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "orchestrator not responding",
        ))
    }

    /// Wait for REQUEST_ACK
    async fn wait_for_ack(&self, expected_seq: u32) -> io::Result<bool> {
        let mut buf = [0u8; 1024];

        match timeout(
            Duration::from_secs(self.config.ack_timeout_secs),
            self.socket.recv_from(&mut buf),
        )
        .await
        {
            Ok(Ok((len, addr))) => {
                if addr != self.config.target || len < 5 {
                    return Ok(false);
                }

                let msg_type = buf[0];
                let seq = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);

                Ok(msg_type == MsgType::RequestAck as u8 && seq == expected_seq)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(false),
        }
    }

    /// Wait for RESPONSE; repeated ACKs for the same seq are skipped
    async fn wait_for_response(&self, expected_seq: u32) -> io::Result<ResultEnvelope> {
        let mut buf = vec![0u8; 65536];
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.response_timeout_secs);

        loop {
            let (len, addr) = match tokio::time::timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "Response timeout"));
                }
            };

            if addr != self.config.target || len < 5 {
                continue;
            }

            let msg_type = buf[0];
            let seq = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
            if seq != expected_seq || msg_type == MsgType::RequestAck as u8 {
                continue;
            }

            if msg_type != MsgType::Response as u8 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Not a response packet",
                ));
            }

            let mut de = Deserializer::new(&buf[5..len]);
            return ResultEnvelope::deserialize(&mut de)
                .map(load_spilled)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
        }
    }
}

/// Responses too large for one datagram arrive as a pointer to a file
/// the daemon wrote; swap in the full envelope from that file
fn load_spilled(envelope: ResultEnvelope) -> ResultEnvelope {
    let Some(path) = envelope
        .data
        .as_ref()
        .and_then(|d| d.get(envelope::SPILLED_PATH_KEY))
        .and_then(|p| p.as_str())
    else {
        return envelope;
    };

    let full = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str::<ResultEnvelope>(&content).map_err(|e| e.to_string()));
    match full {
        Ok(full) => full,
        Err(e) => {
            eprintln!("[warning] Failed to read spilled response {}: {}", path, e);
            envelope
        }
    }
}

fn print_envelope(envelope: &ResultEnvelope) {
    let data = envelope
        .data
        .as_ref()
        .map(|d| serde_json::to_string_pretty(d).unwrap_or_else(|_| d.to_string()));

    if envelope.success {
        match data {
            Some(data) => println!("{}", data),
            None => println!("ok"),
        }
    } else {
        println!(
            "[error] {}",
            envelope.error.as_deref().unwrap_or("operation failed")
        );
        if let Some(data) = data {
            println!("{}", data);
        }
    }
}

fn main() -> io::Result<()> {
    let mut args = Args::parse();
    let config = Config::from_args(&args);

    if let Ok(lang) = std::env::var("LANG")
        && !lang.to_lowercase().contains("utf-8")
        && !lang.to_lowercase().contains("utf8")
    {
        eprintln!(
            "[warning] Terminal locale is not UTF-8. Non-ASCII characters may not display correctly."
        );
    }

    let rt = tokio::runtime::Runtime::new()?;
    match args.command.take() {
        Some(command) => rt.block_on(run_once(config, command)),
        None => rt.block_on(run_prompt(config)),
    }
}

async fn run_once(config: Config, command: Command) -> io::Result<()> {
    let operation = command
        .into_operation()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let client = Client::new(config).await?;
    let envelope = client.send_request(operation).await?;
    print_envelope(&envelope);
    if !envelope.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_prompt(config: Config) -> io::Result<()> {
    let client = Client::new(config.clone()).await?;

    let mut rl: Editor<(), FileHistory> = Editor::new().map_err(io::Error::other)?;

    if config.history_file.exists()
        && let Err(e) = rl.load_history(&config.history_file)
    {
        eprintln!("[warning] Failed to load history: {}", e);
    }

    println!("syshardn-cli v{}", env!("CARGO_PKG_VERSION"));
    println!("Target: {}", client.config.target);
    println!("Type a command (e.g. check, list-rules, help). Ctrl+D to quit.");
    println!();

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);

                let command = match PromptLine::try_parse_from(split_line(input)) {
                    Ok(parsed) => parsed.command,
                    Err(e) => {
                        let _ = e.print();
                        continue;
                    }
                };
                let operation = match command.into_operation() {
                    Ok(operation) => operation,
                    Err(e) => {
                        println!("[error] {}", e);
                        continue;
                    }
                };

                print!("[waiting...]");
                io::stdout().flush()?;

                match client.send_request(operation).await {
                    Ok(envelope) => {
                        print!("\r");
                        print_envelope(&envelope);
                    }
                    Err(e) => {
                        print!("\r");
                        println!("[error] {}", e);
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("[error] Readline error: {}", e);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&config.history_file) {
        eprintln!("[warning] Failed to save history: {}", e);
    }

    println!("\nGoodbye!");
    Ok(())
}
