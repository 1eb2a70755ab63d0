use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{info, warn};

use qr_attend_rs::api::{BackendClient, ClientConfig, DEFAULT_API_URL};
use qr_attend_rs::attendance::{self, AttendanceFilter, AttendanceReport};
use qr_attend_rs::gate::{DecodeOutcome, GateConfig, ScanGate};
use qr_attend_rs::session::{SessionStore, DEFAULT_SESSION_FILE};
use qr_attend_rs::students::{self, StudentQuery};
use qr_attend_rs::types::{
    Credentials, Registration, ScanHistoryEntry, ScanOutcome, ScanStatus, StudentForm,
};
use qr_attend_rs::server;

/// qr-attend-rs: QR attendance scanning client with a single-flight scan gate.
#[derive(Debug, Parser)]
#[command(
    name = "qr-attend-rs",
    version,
    about = "QR attendance scanning client with a single-flight scan gate.",
    long_about = None
)]
struct Cli {
    /// Base URL of the attendance backend.
    #[arg(long = "api-url", env = "ABSENSI_API_URL", default_value = DEFAULT_API_URL, global = true)]
    api_url: String,

    /// Backend request timeout in milliseconds.
    #[arg(long = "timeout-ms", env = "ABSENSI_TIMEOUT_MS", default_value_t = 5000, global = true)]
    timeout_ms: u64,

    /// Where the login response is kept.
    #[arg(long = "session-file", env = "ABSENSI_SESSION_FILE", default_value = DEFAULT_SESSION_FILE, global = true)]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct GateArgs {
    /// How long success/error stays up before the gate accepts the next code.
    #[arg(long = "cooldown-ms", default_value_t = 2000)]
    cooldown_ms: u64,

    /// Number of recent scans kept.
    #[arg(long = "history-cap", default_value_t = 10)]
    history_cap: usize,
}

impl GateArgs {
    fn config(&self) -> GateConfig {
        GateConfig {
            cooldown: Duration::from_millis(self.cooldown_ms),
            history_cap: self.history_cap,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the gate API and the scanner page for a browser-side decoder.
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: String,
        /// Directory with the static scanner page.
        #[arg(long = "ui-dir", default_value = "ui")]
        ui_dir: PathBuf,
        #[command(flatten)]
        gate: GateArgs,
    },
    /// Read decoded payloads from stdin, one per line, and feed them through the gate.
    Scan {
        #[command(flatten)]
        gate: GateArgs,
    },
    #[command(subcommand)]
    Students(StudentsCommand),
    /// List attendance, optionally filtered, and export it.
    Attendance {
        #[arg(long)]
        class: Option<String>,
        /// Day in YYYY-MM-DD.
        #[arg(long)]
        date: Option<String>,
        /// Write the report as pretty JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Login {
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the stored login.
    Whoami,
}

#[derive(Debug, Subcommand)]
enum StudentsCommand {
    List {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        class: Option<String>,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        nis: String,
        #[arg(long, default_value = "")]
        class: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
    /// Update a student; omitted fields keep their current value.
    Update {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        nis: Option<String>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    Delete { id: u64 },
    /// List QR payloads and image file names for printing cards.
    Qr {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        class: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let client = BackendClient::new(ClientConfig {
        base_url: cli.api_url.clone(),
        timeout: Duration::from_millis(cli.timeout_ms),
    })
    .context("failed to build HTTP client")?;
    let session = SessionStore::new(&cli.session_file);

    match cli.command {
        Command::Serve { bind, ui_dir, gate } => {
            let gate = ScanGate::new(Arc::new(client), gate.config());
            info!(backend = %cli.api_url, "starting gate API");
            tokio::select! {
                res = server::spawn_server(&bind, gate, &ui_dir) => res?,
                _ = tokio::signal::ctrl_c() => info!("shutting down"),
            }
        }
        Command::Scan { gate } => {
            let gate = ScanGate::new(Arc::new(client), gate.config());
            run_scan_loop(gate).await?;
        }
        Command::Students(cmd) => run_students(&client, cmd).await?,
        Command::Attendance {
            class,
            date,
            output,
        } => {
            let filter = AttendanceFilter::new(class.as_deref(), date.as_deref())?;
            let records = client.list_attendance(&filter).await?;
            let report = AttendanceReport::build(&records, &filter);
            print!("{}", attendance::render_table(&report));
            if let Some(path) = output.as_deref() {
                write_report(path, &report)?;
            }
        }
        Command::Login { name, password } => {
            let profile = client.login(&Credentials { name, password }).await?;
            session.save(&profile)?;
            println!("Logged in as {} <{}>", profile.name, profile.email);
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            client
                .register(&Registration {
                    name,
                    email,
                    password,
                })
                .await?;
            println!("Registered.");
        }
        Command::Logout => {
            session.clear()?;
            println!("Logged out.");
        }
        Command::Whoami => match session.load()? {
            Some(p) => println!("{} <{}> (id {})", p.name, p.email, p.id),
            None => println!("Not logged in."),
        },
    }

    Ok(())
}

/// Feed stdin lines through the gate as if a decoder delivered them.
///
/// Lines are dispatched without waiting for the previous submission, so a
/// burst of repeated codes behaves like a code held in front of the camera.
async fn run_scan_loop(gate: ScanGate) -> Result<()> {
    let mut transitions = gate.subscribe();
    tokio::spawn(async move {
        while transitions.changed().await.is_ok() {
            let status = *transitions.borrow_and_update();
            println!("[{status}] {}", status.label());
        }
    });

    let mut set = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let payload = line.trim().to_string();
                if payload.is_empty() {
                    continue;
                }
                let gate = gate.clone();
                set.spawn(async move {
                    if let DecodeOutcome::Completed(entry) = gate.submit_decode(payload).await {
                        print_entry(&entry);
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, dropping in-flight scan");
                gate.reset().await;
                break;
            }
        }
    }

    while let Some(_res) = set.join_next().await {}
    gate.subscribe()
        .wait_for(|s| *s == ScanStatus::Ready)
        .await
        .context("gate closed")?;

    print_history(&gate.history().await);
    Ok(())
}

async fn run_students(client: &BackendClient, cmd: StudentsCommand) -> Result<()> {
    match cmd {
        StudentsCommand::List { search, class } => {
            let all = client.list_students().await?;
            let query = StudentQuery { search, class };
            let rows = students::filter_students(&all, &query);
            println!("Classes: {}", students::distinct_classes(&all).join(", "));
            for s in rows {
                println!("{:>5}  {:<30}  {:<12}  {:<6}  {}", s.id, s.name, s.nis, s.class, s.qr_code);
            }
        }
        StudentsCommand::Add {
            name,
            nis,
            class,
            phone,
        } => {
            let form = StudentForm::new(&name, &nis, &class, &phone);
            form.validate()?;
            let created = client.create_student(&form).await?;
            println!("Created student {} ({})", created.id, created.qr_code);
        }
        StudentsCommand::Update {
            id,
            name,
            nis,
            class,
            phone,
        } => {
            let all = client.list_students().await?;
            let Some(current) = all.iter().find(|s| s.id == id) else {
                bail!("student {id} not found");
            };
            let mut form = StudentForm::from(current);
            if let Some(name) = name {
                form.name = name;
            }
            if let Some(nis) = nis {
                form.set_nis(&nis);
            }
            if let Some(class) = class {
                form.class = class;
            }
            if let Some(phone) = phone {
                form.phone = phone;
            }
            form.validate()?;
            let updated = client.update_student(id, &form).await?;
            println!("Updated student {} ({})", updated.id, updated.qr_code);
        }
        StudentsCommand::Delete { id } => {
            client.delete_student(id).await?;
            println!("Deleted student {id}");
        }
        StudentsCommand::Qr { search, class } => {
            let all = client.list_students().await?;
            let query = StudentQuery { search, class };
            let rows = students::filter_students(&all, &query);
            for (s, file) in students::qr_targets(&rows) {
                println!("{:<24}  {}", file, s.qr_code);
            }
        }
    }
    Ok(())
}

fn write_report(path: &Path, report: &AttendanceReport) -> Result<()> {
    attendance::write_json(path, report)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    println!("Wrote {} rows to {}", report.rows.len(), path.display());
    Ok(())
}

fn print_entry(entry: &ScanHistoryEntry) {
    let mark = match entry.outcome {
        ScanOutcome::Success => "ok",
        ScanOutcome::Error => "FAILED",
    };
    println!(
        "{mark}: {} ({}) NIS {} <- {}",
        entry.display_name,
        entry.class_name,
        entry.nis.as_deref().unwrap_or("-"),
        entry.payload
    );
}

fn print_history(history: &[ScanHistoryEntry]) {
    print!("{}", history_table(history));
}

fn history_table(history: &[ScanHistoryEntry]) -> String {
    use std::fmt::Write;

    let mut name_w = "name".len();
    let mut payload_w = "payload".len();
    for e in history {
        name_w = name_w.max(e.display_name.chars().count());
        payload_w = payload_w.max(e.payload.chars().count().min(40));
    }

    let mut out = String::new();
    let _ = writeln!(out, "\nRecent scans: {}", history.len());
    let _ = writeln!(
        out,
        "{:<7}  {:<name_w$}  {:<8}  {:<payload_w$}  {}",
        "outcome", "name", "class", "payload", "time"
    );
    for e in history {
        let payload: String = e.payload.chars().take(40).collect();
        let outcome = match e.outcome {
            ScanOutcome::Success => "success",
            ScanOutcome::Error => "error",
        };
        let _ = writeln!(
            out,
            "{:<7}  {:<name_w$}  {:<8}  {:<payload_w$}  {}",
            outcome, e.display_name, e.class_name, payload, e.timestamp
        );
    }
    out
}
