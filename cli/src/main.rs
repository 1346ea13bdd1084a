use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use frames::Frame;
use futures_util::{SinkExt, StreamExt};
use proto::{Answer, EnrollmentRequest, Question, Student, Test, TestServiceClient, method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use session::{CallOptions, Code, Connection, ErrorCode, Pacing, SessionError, Transport};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

const OUTBOUND_CAPACITY: usize = 256;
const INBOUND_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid websocket URL: {0}")]
    InvalidUrl(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("health check failed: HTTP {0}")]
    HealthCheck(u16),
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("call failed: {0}")]
    Call(#[from] SessionError),
    #[error("cannot read input: {0}")]
    Input(String),
    #[error("invalid JSON input: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit status: 2 bad input, 3 not found, 4 unavailable,
    /// 5 cancelled or timed out, 1 anything else.
    fn exit_code(&self) -> u8 {
        let code = match self {
            Self::Call(e) => e.code(),
            Self::InvalidUrl(_) | Self::Input(_) | Self::InvalidJson(_) => Code::Invalid,
            Self::Http(_) | Self::HealthCheck(_) | Self::WsConnect(_) => Code::Unavailable,
        };
        match code {
            Code::Invalid => 2,
            Code::NotFound => 3,
            Code::Unavailable => 4,
            Code::Cancelled => 5,
            Code::Internal => 1,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "testrpc", about = "TestService streaming RPC client")]
struct Cli {
    #[arg(long, env = "TESTRPC_URL", default_value = "ws://127.0.0.1:5070/ws")]
    url: String,

    #[arg(long, env = "TESTRPC_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the server's health endpoint.
    Ping,
    /// List every call with its request and reply cardinality.
    Methods,
    /// Fetch one test (unary).
    GetTest { id: String },
    /// Create or rename a test (unary).
    SetTest {
        id: String,
        #[arg(long)]
        name: String,
    },
    /// Create or update a student (unary).
    SetStudent {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: i32,
    },
    /// Stream questions to the server (client streaming).
    SetQuestions(SetQuestionsArgs),
    /// Enroll students in a test (client streaming).
    Enroll {
        #[arg(long, default_value = "t1")]
        test_id: String,
        #[arg(required = true)]
        student_ids: Vec<String>,
    },
    /// List students enrolled in a test (server streaming).
    Students {
        #[arg(default_value = "t1")]
        test_id: String,
    },
    /// Answer questions while grades stream back (bidirectional).
    TakeTest(TakeTestArgs),
}

#[derive(Args, Debug)]
struct SetQuestionsArgs {
    #[arg(long, help = "JSONL file of questions, or - for stdin; defaults to the t1 sample set")]
    input: Option<String>,

    #[arg(long, default_value_t = 0)]
    interval_ms: u64,
}

#[derive(Args, Debug)]
struct TakeTestArgs {
    #[arg(long, default_value = "t1")]
    test_id: String,

    #[arg(long, default_value = "s1")]
    student_id: String,

    #[arg(long, default_value = "42", help = "Answer repeated --count times")]
    answer: String,

    #[arg(long, default_value_t = 4)]
    count: usize,

    #[arg(long, value_delimiter = ',', help = "Explicit answers; overrides --answer and --count")]
    answers: Vec<String>,

    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

#[derive(Debug, Clone)]
struct CliContext {
    url: String,
    timeout: Duration,
}

impl CliContext {
    fn options(&self, pacing: Pacing) -> CallOptions {
        CallOptions::default().with_deadline(self.timeout).with_pacing(pacing)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    let ctx = CliContext { url: cli.url, timeout: Duration::from_secs(cli.timeout_secs) };

    match run(&ctx, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(ctx: &CliContext, command: Command) -> Result<(), CliError> {
    match command {
        Command::Ping => run_ping(ctx).await,
        Command::Methods => {
            for line in method_table() {
                println!("{line}");
            }
            Ok(())
        }
        Command::GetTest { id } => {
            let client = connect(ctx, Pacing::Immediate).await?;
            print_json(&client.get_test(&id).await?)
        }
        Command::SetTest { id, name } => {
            let client = connect(ctx, Pacing::Immediate).await?;
            print_json(&client.set_test(&Test { id, name }).await?)
        }
        Command::SetStudent { id, name, age } => {
            let client = connect(ctx, Pacing::Immediate).await?;
            print_json(&client.set_student(&Student { id, name, age }).await?)
        }
        Command::SetQuestions(args) => run_set_questions(ctx, args).await,
        Command::Enroll { test_id, student_ids } => {
            let client = connect(ctx, Pacing::Immediate).await?;
            let enrollments = student_ids
                .into_iter()
                .map(|student_id| EnrollmentRequest { student_id, test_id: test_id.clone() });
            print_json(&client.enroll_students(enrollments).await?)
        }
        Command::Students { test_id } => {
            let client = connect(ctx, Pacing::Immediate).await?;
            let count = client.get_students_per_test(&test_id, |student| print_line(&student)).await?;
            eprintln!("students: {count}");
            Ok(())
        }
        Command::TakeTest(args) => run_take_test(ctx, args).await,
    }
}

async fn run_ping(ctx: &CliContext) -> Result<(), CliError> {
    let url = health_url(&ctx.url)?;
    let response = reqwest::Client::new().get(url).timeout(ctx.timeout).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::HealthCheck(status.as_u16()));
    }
    println!("ok");
    Ok(())
}

async fn run_set_questions(ctx: &CliContext, args: SetQuestionsArgs) -> Result<(), CliError> {
    let questions: Vec<Question> = match args.input.as_deref() {
        Some(path) => read_jsonl(path)?,
        None => proto::sample_questions(),
    };
    for question in &questions {
        eprintln!("sending question: {}", question.id);
    }

    let client = connect(ctx, pacing(args.interval_ms)).await?;
    print_json(&client.set_questions(questions).await?)
}

async fn run_take_test(ctx: &CliContext, args: TakeTestArgs) -> Result<(), CliError> {
    let client = connect(ctx, pacing(args.interval_ms)).await?;
    let exchange = client.take_test(planned_answers(&args), |result| print_line(&result)).await?;
    eprintln!("take test complete: sent={} received={}", exchange.sent, exchange.received);
    Ok(())
}

fn planned_answers(args: &TakeTestArgs) -> Vec<Answer> {
    let texts = if args.answers.is_empty() { vec![args.answer.clone(); args.count] } else { args.answers.clone() };
    texts
        .into_iter()
        .map(|answer| Answer { test_id: args.test_id.clone(), student_id: args.student_id.clone(), answer })
        .collect()
}

fn method_table() -> Vec<String> {
    method::ALL
        .iter()
        .filter_map(|name| method::shape(name).map(|shape| (name, shape)))
        .map(|(name, shape)| {
            let request = cardinality(shape.client_streams());
            let reply = cardinality(shape.server_streams());
            format!("{name:<34} request={request} reply={reply}")
        })
        .collect()
}

fn cardinality(streams: bool) -> &'static str {
    if streams { "stream" } else { "single" }
}

fn pacing(interval_ms: u64) -> Pacing {
    if interval_ms == 0 { Pacing::Immediate } else { Pacing::Fixed(Duration::from_millis(interval_ms)) }
}

// =============================================================================
// WEBSOCKET BRIDGE
// =============================================================================

/// Connect to the server and bridge the websocket onto a session transport.
async fn connect(ctx: &CliContext, pacing: Pacing) -> Result<TestServiceClient, CliError> {
    let (socket, _) = connect_async(ctx.url.as_str())
        .await
        .map_err(|error| CliError::WsConnect(Box::new(error)))?;
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(OUTBOUND_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(INBOUND_CAPACITY);

    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            debug!(call_id = %frame.call_id, seq = frame.seq, status = ?frame.status, "cli: send frame");
            if sink.send(Message::Binary(frames::encode_frame(&frame).into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Binary(bytes) => match frames::decode_frame(&bytes) {
                    Ok(frame) => {
                        if inbound_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "cli: invalid inbound frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let conn = Connection::new(Transport::new(outbound_tx, inbound_rx));
    Ok(TestServiceClient::new(conn).with_options(ctx.options(pacing)))
}

fn health_url(ws_url: &str) -> Result<String, CliError> {
    let (scheme, rest) = if let Some(rest) = ws_url.strip_prefix("ws://") {
        ("http", rest)
    } else if let Some(rest) = ws_url.strip_prefix("wss://") {
        ("https", rest)
    } else {
        return Err(CliError::InvalidUrl(ws_url.to_owned()));
    };
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(CliError::InvalidUrl(ws_url.to_owned()));
    }
    Ok(format!("{scheme}://{host}/healthz"))
}

// =============================================================================
// INPUT / OUTPUT
// =============================================================================

fn read_jsonl<T: DeserializeOwned>(path: &str) -> Result<Vec<T>, CliError> {
    let reader: Box<dyn BufRead> = if path == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(path).map_err(|error| CliError::Input(format!("{path}: {error}")))?;
        Box::new(BufReader::new(file))
    };

    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|error| CliError::Input(error.to_string()))?;
        if let Some(item) = parse_jsonl_line(&line)? {
            items.push(item);
        }
    }
    Ok(items)
}

fn parse_jsonl_line<T: DeserializeOwned>(line: &str) -> Result<Option<T>, CliError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

fn print_line<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "cli: cannot render reply"),
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
