//! Terrapin Easel
//!
//! A line-oriented presentation client. It runs one script against a
//! worker, prints captured output as it arrives, logs each canvas command
//! on its own line, and answers input requests from the terminal. No
//! rendering happens here; the canvas log is what a graphical easel would
//! replay.
//!
//! By default the worker runs embedded in this process; `--socket` joins a
//! running `terrapin-daemon` instead.
//!
//! # Usage
//!
//! ```bash
//! # Embedded worker
//! terrapin-easel spiral.doodle
//!
//! # Against a daemon
//! terrapin-easel --socket /run/user/1000/terrapin/worker.sock spiral.doodle
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use terrapin_core::transport::{EaselTransport, InProcessTransport, UnixSocketClient};
use terrapin_core::{
    CanvasCommand, DoodleEngine, EaselEvent, RunFilter, RunId, Worker, WorkerConfig, WorkerMessage,
};

#[derive(Parser, Debug)]
#[command(name = "terrapin-easel", version, about = "Run a turtle script and watch its output")]
struct Args {
    /// Script file to execute
    script: PathBuf,

    /// Connect to a worker daemon socket instead of embedding the worker
    #[arg(long, env = "TERRAPIN_SOCKET")]
    socket: Option<PathBuf>,
}

/// Spawn a worker in this process and return the transport to it.
fn embed_worker(config: &WorkerConfig) -> InProcessTransport {
    let (transport, event_rx, msg_tx) =
        InProcessTransport::new_pair_with_capacity(config.event_capacity);
    let worker = Worker::new(DoodleEngine::new, config, event_rx, msg_tx);
    tokio::spawn(worker.run());
    transport
}

fn describe(cmd: &CanvasCommand) -> String {
    match cmd {
        CanvasCommand::TurtlePose {
            position,
            heading,
            visible,
            pen_color,
        } => format!(
            "pose ({:.1}, {:.1}) heading {heading:.1} {} {pen_color}",
            position.x,
            position.y,
            if *visible { "shown" } else { "hidden" },
        ),
        CanvasCommand::LineSegment {
            from,
            to,
            color,
            width,
            ..
        } => format!(
            "line ({:.1}, {:.1}) -> ({:.1}, {:.1}) {color} width {width:.1}",
            from.x, from.y, to.x, to.y,
        ),
        CanvasCommand::Clear => "clear".to_string(),
        CanvasCommand::Background { color } => format!("background {color}"),
    }
}

async fn prompt_user(prompt: &str) -> anyhow::Result<String> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading input reply")?;
    Ok(line.trim_end_matches('\n').to_string())
}

async fn watch_run(
    transport: &mut (impl EaselTransport + ?Sized),
    run_id: RunId,
) -> anyhow::Result<i32> {
    let mut filter = RunFilter::new();
    filter.activate(run_id);

    loop {
        let msg = transport.recv().await.context("worker connection lost")?;
        if !filter.admits(&msg) {
            debug!(stale = %msg.run_id(), "dropping superseded message");
            continue;
        }
        match msg {
            WorkerMessage::Status { text, .. } => eprintln!("[status] {text}"),
            WorkerMessage::Ready { .. } => {}
            WorkerMessage::Stdout { text, .. } => print!("{text}"),
            WorkerMessage::Stderr { text, .. } => eprint!("{text}"),
            WorkerMessage::Canvas { cmd, .. } => println!("[canvas] {}", describe(&cmd)),
            WorkerMessage::InputRequest { prompt, .. } => {
                let reply = prompt_user(&prompt).await?;
                transport
                    .send(EaselEvent::InputResponse { text: reply })
                    .await
                    .context("sending input reply")?;
            }
            WorkerMessage::Done { .. } => return Ok(0),
            WorkerMessage::Error { text, .. } => {
                eprintln!("error: {text}");
                return Ok(1);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let code = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {:?}", args.script))?;

    let mut config = WorkerConfig::load(None).context("loading configuration")?;
    if let Some(socket) = args.socket {
        config.socket_path = Some(socket);
    }

    let mut transport: Box<dyn EaselTransport> = match &config.socket_path {
        Some(_) => {
            let mut client = UnixSocketClient::new(config.resolved_socket_path());
            client.connect().await.context("connecting to daemon")?;
            Box::new(client)
        }
        None => Box::new(embed_worker(&config)),
    };

    transport.send(EaselEvent::Init).await?;
    loop {
        let msg = transport.recv().await.context("worker connection lost")?;
        match msg {
            WorkerMessage::Ready { .. } => break,
            WorkerMessage::Status { text, .. } => eprintln!("[status] {text}"),
            WorkerMessage::Error { text, .. } => {
                anyhow::bail!("worker failed to initialize: {text}")
            }
            other => debug!(?other, "message before ready"),
        }
    }

    // A single-shot client: one run, id 1.
    let run_id = RunId(1);
    transport
        .send(EaselEvent::Run { run_id, code })
        .await
        .context("submitting run")?;

    let exit_code = watch_run(transport.as_mut(), run_id).await?;
    transport.disconnect().await.ok();
    std::process::exit(exit_code);
}
