use std::sync::Arc;

use anyhow::{Context, Error};
use clap::Parser;
use log::{error, info};
use rhost_host::{run_io_worker, MockEngine, Session, Transport};
use tokio::net::TcpListener;

/// Runs one `rhost` session over a websocket, driven by the toy
/// [`MockEngine`] arithmetic/variable REPL. Accepts a single connection and
/// exits once that session ends — standing in for the real embedder's
/// process lifecycle, which is out of scope for this crate.
#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. `127.0.0.1:9000`.
    #[arg(long, default_value = "127.0.0.1:9000")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Args::parse();

    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("could not bind to `{}`", args.listen))?;
    info!("listening on {}", args.listen);

    let (stream, peer) = listener
        .accept()
        .await
        .context("could not accept connection")?;
    info!("accepted connection from {peer}");

    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake failed")?;
    let transport = Transport::new(ws);

    let engine = Arc::new(MockEngine::new());
    let (session, io) = Session::new(engine);

    let engine_thread = std::thread::Builder::new()
        .name("rhost-engine".to_owned())
        .spawn(move || session.run("rhost-mock", "0.1"))
        .context("failed to spawn engine thread")?;

    run_io_worker(transport, io).await;

    if let Err(e) = engine_thread.join() {
        error!("engine thread panicked: {e:?}");
    }

    Ok(())
}
