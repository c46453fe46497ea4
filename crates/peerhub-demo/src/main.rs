//! peerhub Demo - TCP broadcast room
//!
//! Every connected client receives every message sent by any client. The
//! configured discipline decides when the room sees a message:
//! - `event_driven`: as soon as it arrives, on the sender's own task
//! - `fifo`: one at a time, in global arrival order
//! - `lockstep`: once per step, the whole batch at once
//!
//! Optional extras: a stdout echo with stdin input, a journal file, a
//! followed file whose new lines are broadcast, and a heartbeat.

mod config;
mod room;

use std::error::Error;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing_subscriber::EnvFilter;

use peerhub_broadcast::Broadcaster;
use peerhub_core::{PeerError, PeerMessage, Server, ServerRef};
use peerhub_handle::StopOnlyHandle;
use peerhub_node::{FileNode, StdioNode, TailNode, Ticker};
use peerhub_server::{EventDrivenServer, FifoServer, LockstepServer};
use peerhub_transport::TcpPeerListener;

use config::{DemoConfig, Discipline, LogFormat};
use room::Room;

/// Run-loop surface shared by the three servers
trait Runnable: Server + 'static {
    fn run(self: Arc<Self>) -> BoxFuture<'static, Vec<PeerError>>;
    fn halt(&self);
}

impl Runnable for EventDrivenServer {
    fn run(self: Arc<Self>) -> BoxFuture<'static, Vec<PeerError>> {
        async move { self.start().await }.boxed()
    }

    fn halt(&self) {
        self.stop();
    }
}

impl Runnable for FifoServer {
    fn run(self: Arc<Self>) -> BoxFuture<'static, Vec<PeerError>> {
        async move { self.start().await }.boxed()
    }

    fn halt(&self) {
        self.stop();
    }
}

impl Runnable for LockstepServer {
    fn run(self: Arc<Self>) -> BoxFuture<'static, Vec<PeerError>> {
        async move { self.start().await }.boxed()
    }

    fn halt(&self) {
        self.stop();
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the console echo
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = DemoConfig::load()?;
    init_logging(config.log_format);

    let mut room = Room::new(Broadcaster::with_config(&config.broadcaster));
    if let Some(path) = &config.journal_path {
        let journal = FileNode::default().filename(path).spawn().await?;
        room = room.with_sink("journal", journal);
    }
    let console = config.console.then(StdioNode::default);
    if let Some(console) = &console {
        room = room.with_sink("console", console.handle());
    }
    if let Some(console) = console {
        let room = room.clone();
        console
            .on_input(move |line: Bytes| room.broadcaster().write(line))
            .spawn();
    }

    let mut background: Vec<StopOnlyHandle> = Vec::new();
    if config.heartbeat_ms > 0 {
        let room = room.clone();
        let ticker = Ticker::new(config.heartbeat_ms)
            .on_tick(move |n| room.announce(Bytes::from(format!("heartbeat {n}"))));
        background.push(ticker.spawn()?);
    }
    if let Some(path) = &config.follow_path {
        let room = room.clone();
        let tail = TailNode::new(path).on_new_line(move |line| room.announce(line));
        background.push(tail.spawn().await?);
    }

    let listener = TcpPeerListener::bind(config.listen)
        .await?
        .peer_config(config.net.clone());
    tracing::info!(
        addr = %listener.local_addr(),
        discipline = ?config.discipline,
        "peerhub demo listening"
    );

    let errors = match config.discipline {
        Discipline::EventDriven => {
            let server = EventDrivenServer::new();
            room.attach(server.registry());
            let publisher = room.clone();
            server.on_message(move |msg: PeerMessage, _server: Arc<EventDrivenServer>| {
                let room = publisher.clone();
                async move {
                    room.publish(msg.into_data()).await;
                    Ok::<(), PeerError>(())
                }
            });
            serve(server, listener).await
        }
        Discipline::Fifo => {
            let server = FifoServer::new();
            room.attach(server.registry());
            let publisher = room.clone();
            server.on_message(move |msg: PeerMessage, _server: Arc<FifoServer>| {
                let room = publisher.clone();
                async move {
                    room.publish(msg.into_data()).await;
                    Ok::<(), PeerError>(())
                }
            });
            serve(server, listener).await
        }
        Discipline::Lockstep => {
            let server = LockstepServer::with_config(&config.lockstep);
            room.attach(server.registry());
            let publisher = room.clone();
            server.on_step(
                move |step: u64, batch: Arc<[PeerMessage]>, _server: Arc<LockstepServer>| {
                    let room = publisher.clone();
                    async move {
                        for msg in batch.iter() {
                            room.publish(msg.data().clone()).await;
                        }
                        tracing::trace!(step, count = batch.len(), "step delivered");
                        Ok::<(), PeerError>(())
                    }
                },
            );
            serve(server, listener).await
        }
    };

    for handle in background {
        let _ = handle.stop().await;
    }
    room.close().await;
    for e in &errors {
        tracing::warn!(error = %e, "peer close failed during shutdown");
    }
    tracing::info!("peerhub demo stopped");
    Ok(())
}

/// Accept connections into `server` until ctrl-c, then shut both down
async fn serve<S: Runnable>(server: Arc<S>, listener: TcpPeerListener) -> Vec<PeerError> {
    let server_ref: ServerRef = server.clone();
    let accept = listener.spawn(server_ref);
    let runner = tokio::spawn(server.clone().run());

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c, shutting down");
    }
    tracing::info!("shutting down");

    let _ = accept.stop().await;
    server.halt();
    match runner.await {
        Ok(errors) => errors,
        Err(e) => {
            tracing::error!(error = %e, "server task failed");
            Vec::new()
        }
    }
}
