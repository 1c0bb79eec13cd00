//! Store Connector Demo
//!
//! Drives a small connector pool from a fixed-rate tick loop, the way a
//! game server frame would, against the in-process backends.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use store_connector::{
    AsyncConnector, ConnectorConfig, ConnectorPool, MemoryServer, OrderedDb, OrderedOps,
    ReplyValue, StoreConfig, VERSION,
};

/// Frames per second of the demo loop.
const TICK_RATE: u64 = 60;
/// Give up waiting for replies after this many frames.
const MAX_FRAMES: u64 = TICK_RATE * 5;

type Replies = Rc<RefCell<Vec<(String, ReplyValue)>>>;

fn collect(replies: &Replies, label: impl Into<String>) -> impl FnOnce(ReplyValue) + 'static {
    let replies = replies.clone();
    let label = label.into();
    move |reply| replies.borrow_mut().push((label, reply))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Store Connector Demo v{}", VERSION);

    let config = ConnectorConfig::from_env();
    let store = StoreConfig::from_env();
    info!(
        host = %store.host,
        port = store.port,
        req_timeout_ms = config.req_timeout.as_millis() as u64,
        "configuration loaded"
    );

    demo_pool(config.clone(), &store).await?;
    demo_ordered(config).await?;
    Ok(())
}

/// Commands and a pipeline through a pool of key/value connectors.
async fn demo_pool(config: ConnectorConfig, store: &StoreConfig) -> anyhow::Result<()> {
    info!("=== Key/Value Pool ===");
    let server = MemoryServer::new();
    let mut pool = ConnectorPool::init(2, config, store, |_| {
        server.client().with_latency(Duration::from_millis(2))
    })?;
    let replies: Replies = Rc::default();

    pool.get_connector()
        .command("SET", &["player:1:gold", "100"], collect(&replies, "SET gold"))?;
    pool.get_connector()
        .command("HSET", &["player:1", "name", "Ayla", "class", "mage"], collect(&replies, "HSET profile"))?;

    let connector = pool.get_connector();
    connector.add_pipe("INCRBY", &["player:1:gold", "25"])?;
    connector.add_pipe("HGETALL", &["player:1"])?;
    connector.add_pipe("DBSIZE", &[] as &[&str])?;
    connector.commit_pipe(collect(&replies, "pipeline"))?;

    run_frames(|| {
        let report = pool.update();
        if report.timed_out > 0 {
            warn!(timed_out = report.timed_out, "requests timed out");
        }
        pool.pending_requests() == 0
    })
    .await;

    for (label, reply) in replies.borrow().iter() {
        info!("{label}: {reply}");
    }
    info!(keys = server.key_count(store.db_index), "key/value demo done");
    pool.stop();
    Ok(())
}

/// Typed operations against the embedded ordered engine.
async fn demo_ordered(config: ConnectorConfig) -> anyhow::Result<()> {
    info!("=== Ordered Store ===");
    let db = OrderedDb::new();
    let mut connector = AsyncConnector::start(db.client(), config)?;
    let replies: Replies = Rc::default();

    let path = StoreConfig {
        host: "saves/world-1".into(),
        ..Default::default()
    };
    connector.connect(&path, collect(&replies, "open"))?;
    connector.put(b"world:seed", b"12345", collect(&replies, "put seed"))?;
    let inventory: [(&[u8], &[u8]); 2] = [(b"sword", b"1"), (b"potion", b"3")];
    connector.hmset(b"player:1:inv", &inventory, collect(&replies, "hmset inventory"))?;
    connector.hgetall(b"player:1:inv", collect(&replies, "hgetall inventory"))?;
    connector.approximate_size(b"", b"", collect(&replies, "approximate size"))?;

    run_frames(|| {
        connector.update();
        connector.pending_requests() == 0
    })
    .await;

    for (label, reply) in replies.borrow().iter() {
        info!("{label}: {reply}");
    }
    info!(entries = db.len(), "ordered demo done");
    connector.stop();
    Ok(())
}

/// Tick `frame` at [`TICK_RATE`] until it reports done or the frame limit.
async fn run_frames(mut frame: impl FnMut() -> bool) {
    let mut ticker = interval(Duration::from_micros(1_000_000 / TICK_RATE));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    for n in 0..MAX_FRAMES {
        ticker.tick().await;
        if frame() {
            info!(frames = n + 1, "all replies delivered");
            return;
        }
    }
    warn!(frames = MAX_FRAMES, "gave up waiting for replies");
}
