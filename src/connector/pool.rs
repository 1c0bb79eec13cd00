//! Connector Pool
//!
//! A fixed set of [`AsyncConnector`]s sharing one configuration. The owner
//! ticks them together and picks an idle one per request.

use rand::Rng;
use tracing::{error, info};

use crate::core::config::ConnectorConfig;
use crate::core::error::{ConnectorError, Result};
use crate::store::{StoreClient, StoreConfig};

use super::facade::{AsyncConnector, UpdateReport};

/// Fixed-size group of connectors.
pub struct ConnectorPool {
    connectors: Vec<AsyncConnector>,
}

impl ConnectorPool {
    /// Start `count` connectors, each around `make_client(index)`, and queue
    /// a connect on every one. Connect outcomes are logged.
    pub fn init<C, F>(
        count: usize,
        config: ConnectorConfig,
        store: &StoreConfig,
        mut make_client: F,
    ) -> Result<Self>
    where
        C: StoreClient,
        F: FnMut(usize) -> C,
    {
        if count == 0 {
            return Err(ConnectorError::invalid("pool needs at least one connector"));
        }

        let mut connectors = Vec::with_capacity(count);
        for index in 0..count {
            let mut connector = AsyncConnector::start(make_client(index), config.clone())?;
            let name = connector.name().to_string();
            connector.connect(store, move |reply| {
                if reply.is_error() {
                    error!(
                        connector = %name,
                        reply = %reply,
                        "store connect failed"
                    );
                } else {
                    info!(connector = %name, "store connected");
                }
            })?;
            connectors.push(connector);
        }

        info!(
            count,
            host = %store.host,
            port = store.port,
            "connector pool initialized"
        );
        Ok(Self { connectors })
    }

    /// Tick every connector. Returns the summed report.
    pub fn update(&mut self) -> UpdateReport {
        let mut total = UpdateReport::default();
        for connector in &mut self.connectors {
            total += connector.update();
        }
        total
    }

    /// First connector that is not busy, or a random one if all are.
    pub fn get_connector(&mut self) -> &mut AsyncConnector {
        let index = match self.connectors.iter().position(|c| !c.is_busy()) {
            Some(index) => index,
            None => rand::thread_rng().gen_range(0..self.connectors.len()),
        };
        &mut self.connectors[index]
    }

    /// Connector at `index`.
    pub fn connector(&mut self, index: usize) -> Option<&mut AsyncConnector> {
        self.connectors.get_mut(index)
    }

    /// Number of connectors.
    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    /// Always false once initialized.
    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Requests waiting across the pool.
    pub fn pending_requests(&self) -> usize {
        self.connectors.iter().map(AsyncConnector::pending_requests).sum()
    }

    /// Queue items alive across the pool.
    pub fn outstanding_items(&self) -> usize {
        self.connectors.iter().map(AsyncConnector::outstanding_items).sum()
    }

    /// Stop every connector.
    pub fn stop(&mut self) {
        for connector in &mut self.connectors {
            connector.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reply::ReplyValue;
    use crate::store::MemoryServer;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn config() -> ConnectorConfig {
        ConnectorConfig {
            idle_sleep: Duration::from_millis(1),
            spin_rounds: 4,
            ..Default::default()
        }
    }

    fn settle(pool: &mut ConnectorPool) -> UpdateReport {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut total = UpdateReport::default();
        while pool.pending_requests() > 0 {
            assert!(Instant::now() < deadline, "pool did not settle");
            total += pool.update();
            thread::sleep(Duration::from_millis(1));
        }
        total
    }

    #[test]
    fn test_zero_connectors_rejected() {
        let server = MemoryServer::new();
        let err = ConnectorPool::init(0, config(), &StoreConfig::default(), |_| server.client())
            .err()
            .unwrap();
        assert!(matches!(err, ConnectorError::InvalidArgument(_)));
    }

    #[test]
    fn test_init_connects_every_connector() {
        let server = MemoryServer::new();
        let mut pool =
            ConnectorPool::init(3, config(), &StoreConfig::default(), |_| server.client()).unwrap();
        assert_eq!(pool.len(), 3);
        assert!(!pool.is_empty());
        assert_eq!(pool.pending_requests(), 3);

        let report = settle(&mut pool);
        assert_eq!(report.delivered, 3);
        assert_eq!(pool.outstanding_items(), 0);
    }

    #[test]
    fn test_connectors_share_the_server() {
        let server = MemoryServer::new();
        let mut pool =
            ConnectorPool::init(4, config(), &StoreConfig::default(), |_| server.client()).unwrap();
        settle(&mut pool);

        for i in 0..40 {
            pool.get_connector()
                .command("INCR", &["hits"], |_| {})
                .unwrap();
            if i % 10 == 0 {
                pool.update();
            }
        }
        settle(&mut pool);

        let seen = Rc::new(RefCell::new(ReplyValue::Nil));
        let seen_cb = seen.clone();
        pool.connector(2)
            .unwrap()
            .command("GET", &["hits"], move |reply| *seen_cb.borrow_mut() = reply)
            .unwrap();
        settle(&mut pool);
        assert_eq!(*seen.borrow(), ReplyValue::str("40"));
        assert!(pool.connector(4).is_none());
    }

    fn slow_pool(slow: &[usize]) -> (MemoryServer, ConnectorPool) {
        let server = MemoryServer::new();
        let mut pool = ConnectorPool::init(2, config(), &StoreConfig::default(), |i| {
            let latency = if slow.contains(&i) {
                Duration::from_millis(300)
            } else {
                Duration::ZERO
            };
            server.client().with_latency(latency)
        })
        .unwrap();
        settle(&mut pool);
        (server, pool)
    }

    fn occupy(pool: &mut ConnectorPool, index: usize) {
        pool.connector(index)
            .unwrap()
            .command("PING", &[] as &[&str], |_| {})
            .unwrap();
    }

    fn name_of(pool: &mut ConnectorPool, index: usize) -> String {
        pool.connector(index).unwrap().name().to_string()
    }

    #[test]
    fn test_get_connector_skips_busy() {
        let (_server, mut pool) = slow_pool(&[0]);
        let fast = name_of(&mut pool, 1);
        let slow = name_of(&mut pool, 0);
        assert_eq!(pool.get_connector().name(), slow);

        occupy(&mut pool, 0);
        pool.update();
        thread::sleep(Duration::from_millis(50));
        assert!(pool.connector(0).unwrap().is_busy());
        assert!(!pool.connector(1).unwrap().is_busy());
        assert_eq!(pool.get_connector().name(), fast);

        settle(&mut pool);
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.connector(0).unwrap().is_busy() {
            assert!(Instant::now() < deadline, "connector stayed busy");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pool.get_connector().name(), slow);
    }

    #[test]
    fn test_get_connector_falls_back_when_all_busy() {
        let (_server, mut pool) = slow_pool(&[0, 1]);
        let names = [name_of(&mut pool, 0), name_of(&mut pool, 1)];

        occupy(&mut pool, 0);
        occupy(&mut pool, 1);
        pool.update();
        thread::sleep(Duration::from_millis(50));
        assert!(pool.connector(0).unwrap().is_busy());
        assert!(pool.connector(1).unwrap().is_busy());

        let mut seen = [false; 2];
        for _ in 0..64 {
            let picked = pool.get_connector().name().to_string();
            let index = names.iter().position(|n| *n == picked).unwrap();
            seen[index] = true;
        }
        assert_eq!(seen, [true, true]);
        pool.stop();
    }

    #[test]
    fn test_stop_releases_pool() {
        let server = MemoryServer::new();
        let mut pool =
            ConnectorPool::init(2, config(), &StoreConfig::default(), |_| server.client()).unwrap();
        pool.get_connector().command("PING", &[] as &[&str], |_| {}).unwrap();
        pool.stop();
        assert_eq!(pool.pending_requests(), 0);
        assert_eq!(pool.outstanding_items(), 0);
        assert_eq!(pool.update(), UpdateReport::default());
    }
}
