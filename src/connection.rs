//! Explicit connection pooling.
//!
//! The pool lends out whole connections and takes them back by value; it
//! never queues a waiter. One connection is opened eagerly at construction
//! so an unreachable server fails fast, further connections are opened on
//! demand up to `max_connections`.

use std::collections::HashSet;

use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection as _, PgConnection};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::PostgresConfig;
use crate::error::{MessageDbError, Result};

/// A connection on loan from a [`ConnectionPool`].
#[derive(Debug)]
pub struct Connection {
    id: u64,
    inner: PgConnection,
}

impl Connection {
    /// Pool-assigned identity of this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn as_mut(&mut self) -> &mut PgConnection {
        &mut self.inner
    }
}

#[derive(Debug)]
struct PoolState {
    idle: Vec<Connection>,
    in_use: HashSet<u64>,
    next_id: u64,
    closed: bool,
}

/// Bounded pool of PostgreSQL connections.
///
/// Acquisition fails immediately with `PoolExhausted` once
/// `max_connections` are on loan; releasing is the caller's job on every
/// path, there is no guard that returns connections on drop.
#[derive(Debug)]
pub struct ConnectionPool {
    options: PgConnectOptions,
    max_connections: usize,
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    /// Opens a pool against `config`, establishing one connection up front.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        Self::with_options(config.connect_options(), config.max_connections).await
    }

    /// Opens a pool from a PostgreSQL connection URL, e.g.
    /// `postgresql://message_store@localhost:5432/message_store`.
    pub async fn from_url(url: &str, max_connections: usize) -> Result<Self> {
        let options = url
            .parse::<PgConnectOptions>()
            .map_err(MessageDbError::Connection)?;
        Self::with_options(options, max_connections).await
    }

    async fn with_options(options: PgConnectOptions, max_connections: usize) -> Result<Self> {
        if max_connections == 0 {
            return Err(MessageDbError::InvalidMaxConnections);
        }

        let pool = Self {
            options,
            max_connections,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                in_use: HashSet::new(),
                next_id: 1,
                closed: false,
            }),
        };

        let first = pool.open_connection(0).await?;
        pool.state.lock().await.idle.push(first);

        info!(max_connections, "message store connection pool established");
        Ok(pool)
    }

    /// Upper bound on connections this pool will open.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Number of idle connections currently parked in the pool.
    pub async fn idle_count(&self) -> usize {
        self.state.lock().await.idle.len()
    }

    /// Number of connections currently on loan.
    pub async fn in_use_count(&self) -> usize {
        self.state.lock().await.in_use.len()
    }

    /// Takes a connection from the pool, opening a new one when none are
    /// idle and the limit allows it.
    pub async fn acquire(&self) -> Result<Connection> {
        let id = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(MessageDbError::PoolClosed);
            }
            if let Some(conn) = state.idle.pop() {
                state.in_use.insert(conn.id);
                return Ok(conn);
            }
            if state.idle.len() + state.in_use.len() >= self.max_connections {
                return Err(MessageDbError::PoolExhausted {
                    max_connections: self.max_connections,
                });
            }
            let id = state.next_id;
            state.next_id += 1;
            // Reserve the slot before connecting so concurrent acquires
            // cannot overshoot the limit while this connect is in flight.
            state.in_use.insert(id);
            id
        };

        match self.open_connection(id).await {
            Ok(conn) => Ok(conn),
            Err(err) => {
                self.state.lock().await.in_use.remove(&id);
                Err(err)
            }
        }
    }

    /// Returns a connection to the pool. With `close` set, or after
    /// `close_all`, the connection is terminated instead of re-pooled.
    pub async fn release(&self, conn: Connection, close: bool) -> Result<()> {
        let id = conn.id;
        let mut state = self.state.lock().await;

        if state.closed {
            drop(state);
            Self::terminate(conn).await;
            return Err(MessageDbError::PoolClosed);
        }
        if !state.in_use.remove(&id) {
            drop(state);
            Self::terminate(conn).await;
            return Err(MessageDbError::UnknownConnection { id });
        }

        if close {
            drop(state);
            conn.inner.close().await.map_err(MessageDbError::Connection)?;
            debug!(id, "closed message store connection");
            return Ok(());
        }

        state.idle.push(conn);
        Ok(())
    }

    /// Closes every idle connection and refuses further acquisition.
    ///
    /// Connections still on loan are no longer tracked; releasing one
    /// afterwards fails with `PoolClosed` and closes it. Idempotent.
    pub async fn close_all(&self) {
        let (idle, already_closed) = {
            let mut state = self.state.lock().await;
            let already_closed = state.closed;
            state.closed = true;
            state.in_use.clear();
            (std::mem::take(&mut state.idle), already_closed)
        };

        for conn in idle {
            Self::terminate(conn).await;
        }

        if !already_closed {
            info!("message store connection pool closed");
        }
    }

    async fn open_connection(&self, id: u64) -> Result<Connection> {
        let inner = self
            .options
            .connect()
            .await
            .map_err(MessageDbError::Connection)?;
        debug!(id, "opened message store connection");
        Ok(Connection { id, inner })
    }

    /// Best-effort close for connections the pool will not lend again.
    async fn terminate(conn: Connection) {
        let id = conn.id;
        if let Err(err) = conn.inner.close().await {
            debug!(id, error = %err, "error closing message store connection");
        }
    }
}
