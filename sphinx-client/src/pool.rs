//! # Connection Pool
//!
//! Purpose: Keep a bounded set of handshaken searchd connections so each
//! query skips the TCP connect, version exchange and persist command.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections;
//!    dialing and handshaking happen outside it.
//! 3. **Block, Don't Fail**: At capacity, `acquire` waits on a condvar until a
//!    connection is returned or a slot frees up.
//! 4. **Retire on Error**: A connection that failed mid-use is dropped, never
//!    handed to the next query.
//! 5. **Explicit Shutdown**: `close` drops idle connections, shuts down the
//!    sockets of lent ones so blocked reads return, and wakes every waiter
//!    with `PoolClosed`.

use std::collections::{HashMap, VecDeque};
use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use sphinx_common::{
    persist_frame, ResponseHeader, SearchdCommand, MAJOR_PROTOCOL_VERSION, RESPONSE_HEADER_LEN,
};

use crate::client::{ClientError, ClientResult};
use crate::request::SearchRequest;

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server host name or IP.
    pub host: String,
    pub port: u16,
    /// Deadline for dialing plus the handshake.
    pub connect_timeout: Duration,
    /// Connections opened eagerly when the pool is created.
    pub starting_size: usize,
    /// Maximum total connections (idle + in-use).
    pub max_size: usize,
    /// Largest response body accepted, in bytes.
    pub max_response_len: u32,
}

struct PoolState {
    idle: VecDeque<Connection>,
    /// Socket handles of connections currently lent out, by lend id.
    lent: HashMap<u64, Arc<TcpStream>>,
    next_lend_id: u64,
    total: usize,
    closed: bool,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates the pool and opens `starting_size` connections.
    pub fn new(config: PoolConfig) -> ClientResult<Self> {
        let mut idle = VecDeque::with_capacity(config.max_size);
        for _ in 0..config.starting_size {
            idle.push_back(Connection::connect(&config)?);
        }
        let state = PoolState {
            total: idle.len(),
            idle,
            lent: HashMap::new(),
            next_lend_id: 0,
            closed: false,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        })
    }

    /// Acquires a connection, waiting while the pool is at capacity.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return Err(ClientError::PoolClosed);
            }
            if let Some(conn) = state.idle.pop_front() {
                return Ok(self.inner.lend(&mut state, conn));
            }
            if state.total < self.inner.config.max_size {
                state.total += 1;
                break;
            }
            self.inner.available.wait(&mut state);
        }
        drop(state);

        let conn = match Connection::connect(&self.inner.config) {
            Ok(conn) => conn,
            Err(err) => {
                self.inner.release_slot();
                return Err(err);
            }
        };

        let mut state = self.inner.state.lock();
        if state.closed {
            // Closed while dialing; the fresh connection is never lent.
            state.total = state.total.saturating_sub(1);
            return Err(ClientError::PoolClosed);
        }
        Ok(self.inner.lend(&mut state, conn))
    }

    /// Closes every member connection and fails current and future waiters.
    ///
    /// Idle connections are dropped. Lent connections have their socket shut
    /// down, so a query blocked on them fails with `PoolClosed`; they are
    /// dropped when they come back.
    pub fn close(&self) {
        let (idle, lent) = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.total = state.total.saturating_sub(idle.len());
            let lent: Vec<Arc<TcpStream>> = state.lent.values().cloned().collect();
            (idle, lent)
        };
        for stream in &lent {
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                debug!(%err, "shutdown of lent connection failed");
            }
        }
        debug!(idle = idle.len(), lent = lent.len(), "connection pool closed");
        drop(idle);
        self.inner.available.notify_all();
    }

    /// Number of idle connections.
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Number of open connections, idle or lent out.
    pub fn total_count(&self) -> usize {
        self.inner.state.lock().total
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl PoolInner {
    fn lend(self: &Arc<Self>, state: &mut PoolState, conn: Connection) -> PooledConnection {
        let id = state.next_lend_id;
        state.next_lend_id = state.next_lend_id.wrapping_add(1);
        state.lent.insert(id, conn.control.clone());
        PooledConnection {
            pool: self.clone(),
            id,
            conn: Some(conn),
            valid: true,
        }
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }

    /// Takes a lent connection back. Reusable connections go idle unless the
    /// pool is closed; everything else gives up its slot.
    fn check_in(&self, id: u64, conn: Connection, reusable: bool) {
        let retired = {
            let mut state = self.state.lock();
            state.lent.remove(&id);
            if reusable && !state.closed {
                state.idle.push_back(conn);
                None
            } else {
                state.total = state.total.saturating_sub(1);
                Some(conn)
            }
        };
        drop(retired);
        self.available.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    id: u64,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    /// Sends one request and reads the complete response.
    pub fn execute(&mut self, request: &SearchRequest) -> ClientResult<(ResponseHeader, Vec<u8>)> {
        let max_len = self.pool.config.max_response_len;
        let response = match self.conn.as_mut() {
            Some(conn) => conn.execute(request, max_len),
            None => Err(ClientError::PoolClosed),
        };
        match response {
            Ok(response) => Ok(response),
            Err(err) => {
                // If IO/protocol fails, do not return this connection to the pool.
                self.valid = false;
                if self.pool.is_closed() {
                    debug!(%err, "in-flight query aborted by close");
                    return Err(ClientError::PoolClosed);
                }
                Err(err)
            }
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        if !self.valid {
            warn!("retiring failed searchd connection");
        }
        self.pool.check_in(self.id, conn, self.valid);
    }
}

/// Single handshaken TCP connection.
pub struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    // Second handle on the same socket, used by `close` to shut it down.
    control: Arc<TcpStream>,
}

impl Connection {
    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let addr = resolve(config)?;
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)?;

        // The handshake runs under the connect deadline; steady-state use has none.
        stream.set_read_timeout(Some(config.connect_timeout))?;
        stream.set_write_timeout(Some(config.connect_timeout))?;
        let control = Arc::new(stream.try_clone()?);
        let mut conn = Connection {
            reader: BufReader::new(stream),
            control,
        };
        conn.handshake()?;
        let stream = conn.reader.get_mut();
        stream.set_read_timeout(None)?;
        stream.set_write_timeout(None)?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        info!(%addr, "opened searchd connection");
        Ok(conn)
    }

    fn handshake(&mut self) -> ClientResult<()> {
        let stream = self.reader.get_mut();
        stream.write_all(&MAJOR_PROTOCOL_VERSION.to_be_bytes())?;
        debug!(version = MAJOR_PROTOCOL_VERSION, "sent protocol version");

        let mut raw = [0u8; 4];
        self.reader.read_exact(&mut raw)?;
        let server = u32::from_be_bytes(raw);
        if server < MAJOR_PROTOCOL_VERSION {
            return Err(ClientError::VersionMismatch {
                client: MAJOR_PROTOCOL_VERSION,
                server,
            });
        }

        let stream = self.reader.get_mut();
        stream.write_all(&persist_frame())?;
        stream.flush()?;
        debug!(
            server_version = server,
            command = %SearchdCommand::Persist,
            "persist command sent"
        );
        Ok(())
    }

    fn execute(
        &mut self,
        request: &SearchRequest,
        max_len: u32,
    ) -> ClientResult<(ResponseHeader, Vec<u8>)> {
        let stream = self.reader.get_mut();
        stream.write_all(&request.header)?;
        stream.write_all(&request.body)?;
        stream.flush()?;

        let mut raw = [0u8; RESPONSE_HEADER_LEN];
        self.reader.read_exact(&mut raw)?;
        let header = ResponseHeader::from_bytes(&raw);
        if header.len > max_len {
            return Err(ClientError::ResponseTooLarge {
                len: header.len,
                max: max_len,
            });
        }

        let mut body = vec![0u8; header.len as usize];
        self.reader.read_exact(&mut body)?;
        Ok((header, body))
    }
}

fn resolve(config: &PoolConfig) -> ClientResult<SocketAddr> {
    let target = format!("{}:{}", config.host, config.port);
    let mut addrs = match target.to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(_) => return Err(ClientError::InvalidAddress(target)),
    };
    addrs.next().ok_or(ClientError::InvalidAddress(target))
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    use super::*;

    /// Accepts connections and completes the server side of the handshake.
    fn spawn_handshake_server(server_version: u32) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => return,
                };
                thread::spawn(move || {
                    let mut version = [0u8; 4];
                    if stream.read_exact(&mut version).is_err() {
                        return;
                    }
                    let _ = stream.write_all(&server_version.to_be_bytes());
                    let mut persist = [0u8; 12];
                    let _ = stream.read_exact(&mut persist);
                    // Hold the socket open until the client goes away.
                    let mut sink = [0u8; 64];
                    while let Ok(n) = stream.read(&mut sink) {
                        if n == 0 {
                            break;
                        }
                    }
                });
            }
        });
        port
    }

    fn config(port: u16, starting_size: usize, max_size: usize) -> PoolConfig {
        PoolConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout: Duration::from_secs(1),
            starting_size,
            max_size,
            max_response_len: 1024,
        }
    }

    #[test]
    fn opens_starting_connections() {
        let port = spawn_handshake_server(1);
        let pool = ConnectionPool::new(config(port, 2, 4)).expect("pool");
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.total_count(), 2);
    }

    #[test]
    fn returned_connections_are_reused() {
        let port = spawn_handshake_server(1);
        let pool = ConnectionPool::new(config(port, 0, 2)).expect("pool");
        let conn = pool.acquire().expect("acquire");
        assert_eq!(pool.total_count(), 1);
        drop(conn);
        assert_eq!(pool.idle_count(), 1);
        let _conn = pool.acquire().expect("acquire");
        assert_eq!(pool.total_count(), 1);
    }

    #[test]
    fn older_server_version_is_rejected() {
        let port = spawn_handshake_server(0);
        match ConnectionPool::new(config(port, 1, 1)) {
            Err(ClientError::VersionMismatch { client, server }) => {
                assert_eq!(client, 1);
                assert_eq!(server, 0);
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("handshake should fail"),
        }
    }

    #[test]
    fn exhausted_pool_waits_for_release() {
        let port = spawn_handshake_server(1);
        let pool = ConnectionPool::new(config(port, 1, 1)).expect("pool");
        let held = pool.acquire().expect("acquire");

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || {
                let conn = pool.acquire();
                tx.send(()).expect("send");
                conn.map(|_| ())
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(held);
        rx.recv_timeout(Duration::from_secs(2)).expect("waiter woke up");
        waiter.join().expect("join").expect("acquire after release");
        assert_eq!(pool.total_count(), 1);
    }

    #[test]
    fn close_fails_waiting_acquisitions() {
        let port = spawn_handshake_server(1);
        let pool = ConnectionPool::new(config(port, 1, 1)).expect("pool");
        let held = pool.acquire().expect("acquire");

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().map(|_| ()))
        };
        thread::sleep(Duration::from_millis(50));
        pool.close();

        assert!(matches!(
            waiter.join().expect("join"),
            Err(ClientError::PoolClosed)
        ));
        drop(held);
        assert_eq!(pool.total_count(), 0);
        assert!(matches!(pool.acquire(), Err(ClientError::PoolClosed)));
    }

    #[test]
    fn failed_connection_is_retired() {
        let port = spawn_handshake_server(1);
        let pool = ConnectionPool::new(config(port, 1, 1)).expect("pool");
        {
            let mut conn = pool.acquire().expect("acquire");
            conn.valid = false;
        }
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.total_count(), 0);
    }

    #[test]
    fn close_unblocks_in_flight_exchange() {
        let port = spawn_handshake_server(1);
        let pool = ConnectionPool::new(config(port, 1, 1)).expect("pool");
        let request = crate::request::build_request(&sphinx_common::SphinxQuery::default())
            .expect("request");

        let (tx, rx) = mpsc::channel();
        let worker = {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut conn = pool.acquire().expect("acquire");
                let result = conn.execute(&request).map(|_| ());
                tx.send(()).expect("send");
                result
            })
        };

        // The server never answers, so the exchange stays blocked on its read.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        pool.close();
        rx.recv_timeout(Duration::from_secs(2))
            .expect("exchange returned after close");
        assert!(matches!(
            worker.join().expect("join"),
            Err(ClientError::PoolClosed)
        ));
        assert_eq!(pool.total_count(), 0);
        assert!(pool.inner.state.lock().lent.is_empty());
    }

    #[test]
    fn unresolvable_host_is_invalid_address() {
        let mut cfg = config(1, 1, 1);
        cfg.host = "host name with spaces".to_string();
        assert!(matches!(
            ConnectionPool::new(cfg),
            Err(ClientError::InvalidAddress(_))
        ));
    }
}
