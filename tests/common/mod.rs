//! Test server
//!
//! A small in-process RESP server backed by an in-memory store. It speaks
//! just enough of the protocol for the client tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::io::{self, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use atlaskv_client::protocol::{encode_reply, read_reply, Reply};
use atlaskv_client::{Config, Endpoint};
use parking_lot::Mutex;

const MAX_REQUEST: usize = 16 * 1024 * 1024;

#[derive(Default)]
struct Store {
    strings: HashMap<Vec<u8>, Vec<u8>>,
    lists: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    sets: HashMap<Vec<u8>, BTreeSet<Vec<u8>>>,
}

struct State {
    store: Mutex<Store>,
    requests: AtomicUsize,
    shutdown: AtomicBool,
}

/// A running test server; stops accepting when dropped
pub struct TestServer {
    endpoint: Endpoint,
    state: Arc<State>,
    acceptor: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Listen on an ephemeral localhost port
    pub fn tcp() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let state = new_state();
        let acceptor = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                accept_loop(&state, || match listener.accept() {
                    Ok((stream, _)) => {
                        stream.set_nonblocking(false)?;
                        let reader = stream.try_clone()?;
                        let halves: Halves = (Box::new(reader), Box::new(stream));
                        Ok(Some(halves))
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                    Err(e) => Err(e),
                })
            })
        };

        Self {
            endpoint: Endpoint::tcp(addr.ip().to_string(), addr.port()),
            state,
            acceptor: Some(acceptor),
        }
    }

    /// Listen on a Unix socket at `path`
    #[cfg(unix)]
    pub fn unix(path: &Path) -> Self {
        let listener = UnixListener::bind(path).unwrap();
        listener.set_nonblocking(true).unwrap();

        let state = new_state();
        let acceptor = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                accept_loop(&state, || match listener.accept() {
                    Ok((stream, _)) => {
                        stream.set_nonblocking(false)?;
                        let reader: UnixStream = stream.try_clone()?;
                        let halves: Halves = (Box::new(reader), Box::new(stream));
                        Ok(Some(halves))
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                    Err(e) => Err(e),
                })
            })
        };

        Self {
            endpoint: Endpoint::Unix(PathBuf::from(path)),
            state,
            acceptor: Some(acceptor),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    /// Client config pointing at this server, with short timeouts
    pub fn config(&self) -> Config {
        Config::builder()
            .endpoint(self.endpoint())
            .connect_timeout(Duration::from_secs(2))
            .blocking_timeout(Some(Duration::from_secs(5)))
            .poll_interval(Duration::from_millis(5))
            .build()
    }

    /// Requests handled so far
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Seed a string value directly
    pub fn put(&self, key: &str, value: &[u8]) {
        self.state
            .store
            .lock()
            .strings
            .insert(key.as_bytes().to_vec(), value.to_vec());
    }

    /// Read a string value directly
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.state.store.lock().strings.get(key.as_bytes()).cloned()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.state.shutdown.store(true, Ordering::SeqCst);
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
    }
}

/// An address nothing listens on
pub fn closed_port_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    Endpoint::tcp("127.0.0.1", addr.port())
}

/// Accept a TCP connection and drop it without reading
pub fn accept_and_close(listener: &TcpListener) -> io::Result<()> {
    let (stream, _) = listener.accept()?;
    drop::<TcpStream>(stream);
    Ok(())
}

fn new_state() -> Arc<State> {
    Arc::new(State {
        store: Mutex::new(Store::default()),
        requests: AtomicUsize::new(0),
        shutdown: AtomicBool::new(false),
    })
}

type Halves = (Box<dyn Read + Send>, Box<dyn Write + Send>);

fn accept_loop<F>(state: &Arc<State>, mut accept: F)
where
    F: FnMut() -> io::Result<Option<Halves>>,
{
    while !state.shutdown.load(Ordering::SeqCst) {
        match accept() {
            Ok(Some((reader, writer))) => {
                let state = Arc::clone(state);
                thread::spawn(move || serve(&state, reader, writer));
            }
            Ok(None) => thread::sleep(Duration::from_millis(2)),
            Err(_) => break,
        }
    }
}

/// Answer requests until the peer hangs up or asks to quit
fn serve(state: &State, reader: Box<dyn Read + Send>, mut writer: Box<dyn Write + Send>) {
    let mut reader = BufReader::new(reader);

    loop {
        let request = match read_reply(&mut reader, MAX_REQUEST) {
            Ok(Reply::Array(items)) => items,
            _ => return,
        };
        let args: Vec<Vec<u8>> = request
            .into_iter()
            .filter_map(|item| match item {
                Reply::Bulk(bytes) => Some(bytes),
                _ => None,
            })
            .collect();

        state.requests.fetch_add(1, Ordering::SeqCst);

        let name = args
            .first()
            .map(|a| String::from_utf8_lossy(a).to_ascii_uppercase())
            .unwrap_or_default();

        if name == "QUIT" {
            let _ = writer.write_all(&encode_reply(&Reply::status("OK")));
            return;
        }
        if name == "HANGUP" {
            return;
        }

        let reply = execute(state, &name, &args[1..]);
        if writer.write_all(&encode_reply(&reply)).is_err() {
            return;
        }
    }
}

fn execute(state: &State, name: &str, args: &[Vec<u8>]) -> Reply {
    let mut store = state.store.lock();

    match (name, args) {
        ("PING", []) => Reply::status("PONG"),
        ("ECHO", [message]) => Reply::bulk(message.clone()),
        ("GET", [key]) => match store.strings.get(key) {
            Some(value) => Reply::bulk(value.clone()),
            None => Reply::Nil,
        },
        ("SET", [key, value]) => {
            store.strings.insert(key.clone(), value.clone());
            Reply::status("OK")
        }
        ("DEL", keys) if !keys.is_empty() => {
            let mut removed = 0;
            for key in keys {
                let hit = store.strings.remove(key).is_some()
                    | store.lists.remove(key).is_some()
                    | store.sets.remove(key).is_some();
                removed += i64::from(hit);
            }
            Reply::Integer(removed)
        }
        ("INCR", [key]) => {
            let current = match store.strings.get(key) {
                Some(bytes) => match std::str::from_utf8(bytes).ok().and_then(|s| s.parse::<i64>().ok()) {
                    Some(n) => n,
                    None => return Reply::error("ERR value is not an integer or out of range"),
                },
                None => 0,
            };
            let next = current + 1;
            store.strings.insert(key.clone(), next.to_string().into_bytes());
            Reply::Integer(next)
        }
        ("RPUSH", [key, values @ ..]) if !values.is_empty() => {
            let list = store.lists.entry(key.clone()).or_default();
            list.extend(values.iter().cloned());
            Reply::Integer(list.len() as i64)
        }
        ("LRANGE", [key, _, _]) => Reply::Array(
            store
                .lists
                .get(key)
                .map(|list| list.iter().cloned().map(Reply::Bulk).collect())
                .unwrap_or_default(),
        ),
        ("SADD", [key, members @ ..]) if !members.is_empty() => {
            let set = store.sets.entry(key.clone()).or_default();
            let added = members.iter().filter(|m| set.insert((*m).clone())).count();
            Reply::Integer(added as i64)
        }
        ("SMEMBERS", [key]) => Reply::Array(
            store
                .sets
                .get(key)
                .map(|set| set.iter().cloned().map(Reply::Bulk).collect())
                .unwrap_or_default(),
        ),
        // An array with a non-string element
        ("MIXED", []) => Reply::Array(vec![Reply::bulk("a"), Reply::Integer(1)]),
        ("SLEEP", [millis]) => {
            drop(store);
            let millis = String::from_utf8_lossy(millis).parse::<u64>().unwrap_or(0);
            thread::sleep(Duration::from_millis(millis));
            Reply::status("OK")
        }
        _ => Reply::error(&format!("ERR unknown command '{}'", name)),
    }
}
