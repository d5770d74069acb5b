//! Remote object transport.
//!
//! A process exposes named objects over a Unix-domain socket. Callers reach
//! them through a [`Proxy`], which marshals `(call_id, target, method, args,
//! kwargs)` into a length-prefixed `bincode` frame and blocks for the
//! matching response frame. One-way calls skip the response wait entirely;
//! property get/set use dedicated envelope variants instead of a `method`
//! name convention.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub type ObjectId = Uuid;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("no such object: {0}")]
    NoSuchObject(String),
    #[error("no such method: {0}.{1}")]
    NoSuchMethod(String, String),
    #[error("connection closed")]
    Closed,
    #[error("remote exception: {0}")]
    Remote(String),
}

/// Error surfaced back across the wire from a failed call; carries enough
/// of the original Rust error's `Display` text to log on the caller side,
/// matching the original's marshalled-traceback-as-string behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
}

impl From<TransportError> for RemoteError {
    fn from(e: TransportError) -> Self {
        RemoteError {
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum Envelope {
    Call {
        call_id: u64,
        target: String,
        method: String,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    },
    OneWay {
        target: String,
        method: String,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    },
    PropertyGet {
        call_id: u64,
        target: String,
        name: String,
    },
    PropertySet {
        call_id: u64,
        target: String,
        name: String,
        value: Value,
    },
    Response {
        call_id: u64,
        result: Result<Value, RemoteError>,
    },
}

/// An object reachable through the transport. Implementors register
/// themselves by name with a [`Server`].
pub trait RemoteObject: Send + Sync {
    fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, TransportError>;

    fn get_property(&self, name: &str) -> Result<Value, TransportError> {
        Err(TransportError::NoSuchMethod("property".into(), name.into()))
    }

    fn set_property(&self, name: &str, _value: Value) -> Result<(), TransportError> {
        Err(TransportError::NoSuchMethod("property".into(), name.into()))
    }

    /// Called once, after registration, when the owning process's plugin
    /// set has been assembled and cross-process proxies are resolvable.
    /// Most objects have nothing to do here; the default is a no-op.
    fn activate(&self) {}

    /// Mirror of [`RemoteObject::activate`], called once before the object
    /// is deregistered during teardown.
    fn deactivate(&self) {}
}

/// Per-process registry of named remote objects, shared between the
/// server's accept thread and whatever registers/deregisters objects as
/// plugins come and go.
#[derive(Default, Clone)]
pub struct ObjectRegistry {
    objects: Arc<DashMap<String, Arc<dyn RemoteObject>>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, object: Arc<dyn RemoteObject>) {
        self.objects.insert(name.into(), object);
    }

    pub fn deregister(&self, name: &str) {
        self.objects.remove(name);
    }

    fn get(&self, name: &str) -> Option<Arc<dyn RemoteObject>> {
        self.objects.get(name).map(|e| e.clone())
    }
}

fn read_frame<R: Read>(r: &mut R) -> Result<Option<Envelope>, TransportError> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(Some(bincode::deserialize(&buf)?))
}

fn write_frame<W: Write>(w: &mut W, envelope: &Envelope) -> Result<(), TransportError> {
    let buf = bincode::serialize(envelope)?;
    w.write_all(&(buf.len() as u32).to_be_bytes())?;
    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}

/// Listens on a Unix socket and dispatches incoming frames against a
/// shared [`ObjectRegistry`]. One worker thread per connection.
pub struct Server {
    registry: ObjectRegistry,
    listener: UnixListener,
}

impl Server {
    pub fn bind(path: &std::path::Path, registry: ObjectRegistry) -> Result<Self, TransportError> {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        Ok(Server { registry, listener })
    }

    pub fn local_addr_path(&self) -> Option<std::path::PathBuf> {
        self.listener
            .local_addr()
            .ok()
            .and_then(|a| a.as_pathname().map(|p| p.to_path_buf()))
    }

    /// Spawns the accept loop on a background thread and returns immediately.
    pub fn serve_background(self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("surveil-transport-accept".into())
            .spawn(move || self.serve())
            .expect("spawn accept thread")
    }

    fn serve(self) {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let registry = self.registry.clone();
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, registry) {
                            log::warn!("connection handler exited: {e}");
                        }
                    });
                }
                Err(e) => log::warn!("accept error: {e}"),
            }
        }
    }
}

fn handle_connection(stream: UnixStream, registry: ObjectRegistry) -> Result<(), TransportError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);
    loop {
        let envelope = match read_frame(&mut reader)? {
            Some(e) => e,
            None => return Ok(()),
        };
        match envelope {
            Envelope::Call {
                call_id,
                target,
                method,
                args,
                kwargs,
            } => {
                let result = dispatch_call(&registry, &target, &method, args, kwargs);
                write_frame(
                    &mut writer,
                    &Envelope::Response {
                        call_id,
                        result: result.map_err(RemoteError::from),
                    },
                )?;
            }
            Envelope::OneWay {
                target,
                method,
                args,
                kwargs,
            } => {
                if let Err(e) = dispatch_call(&registry, &target, &method, args, kwargs) {
                    log::warn!("one-way call {target}.{method} failed: {e}");
                }
            }
            Envelope::PropertyGet {
                call_id,
                target,
                name,
            } => {
                let result = registry
                    .get(&target)
                    .ok_or_else(|| TransportError::NoSuchObject(target.clone()))
                    .and_then(|obj| obj.get_property(&name));
                write_frame(
                    &mut writer,
                    &Envelope::Response {
                        call_id,
                        result: result.map_err(RemoteError::from),
                    },
                )?;
            }
            Envelope::PropertySet {
                call_id,
                target,
                name,
                value,
            } => {
                let result = registry
                    .get(&target)
                    .ok_or_else(|| TransportError::NoSuchObject(target.clone()))
                    .and_then(|obj| obj.set_property(&name, value))
                    .map(|_| Value::Null);
                write_frame(
                    &mut writer,
                    &Envelope::Response {
                        call_id,
                        result: result.map_err(RemoteError::from),
                    },
                )?;
            }
            Envelope::Response { .. } => {
                log::warn!("server received a response frame, ignoring");
            }
        }
    }
}

fn dispatch_call(
    registry: &ObjectRegistry,
    target: &str,
    method: &str,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
) -> Result<Value, TransportError> {
    let object = registry
        .get(target)
        .ok_or_else(|| TransportError::NoSuchObject(target.to_string()))?;
    object.call(method, args, kwargs)
}

/// Client-side handle to a single remote object. One `Proxy` owns one
/// socket connection; synchronous calls serialise through an internal
/// mutex since a single stream can only carry one in-flight request at a
/// time in this implementation.
pub struct Proxy {
    target: String,
    conn: Mutex<(BufReader<UnixStream>, BufWriter<UnixStream>)>,
    next_call_id: AtomicU64,
}

impl Proxy {
    pub fn connect(path: &std::path::Path, target: impl Into<String>) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(path)?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Proxy {
            target: target.into(),
            conn: Mutex::new((reader, writer)),
            next_call_id: AtomicU64::new(1),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn next_id(&self) -> u64 {
        self.next_call_id.fetch_add(1, Ordering::SeqCst)
    }

    fn roundtrip(&self, envelope: Envelope, expect_id: u64) -> Result<Value, TransportError> {
        let mut guard = self.conn.lock().expect("proxy connection mutex poisoned");
        let (reader, writer) = &mut *guard;
        write_frame(writer, &envelope)?;
        loop {
            match read_frame(reader)?.ok_or(TransportError::Closed)? {
                Envelope::Response { call_id, result } if call_id == expect_id => {
                    return result.map_err(|e| TransportError::Remote(e.message));
                }
                _ => continue,
            }
        }
    }

    pub fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> Result<Value, TransportError> {
        let call_id = self.next_id();
        self.roundtrip(
            Envelope::Call {
                call_id,
                target: self.target.clone(),
                method: method.to_string(),
                args,
                kwargs: kwargs.into_iter().collect(),
            },
            call_id,
        )
    }

    pub fn one_way(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> Result<(), TransportError> {
        let mut guard = self.conn.lock().expect("proxy connection mutex poisoned");
        let (_, writer) = &mut *guard;
        write_frame(
            writer,
            &Envelope::OneWay {
                target: self.target.clone(),
                method: method.to_string(),
                args,
                kwargs: kwargs.into_iter().collect(),
            },
        )
    }

    pub fn get_property(&self, name: &str) -> Result<Value, TransportError> {
        let call_id = self.next_id();
        self.roundtrip(
            Envelope::PropertyGet {
                call_id,
                target: self.target.clone(),
                name: name.to_string(),
            },
            call_id,
        )
    }

    pub fn set_property(&self, name: &str, value: Value) -> Result<(), TransportError> {
        let call_id = self.next_id();
        self.roundtrip(
            Envelope::PropertySet {
                call_id,
                target: self.target.clone(),
                name: name.to_string(),
                value,
            },
            call_id,
        )
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Echo;

    impl RemoteObject for Echo {
        fn call(
            &self,
            method: &str,
            args: Vec<Value>,
            _kwargs: Map<String, Value>,
        ) -> Result<Value, TransportError> {
            match method {
                "echo" => Ok(args.into_iter().next().unwrap_or(Value::Null)),
                "boom" => Err(TransportError::NoSuchMethod("Echo".into(), "boom".into())),
                _ => Err(TransportError::NoSuchMethod("Echo".into(), method.into())),
            }
        }

        fn get_property(&self, name: &str) -> Result<Value, TransportError> {
            if name == "answer" {
                Ok(Value::from(42))
            } else {
                Err(TransportError::NoSuchMethod("Echo".into(), name.into()))
            }
        }
    }

    fn start_server() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sock");
        let registry = ObjectRegistry::new();
        registry.register("echo", Arc::new(Echo));
        let server = Server::bind(&path, registry).unwrap();
        server.serve_background();
        thread::sleep(Duration::from_millis(20));
        (dir, path)
    }

    #[test]
    fn call_round_trips_a_value() {
        let (_dir, path) = start_server();
        let proxy = Proxy::connect(&path, "echo").unwrap();
        let result = proxy
            .call("echo", vec![Value::from("hello")], HashMap::new())
            .unwrap();
        assert_eq!(result, Value::from("hello"));
    }

    #[test]
    fn call_to_unknown_method_surfaces_remote_error() {
        let (_dir, path) = start_server();
        let proxy = Proxy::connect(&path, "echo").unwrap();
        let err = proxy.call("boom", vec![], HashMap::new()).unwrap_err();
        assert!(matches!(err, TransportError::Remote(_)));
    }

    #[test]
    fn property_get_returns_value() {
        let (_dir, path) = start_server();
        let proxy = Proxy::connect(&path, "echo").unwrap();
        let result = proxy.get_property("answer").unwrap();
        assert_eq!(result, Value::from(42));
    }

    #[test]
    fn one_way_does_not_block_for_a_response() {
        let (_dir, path) = start_server();
        let proxy = Proxy::connect(&path, "echo").unwrap();
        proxy
            .one_way("echo", vec![Value::from(1)], HashMap::new())
            .unwrap();
        // A subsequent real call on the same connection should still work.
        let result = proxy
            .call("echo", vec![Value::from(2)], HashMap::new())
            .unwrap();
        assert_eq!(result, Value::from(2));
    }
}
