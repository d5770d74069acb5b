//! Media bus: hands a content-addressed artifact (a file on disk) from a
//! producer (the camera driver, the still-capture worker) to every
//! registered consumer (the MP4 recorder's output sink, the chat root
//! plugin's broadcast path), and deletes the backing file once every
//! consumer has explicitly finished with it.
//!
//! Grounded on the original's `plugin_media_manager.py`: a `Media`
//! namedtuple, a dispatch thread that calls every registered
//! `MediaReceiver`, and a per-uuid "who's still using this" set that gates
//! deletion — the owning process is the only one allowed to delete.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use surveil_plugins::ProcessTag;
use surveil_transport::{Proxy, RemoteObject, TransportError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub uuid: Uuid,
    pub path: PathBuf,
    pub kind: String,
    pub info: Option<Value>,
    /// Which process's bus this media's backing file lives under — a
    /// remote consumer needs this to know which process to call
    /// `consume_media` back against once it's done.
    pub owning_process: ProcessTag,
}

/// A consumer of dispatched media. Registered once, notified for every
/// delivery for as long as it stays registered.
pub trait MediaReceiver: Send + Sync {
    fn receive_media(&self, media: &Media);
}

struct Registered {
    name: String,
    receiver: Arc<dyn MediaReceiver>,
}

struct InUseEntry {
    path: PathBuf,
    remaining: HashSet<String>,
}

pub struct MediaBus {
    tag: ProcessTag,
    receivers: Mutex<Vec<Registered>>,
    in_use: DashMap<Uuid, InUseEntry>,
    sender: Sender<Media>,
    // Kept alive for the lifetime of the bus; the dispatch thread exits
    // once `sender` (and every clone of it) is dropped.
    _dispatch_thread: JoinHandle<()>,
}

impl MediaBus {
    pub fn new(tag: ProcessTag) -> Arc<Self> {
        let (sender, receiver): (Sender<Media>, Receiver<Media>) = crossbeam_channel::unbounded();
        let receivers: Arc<Mutex<Vec<Registered>>> = Arc::new(Mutex::new(Vec::new()));
        let dispatch_receivers = receivers.clone();
        let dispatch_thread = thread::Builder::new()
            .name("media-bus-dispatch".into())
            .spawn(move || {
                for media in receiver {
                    let registered = dispatch_receivers.lock().unwrap();
                    for r in registered.iter() {
                        r.receiver.receive_media(&media);
                    }
                }
            })
            .expect("spawn media bus dispatch thread");

        Arc::new(MediaBus {
            tag,
            receivers,
            in_use: DashMap::new(),
            sender,
            _dispatch_thread: dispatch_thread,
        })
    }

    pub fn tag(&self) -> ProcessTag {
        self.tag
    }

    pub fn register_receiver(&self, name: impl Into<String>, receiver: Arc<dyn MediaReceiver>) {
        self.receivers.lock().unwrap().push(Registered {
            name: name.into(),
            receiver,
        });
    }

    pub fn deregister_receiver(&self, name: &str) {
        self.receivers.lock().unwrap().retain(|r| r.name != name);
    }

    /// Registers a remote process's object socket as a receiver: media
    /// delivered here from now on also gets forwarded, over the transport,
    /// to `target` on the process listening at `socket_path`.
    pub fn register_remote_receiver(
        &self,
        name: impl Into<String>,
        socket_path: &Path,
        target: impl Into<String>,
    ) -> Result<(), TransportError> {
        let proxy = Proxy::connect(socket_path, target)?;
        self.register_receiver(name, Arc::new(RemoteMediaReceiver { proxy }));
        Ok(())
    }

    /// Registers a freshly-produced artifact and dispatches it to every
    /// receiver. Every currently registered receiver name is marked
    /// in-use for this media until it calls `consume_media`. A media with
    /// no registered receivers at delivery time is deleted immediately —
    /// nobody is ever going to consume it.
    pub fn deliver_media(&self, path: PathBuf, kind: impl Into<String>, info: Option<Value>) -> Media {
        let media = Media {
            uuid: Uuid::new_v4(),
            path: path.clone(),
            kind: kind.into(),
            info,
            owning_process: self.tag,
        };
        let remaining: HashSet<String> = self
            .receivers
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        if remaining.is_empty() {
            let _ = std::fs::remove_file(&path);
        } else {
            self.in_use.insert(media.uuid, InUseEntry { path, remaining });
            let _ = self.sender.send(media.clone());
        }
        media
    }

    /// Marks `consumer` as done with `uuid`. Idempotent: consuming an
    /// already-released (or never in-use) media is a no-op. Once no
    /// consumer remains in-use, the backing file is deleted.
    pub fn consume_media(&self, uuid: Uuid, consumer: &str) -> Result<(), MediaError> {
        let mut path_to_delete = None;
        if let Some(mut entry) = self.in_use.get_mut(&uuid) {
            entry.remaining.remove(consumer);
            if entry.remaining.is_empty() {
                path_to_delete = Some(entry.path.clone());
            }
        }
        if path_to_delete.is_some() {
            self.in_use.remove(&uuid);
        }
        if let Some(path) = path_to_delete {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    pub fn is_in_use(&self, uuid: Uuid) -> bool {
        self.in_use.contains_key(&uuid)
    }

    pub fn path_of(&self, uuid: Uuid) -> Option<PathBuf> {
        self.in_use.get(&uuid).map(|e| e.path.clone())
    }
}

/// Forwards every delivered media to a named object on a peer process,
/// one-way — the peer is expected to call `consume_media` back against
/// this bus once it's done, not to reply to the forward itself.
struct RemoteMediaReceiver {
    proxy: Proxy,
}

impl MediaReceiver for RemoteMediaReceiver {
    fn receive_media(&self, media: &Media) {
        match serde_json::to_value(media) {
            Ok(value) => {
                if let Err(e) = self.proxy.one_way("receive_media", vec![value], std::collections::HashMap::new()) {
                    log::warn!("forwarding media {} to {} failed: {e}", media.uuid, self.proxy.target());
                }
            }
            Err(e) => log::warn!("failed to serialize media {}: {e}", media.uuid),
        }
    }
}

/// Exposes a [`MediaBus`] over the transport so peer processes can register
/// themselves as remote receivers and report back once they've consumed a
/// delivery, without reaching into this process's address space.
pub struct MediaBusObject {
    bus: Arc<MediaBus>,
}

impl MediaBusObject {
    pub fn new(bus: Arc<MediaBus>) -> Self {
        MediaBusObject { bus }
    }
}

fn value_as_uuid(value: Option<&Value>) -> Result<Uuid, TransportError> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| TransportError::NoSuchMethod("media_bus".into(), "uuid argument".into()))
}

impl RemoteObject for MediaBusObject {
    fn call(&self, method: &str, args: Vec<Value>, _kwargs: Map<String, Value>) -> Result<Value, TransportError> {
        match method {
            "register_remote_receiver" => {
                let name = args.first().and_then(|v| v.as_str()).unwrap_or_default();
                let socket_path = args.get(1).and_then(|v| v.as_str()).unwrap_or_default();
                let target = args.get(2).and_then(|v| v.as_str()).unwrap_or_default();
                self.bus
                    .register_remote_receiver(name, Path::new(socket_path), target)
                    .map_err(|e| TransportError::Remote(e.to_string()))?;
                Ok(Value::Null)
            }
            "deregister_receiver" => {
                let name = args.first().and_then(|v| v.as_str()).unwrap_or_default();
                self.bus.deregister_receiver(name);
                Ok(Value::Null)
            }
            "consume_media" => {
                let uuid = value_as_uuid(args.first())?;
                let consumer = args.get(1).and_then(|v| v.as_str()).unwrap_or_default();
                self.bus
                    .consume_media(uuid, consumer)
                    .map_err(|e| TransportError::Remote(e.to_string()))?;
                Ok(Value::Null)
            }
            "is_in_use" => {
                let uuid = value_as_uuid(args.first())?;
                Ok(Value::Bool(self.bus.is_in_use(uuid)))
            }
            "path_of" => {
                let uuid = value_as_uuid(args.first())?;
                Ok(self
                    .bus
                    .path_of(uuid)
                    .map(|p| Value::String(p.display().to_string()))
                    .unwrap_or(Value::Null))
            }
            other => Err(TransportError::NoSuchMethod("media_bus".into(), other.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting(Arc<AtomicUsize>);
    impl MediaReceiver for Counting {
        fn receive_media(&self, _media: &Media) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn file_survives_until_every_consumer_has_consumed() {
        let bus = MediaBus::new(ProcessTag::Main);
        let count = Arc::new(AtomicUsize::new(0));
        bus.register_receiver("recorder", Arc::new(Counting(count.clone())));
        bus.register_receiver("chat", Arc::new(Counting(count.clone())));

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("clip.mp4");
        std::fs::write(&file_path, b"fake mp4").unwrap();

        let media = bus.deliver_media(file_path.clone(), "mp4", None);
        assert!(bus.is_in_use(media.uuid));

        bus.consume_media(media.uuid, "recorder").unwrap();
        assert!(file_path.exists(), "file must survive one remaining consumer");
        assert!(bus.is_in_use(media.uuid));

        bus.consume_media(media.uuid, "chat").unwrap();
        assert!(!file_path.exists(), "file must be deleted once all consumers are done");
        assert!(!bus.is_in_use(media.uuid));
    }

    #[test]
    fn consuming_twice_is_idempotent() {
        let bus = MediaBus::new(ProcessTag::Main);
        bus.register_receiver("only", Arc::new(Counting(Arc::new(AtomicUsize::new(0)))));
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("clip.mp4");
        std::fs::write(&file_path, b"fake").unwrap();

        let media = bus.deliver_media(file_path.clone(), "mp4", None);
        bus.consume_media(media.uuid, "only").unwrap();
        assert!(!file_path.exists());
        bus.consume_media(media.uuid, "only").unwrap();
    }

    #[test]
    fn dispatch_notifies_every_registered_receiver() {
        let bus = MediaBus::new(ProcessTag::Main);
        let count = Arc::new(AtomicUsize::new(0));
        bus.register_receiver("a", Arc::new(Counting(count.clone())));
        bus.register_receiver("b", Arc::new(Counting(count.clone())));
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("still.jpeg");
        std::fs::write(&file_path, b"fake jpeg").unwrap();
        bus.deliver_media(file_path, "jpeg", None);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn media_with_no_receivers_is_deleted_immediately() {
        let bus = MediaBus::new(ProcessTag::Main);
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("orphan.jpeg");
        std::fs::write(&file_path, b"fake").unwrap();
        let media = bus.deliver_media(file_path.clone(), "jpeg", None);
        assert!(!bus.is_in_use(media.uuid));
        assert!(!file_path.exists());
    }
}
