//! In-process stand-in for acme's 9P file server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};

use agitlink::infra::ninep::{
    Fcall, IOHDRSZ, Message, NinepError, Qid, read_message, write_message,
};

/// One window as the fake server exposes it.
#[derive(Debug, Clone, Default)]
pub struct FakeWindow {
    pub tag: String,
    pub body: Vec<u8>,
    pub dot: (usize, usize),
    pub reject_ctl: bool,
}

impl FakeWindow {
    pub fn new(tag: &str, body: &str, dot: (usize, usize)) -> Self {
        Self {
            tag: tag.to_owned(),
            body: body.as_bytes().to_vec(),
            dot,
            reject_ctl: false,
        }
    }
}

/// What the client did during one connection.
#[derive(Debug, Default)]
pub struct ServerLog {
    pub reads: Vec<(String, u32)>,
    pub ctl_writes: Vec<String>,
    pub opened: usize,
    pub clunked: usize,
}

impl ServerLog {
    /// Requested sizes of every read against `file` (`body`, `tag`, ...).
    pub fn read_counts(&self, file: &str) -> Vec<u32> {
        self.reads
            .iter()
            .filter(|(name, _)| name == file)
            .map(|(_, count)| *count)
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Node {
    Root,
    File { id: u32, name: String },
}

struct State {
    windows: HashMap<u32, FakeWindow>,
    addrs: HashMap<u32, (usize, usize)>,
    fids: HashMap<u32, Node>,
    max_reply: usize,
    log: ServerLog,
}

/// Serve one client until it hangs up. Body and tag reads return at most `max_reply` bytes.
pub fn serve<S: Read + Write>(
    mut stream: S,
    windows: HashMap<u32, FakeWindow>,
    max_reply: usize,
) -> ServerLog {
    let mut state = State {
        windows,
        addrs: HashMap::new(),
        fids: HashMap::new(),
        max_reply,
        log: ServerLog::default(),
    };

    loop {
        let request = match read_message(&mut stream, u32::MAX) {
            Ok(request) => request,
            Err(NinepError::Io(_)) => break,
            Err(err) => panic!("bad request: {err}"),
        };
        let reply = match state.handle(request.fcall) {
            Ok(fcall) => fcall,
            Err(ename) => Fcall::Rerror {
                ename: ename.to_owned(),
            },
        };
        if write_message(&mut stream, &Message::new(request.tag, reply)).is_err() {
            break;
        }
    }
    state.log
}

impl State {
    fn handle(&mut self, fcall: Fcall) -> Result<Fcall, &'static str> {
        match fcall {
            Fcall::Tversion { msize, version } => Ok(Fcall::Rversion {
                msize: msize.min(8192 + IOHDRSZ),
                version,
            }),
            Fcall::Tattach { fid, .. } => {
                self.fids.insert(fid, Node::Root);
                Ok(Fcall::Rattach { qid: Qid::default() })
            }
            Fcall::Twalk {
                fid,
                newfid,
                wnames,
            } => {
                let Some(Node::Root) = self.fids.get(&fid) else {
                    return Err("walk in non-directory");
                };
                let [id, name] = wnames.as_slice() else {
                    return Err("file does not exist");
                };
                let id: u32 = id.parse().map_err(|_| "file does not exist")?;
                if !self.windows.contains_key(&id)
                    || !["ctl", "addr", "body", "tag"].contains(&name.as_str())
                {
                    return Err("file does not exist");
                }
                self.fids.insert(
                    newfid,
                    Node::File {
                        id,
                        name: name.clone(),
                    },
                );
                Ok(Fcall::Rwalk {
                    qids: vec![Qid::default(); 2],
                })
            }
            Fcall::Topen { fid, .. } => {
                let Some(Node::File { id, name }) = self.fids.get(&fid) else {
                    return Err("unknown fid");
                };
                // Opening addr resets it, as acme does.
                if name == "addr" {
                    self.addrs.insert(*id, (0, 0));
                }
                self.log.opened += 1;
                Ok(Fcall::Ropen {
                    qid: Qid::default(),
                    iounit: 0,
                })
            }
            Fcall::Tread { fid, offset, count } => {
                let Some(Node::File { id, name }) = self.fids.get(&fid).cloned() else {
                    return Err("unknown fid");
                };
                self.log.reads.push((name.clone(), count));
                let window = &self.windows[&id];
                let content = match name.as_str() {
                    "addr" => {
                        let (q0, q1) = self.addrs.get(&id).copied().unwrap_or_default();
                        format!("{q0:11} {q1:11} ").into_bytes()
                    }
                    "body" => window.body.clone(),
                    "tag" => window.tag.clone().into_bytes(),
                    _ => return Err("permission denied"),
                };
                let limit = if name == "addr" {
                    usize::MAX
                } else {
                    self.max_reply
                };
                let start = (offset as usize).min(content.len());
                let len = (count as usize).min(limit).min(content.len() - start);
                Ok(Fcall::Rread {
                    data: content[start..start + len].to_vec(),
                })
            }
            Fcall::Twrite { fid, data, .. } => {
                let Some(Node::File { id, name }) = self.fids.get(&fid).cloned() else {
                    return Err("unknown fid");
                };
                if name != "ctl" {
                    return Err("permission denied");
                }
                let message = String::from_utf8_lossy(&data).into_owned();
                self.log.ctl_writes.push(message.clone());
                let window = &self.windows[&id];
                if window.reject_ctl || message != "addr=dot" {
                    return Err("bad control message");
                }
                self.addrs.insert(id, window.dot);
                Ok(Fcall::Rwrite {
                    count: data.len() as u32,
                })
            }
            Fcall::Tclunk { fid } => match self.fids.remove(&fid) {
                Some(Node::File { .. }) => {
                    self.log.clunked += 1;
                    Ok(Fcall::Rclunk)
                }
                Some(Node::Root) => Ok(Fcall::Rclunk),
                None => Err("unknown fid"),
            },
            _ => Err("unsupported request"),
        }
    }
}
