//! Minimal 9P2000 client.
//!
//! Only the messages needed to read and write files on a plan9port file server are
//! implemented. Every request is sent and answered before the next one goes out, so the
//! client never has more than one outstanding tag.

use std::io::{self, Read, Write};

use thiserror::Error;
use tracing::{debug, trace};

pub const VERSION: &str = "9P2000";
pub const NOTAG: u16 = !0;
pub const NOFID: u32 = !0;
/// Header bytes of a `Tread`/`Rwrite` style message that are not payload.
pub const IOHDRSZ: u32 = 24;
/// Maximum number of path elements in a single `Twalk`.
pub const MAXWELEM: usize = 16;

pub const OREAD: u8 = 0;
pub const OWRITE: u8 = 1;
pub const ORDWR: u8 = 2;

const TVERSION: u8 = 100;
const RVERSION: u8 = 101;
const TATTACH: u8 = 104;
const RATTACH: u8 = 105;
const RERROR: u8 = 107;
const TWALK: u8 = 110;
const RWALK: u8 = 111;
const TOPEN: u8 = 112;
const ROPEN: u8 = 113;
const TREAD: u8 = 116;
const RREAD: u8 = 117;
const TWRITE: u8 = 118;
const RWRITE: u8 = 119;
const TCLUNK: u8 = 120;
const RCLUNK: u8 = 121;

/// size[4] type[1] tag[2]
const HEADER_LEN: usize = 7;

#[derive(Debug, Error)]
pub enum NinepError {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// `Rerror` returned by the server.
    #[error("{0}")]
    Remote(String),
    #[error("malformed 9P message: {0}")]
    Malformed(String),
    #[error("unexpected {got} in reply to {sent}")]
    Unexpected {
        sent: &'static str,
        got: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, NinepError>;

/// Server-side identity of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qid {
    pub kind: u8,
    pub version: u32,
    pub path: u64,
}

/// The subset of 9P2000 transactions this client speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fcall {
    Tversion { msize: u32, version: String },
    Rversion { msize: u32, version: String },
    Tattach { fid: u32, afid: u32, uname: String, aname: String },
    Rattach { qid: Qid },
    Rerror { ename: String },
    Twalk { fid: u32, newfid: u32, wnames: Vec<String> },
    Rwalk { qids: Vec<Qid> },
    Topen { fid: u32, mode: u8 },
    Ropen { qid: Qid, iounit: u32 },
    Tread { fid: u32, offset: u64, count: u32 },
    Rread { data: Vec<u8> },
    Twrite { fid: u32, offset: u64, data: Vec<u8> },
    Rwrite { count: u32 },
    Tclunk { fid: u32 },
    Rclunk,
}

impl Fcall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tversion { .. } => "Tversion",
            Self::Rversion { .. } => "Rversion",
            Self::Tattach { .. } => "Tattach",
            Self::Rattach { .. } => "Rattach",
            Self::Rerror { .. } => "Rerror",
            Self::Twalk { .. } => "Twalk",
            Self::Rwalk { .. } => "Rwalk",
            Self::Topen { .. } => "Topen",
            Self::Ropen { .. } => "Ropen",
            Self::Tread { .. } => "Tread",
            Self::Rread { .. } => "Rread",
            Self::Twrite { .. } => "Twrite",
            Self::Rwrite { .. } => "Rwrite",
            Self::Tclunk { .. } => "Tclunk",
            Self::Rclunk => "Rclunk",
        }
    }

    fn code(&self) -> u8 {
        match self {
            Self::Tversion { .. } => TVERSION,
            Self::Rversion { .. } => RVERSION,
            Self::Tattach { .. } => TATTACH,
            Self::Rattach { .. } => RATTACH,
            Self::Rerror { .. } => RERROR,
            Self::Twalk { .. } => TWALK,
            Self::Rwalk { .. } => RWALK,
            Self::Topen { .. } => TOPEN,
            Self::Ropen { .. } => ROPEN,
            Self::Tread { .. } => TREAD,
            Self::Rread { .. } => RREAD,
            Self::Twrite { .. } => TWRITE,
            Self::Rwrite { .. } => RWRITE,
            Self::Tclunk { .. } => TCLUNK,
            Self::Rclunk => RCLUNK,
        }
    }
}

/// A tagged 9P message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub tag: u16,
    pub fcall: Fcall,
}

impl Message {
    pub fn new(tag: u16, fcall: Fcall) -> Self {
        Self { tag, fcall }
    }

    /// Serialize the message including its leading size field.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0; 4];
        out.push(self.fcall.code());
        out.extend_from_slice(&self.tag.to_le_bytes());

        match &self.fcall {
            Fcall::Tversion { msize, version } | Fcall::Rversion { msize, version } => {
                put_u32(&mut out, *msize);
                put_str(&mut out, version);
            }
            Fcall::Tattach {
                fid,
                afid,
                uname,
                aname,
            } => {
                put_u32(&mut out, *fid);
                put_u32(&mut out, *afid);
                put_str(&mut out, uname);
                put_str(&mut out, aname);
            }
            Fcall::Rattach { qid } => put_qid(&mut out, qid),
            Fcall::Rerror { ename } => put_str(&mut out, ename),
            Fcall::Twalk {
                fid,
                newfid,
                wnames,
            } => {
                put_u32(&mut out, *fid);
                put_u32(&mut out, *newfid);
                put_u16(&mut out, wnames.len() as u16);
                for name in wnames {
                    put_str(&mut out, name);
                }
            }
            Fcall::Rwalk { qids } => {
                put_u16(&mut out, qids.len() as u16);
                for qid in qids {
                    put_qid(&mut out, qid);
                }
            }
            Fcall::Topen { fid, mode } => {
                put_u32(&mut out, *fid);
                out.push(*mode);
            }
            Fcall::Ropen { qid, iounit } => {
                put_qid(&mut out, qid);
                put_u32(&mut out, *iounit);
            }
            Fcall::Tread { fid, offset, count } => {
                put_u32(&mut out, *fid);
                put_u64(&mut out, *offset);
                put_u32(&mut out, *count);
            }
            Fcall::Rread { data } => {
                put_u32(&mut out, data.len() as u32);
                out.extend_from_slice(data);
            }
            Fcall::Twrite { fid, offset, data } => {
                put_u32(&mut out, *fid);
                put_u64(&mut out, *offset);
                put_u32(&mut out, data.len() as u32);
                out.extend_from_slice(data);
            }
            Fcall::Rwrite { count } => put_u32(&mut out, *count),
            Fcall::Tclunk { fid } => put_u32(&mut out, *fid),
            Fcall::Rclunk => {}
        }

        let size = out.len() as u32;
        out[..4].copy_from_slice(&size.to_le_bytes());
        out
    }

    /// Parse a complete message, size field included.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor { buf };
        let size = cur.u32()? as usize;
        if size != buf.len() {
            return Err(NinepError::Malformed(format!(
                "size field {size} does not match {} bytes",
                buf.len()
            )));
        }
        let code = cur.u8()?;
        let tag = cur.u16()?;

        let fcall = match code {
            TVERSION => Fcall::Tversion {
                msize: cur.u32()?,
                version: cur.string()?,
            },
            RVERSION => Fcall::Rversion {
                msize: cur.u32()?,
                version: cur.string()?,
            },
            TATTACH => Fcall::Tattach {
                fid: cur.u32()?,
                afid: cur.u32()?,
                uname: cur.string()?,
                aname: cur.string()?,
            },
            RATTACH => Fcall::Rattach { qid: cur.qid()? },
            RERROR => Fcall::Rerror {
                ename: cur.string()?,
            },
            TWALK => {
                let fid = cur.u32()?;
                let newfid = cur.u32()?;
                let count = cur.u16()? as usize;
                let wnames = (0..count)
                    .map(|_| cur.string())
                    .collect::<Result<Vec<_>>>()?;
                Fcall::Twalk {
                    fid,
                    newfid,
                    wnames,
                }
            }
            RWALK => {
                let count = cur.u16()? as usize;
                let qids = (0..count).map(|_| cur.qid()).collect::<Result<Vec<_>>>()?;
                Fcall::Rwalk { qids }
            }
            TOPEN => Fcall::Topen {
                fid: cur.u32()?,
                mode: cur.u8()?,
            },
            ROPEN => Fcall::Ropen {
                qid: cur.qid()?,
                iounit: cur.u32()?,
            },
            TREAD => Fcall::Tread {
                fid: cur.u32()?,
                offset: cur.u64()?,
                count: cur.u32()?,
            },
            RREAD => {
                let count = cur.u32()? as usize;
                Fcall::Rread {
                    data: cur.bytes(count)?.to_vec(),
                }
            }
            TWRITE => {
                let fid = cur.u32()?;
                let offset = cur.u64()?;
                let count = cur.u32()? as usize;
                Fcall::Twrite {
                    fid,
                    offset,
                    data: cur.bytes(count)?.to_vec(),
                }
            }
            RWRITE => Fcall::Rwrite { count: cur.u32()? },
            TCLUNK => Fcall::Tclunk { fid: cur.u32()? },
            RCLUNK => Fcall::Rclunk,
            other => {
                return Err(NinepError::Malformed(format!(
                    "unsupported message type {other}"
                )));
            }
        };

        Ok(Self { tag, fcall })
    }
}

/// Read one framed message, refusing anything larger than `max_size`.
pub fn read_message<R: Read>(reader: &mut R, max_size: u32) -> Result<Message> {
    let mut size = [0u8; 4];
    reader.read_exact(&mut size)?;
    let len = u32::from_le_bytes(size);
    if (len as usize) < HEADER_LEN || len > max_size {
        return Err(NinepError::Malformed(format!(
            "message size {len} outside 7..={max_size}"
        )));
    }

    let mut buf = vec![0; len as usize];
    buf[..4].copy_from_slice(&size);
    reader.read_exact(&mut buf[4..])?;
    Message::decode(&buf)
}

pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    writer.write_all(&message.encode())?;
    writer.flush()?;
    Ok(())
}

/// An open file on the server.
///
/// Fids are deliberately not `Clone`: each one must be clunked exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct Fid {
    num: u32,
    iounit: u32,
}

impl Fid {
    pub fn num(&self) -> u32 {
        self.num
    }
}

/// Synchronous 9P client over any byte stream.
#[derive(Debug)]
pub struct Client<S> {
    stream: S,
    msize: u32,
    root: u32,
    next_fid: u32,
    next_tag: u16,
}

impl<S: Read + Write> Client<S> {
    /// Negotiate the protocol version and attach to the server's root as `uname`.
    pub fn attach(stream: S, msize: u32, uname: &str, aname: &str) -> Result<Self> {
        let mut client = Self {
            stream,
            msize,
            root: 0,
            next_fid: 1,
            next_tag: 0,
        };

        let reply = client.exchange(
            NOTAG,
            Fcall::Tversion {
                msize,
                version: VERSION.to_owned(),
            },
        )?;
        match reply {
            Fcall::Rversion { msize: agreed, version } if version == VERSION => {
                if agreed <= IOHDRSZ {
                    return Err(NinepError::Malformed(format!(
                        "server offered unusable msize {agreed}"
                    )));
                }
                client.msize = agreed.min(msize);
                debug!(msize = client.msize, "negotiated 9P version");
            }
            Fcall::Rversion { version, .. } => {
                return Err(NinepError::Malformed(format!(
                    "server speaks {version:?}, want {VERSION:?}"
                )));
            }
            other => return Err(unexpected("Tversion", &other)),
        }

        let tag = client.tag();
        let reply = client.exchange(
            tag,
            Fcall::Tattach {
                fid: client.root,
                afid: NOFID,
                uname: uname.to_owned(),
                aname: aname.to_owned(),
            },
        )?;
        match reply {
            Fcall::Rattach { .. } => Ok(client),
            other => Err(unexpected("Tattach", &other)),
        }
    }

    pub fn msize(&self) -> u32 {
        self.msize
    }

    /// Walk from the root to `path` and open it with `mode`.
    pub fn open(&mut self, path: &str, mode: u8) -> Result<Fid> {
        let wnames: Vec<String> = path
            .split('/')
            .filter(|elem| !elem.is_empty())
            .map(str::to_owned)
            .collect();
        if wnames.len() > MAXWELEM {
            return Err(NinepError::Malformed(format!(
                "path {path:?} has more than {MAXWELEM} elements"
            )));
        }

        let newfid = self.next_fid;
        self.next_fid += 1;
        let expected = wnames.len();
        match self.rpc(Fcall::Twalk {
            fid: self.root,
            newfid,
            wnames,
        })? {
            Fcall::Rwalk { qids } if qids.len() == expected => {}
            Fcall::Rwalk { .. } => {
                return Err(NinepError::Remote(format!("{path}: file does not exist")));
            }
            other => return Err(unexpected("Twalk", &other)),
        }

        let fid = Fid {
            num: newfid,
            iounit: 0,
        };
        match self.rpc(Fcall::Topen { fid: newfid, mode }) {
            Ok(Fcall::Ropen { iounit, .. }) => {
                debug!(path, fid = newfid, iounit, "opened file");
                Ok(Fid { iounit, ..fid })
            }
            Ok(other) => {
                let _ = self.clunk(fid);
                Err(unexpected("Topen", &other))
            }
            Err(err) => {
                let _ = self.clunk(fid);
                Err(err)
            }
        }
    }

    /// Largest payload a single read or write may carry on this connection.
    pub fn max_io(&self, fid: &Fid) -> u32 {
        let limit = self.msize - IOHDRSZ;
        if fid.iounit == 0 {
            limit
        } else {
            fid.iounit.min(limit)
        }
    }

    /// Read at most `buf.len()` bytes at `offset`. Returns 0 at end of file.
    pub fn read(&mut self, fid: &Fid, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let count = (buf.len() as u32).min(self.max_io(fid));
        match self.rpc(Fcall::Tread {
            fid: fid.num,
            offset,
            count,
        })? {
            Fcall::Rread { data } => {
                if data.len() > count as usize {
                    return Err(NinepError::Malformed(format!(
                        "read returned {} bytes for a {count} byte request",
                        data.len()
                    )));
                }
                buf[..data.len()].copy_from_slice(&data);
                trace!(fid = fid.num, offset, count, got = data.len(), "read");
                Ok(data.len())
            }
            other => Err(unexpected("Tread", &other)),
        }
    }

    /// Write `data` at `offset`, returning the number of bytes the server accepted.
    pub fn write(&mut self, fid: &Fid, offset: u64, data: &[u8]) -> Result<usize> {
        let max = self.max_io(fid) as usize;
        if data.len() > max {
            return Err(NinepError::Malformed(format!(
                "write of {} bytes exceeds {max}",
                data.len()
            )));
        }
        match self.rpc(Fcall::Twrite {
            fid: fid.num,
            offset,
            data: data.to_vec(),
        })? {
            Fcall::Rwrite { count } => Ok(count as usize),
            other => Err(unexpected("Twrite", &other)),
        }
    }

    /// Release a fid on the server.
    pub fn clunk(&mut self, fid: Fid) -> Result<()> {
        match self.rpc(Fcall::Tclunk { fid: fid.num })? {
            Fcall::Rclunk => {
                trace!(fid = fid.num, "clunked");
                Ok(())
            }
            other => Err(unexpected("Tclunk", &other)),
        }
    }

    fn tag(&mut self) -> u16 {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        if self.next_tag == NOTAG {
            self.next_tag = 0;
        }
        tag
    }

    fn rpc(&mut self, fcall: Fcall) -> Result<Fcall> {
        let tag = self.tag();
        self.exchange(tag, fcall)
    }

    fn exchange(&mut self, tag: u16, fcall: Fcall) -> Result<Fcall> {
        let sent = fcall.name();
        write_message(&mut self.stream, &Message::new(tag, fcall))?;
        let reply = read_message(&mut self.stream, self.msize)?;
        if reply.tag != tag {
            return Err(NinepError::Malformed(format!(
                "reply tag {} does not match request tag {tag}",
                reply.tag
            )));
        }
        match reply.fcall {
            Fcall::Rerror { ename } => Err(NinepError::Remote(ename)),
            fcall => {
                trace!(sent, got = fcall.name(), tag, "9P exchange");
                Ok(fcall)
            }
        }
    }
}

fn unexpected(sent: &'static str, got: &Fcall) -> NinepError {
    NinepError::Unexpected {
        sent,
        got: got.name(),
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    put_u16(out, value.len() as u16);
    out.extend_from_slice(value.as_bytes());
}

fn put_qid(out: &mut Vec<u8>, qid: &Qid) {
    out.push(qid.kind);
    put_u32(out, qid.version);
    put_u64(out, qid.path);
}

struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.buf.len() < len {
            return Err(NinepError::Malformed(format!(
                "need {len} bytes, {} left",
                self.buf.len()
            )));
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| NinepError::Malformed("string is not valid UTF-8".into()))
    }

    fn qid(&mut self) -> Result<Qid> {
        Ok(Qid {
            kind: self.u8()?,
            version: self.u32()?,
            path: self.u64()?,
        })
    }
}
