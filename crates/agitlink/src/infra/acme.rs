//! Access to acme windows through acme's 9P file server.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::{debug, warn};

use crate::app::window::EditorWindow;
use crate::domain::errors::LinkError;
use crate::infra::chunked::{DEFAULT_CHUNK_SIZE, read_to_end_chunked};
use crate::infra::ninep::{Client, Fid, IOHDRSZ, NinepError, OREAD, ORDWR};

/// Message size requested from acme.
pub const ACME_MSIZE: u32 = 8192 + IOHDRSZ;

/// Longest reply acme gives for the `addr` file.
const ADDR_REPLY_LEN: usize = 40;

/// Name of the file server socket inside the namespace directory.
pub const ACME_SOCKET: &str = "acme";

/// An open acme window.
///
/// `ctl` is opened together with the window; `addr`, `body` and `tag` are opened on first use.
/// Every fid that was opened is clunked when the window is dropped.
pub struct Win<S: Read + Write> {
    client: Client<S>,
    id: u32,
    ctl: Option<Fid>,
    addr: Option<Fid>,
    body: Option<Fid>,
    tag: Option<Fid>,
}

impl Win<UnixStream> {
    /// Connect to the acme serving `namespace` and open window `id`.
    pub fn connect(namespace: &Path, id: u32, user: &str) -> Result<Self, LinkError> {
        let socket = namespace.join(ACME_SOCKET);
        debug!(socket = %socket.display(), id, "connecting to acme");
        let stream = UnixStream::connect(&socket).map_err(|err| {
            LinkError::Connection(format!(
                "cannot connect to acme at {}: {err}",
                socket.display()
            ))
        })?;
        Self::open(stream, id, user)
    }
}

impl<S: Read + Write> Win<S> {
    /// Mount acme over `stream` and open window `id`.
    pub fn open(stream: S, id: u32, user: &str) -> Result<Self, LinkError> {
        let mut client = Client::attach(stream, ACME_MSIZE, user, "")
            .map_err(|err| LinkError::Connection(format!("cannot mount acme: {err}")))?;
        let ctl = client.open(&format!("{id}/ctl"), ORDWR).map_err(|err| {
            LinkError::Connection(format!("cannot open acme window {id}: {err}"))
        })?;

        Ok(Self {
            client,
            id,
            ctl: Some(ctl),
            addr: None,
            body: None,
            tag: None,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Write a control message such as `addr=dot` to the window's `ctl` file.
    pub fn ctl(&mut self, message: &str) -> Result<(), NinepError> {
        let fid = lazy_open(&mut self.client, &mut self.ctl, self.id, "ctl", ORDWR)?;
        self.client.write(fid, 0, message.as_bytes())?;
        debug!(id = self.id, message, "wrote ctl");
        Ok(())
    }

    /// Read the current address as two rune offsets.
    pub fn addr(&mut self) -> Result<(usize, usize), NinepError> {
        let fid = lazy_open(&mut self.client, &mut self.addr, self.id, "addr", ORDWR)?;
        let mut buf = [0u8; ADDR_REPLY_LEN];
        let n = self.client.read(fid, 0, &mut buf)?;
        parse_addr(&buf[..n])
    }

    /// Read `file` from the start, `chunk_size` bytes at a time.
    fn read_file(&mut self, file: TextFile, chunk_size: usize) -> Result<Vec<u8>, NinepError> {
        let slot = match file {
            TextFile::Body => &mut self.body,
            TextFile::Tag => &mut self.tag,
        };
        let fid = lazy_open(&mut self.client, slot, self.id, file.name(), OREAD)?;
        let mut reader = FileReader {
            client: &mut self.client,
            fid,
            offset: 0,
        };
        read_to_end_chunked(&mut reader, chunk_size)
            .map_err(|err| err.downcast::<NinepError>().unwrap_or_else(NinepError::Io))
    }
}

#[derive(Debug, Clone, Copy)]
enum TextFile {
    Body,
    Tag,
}

impl TextFile {
    fn name(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Tag => "tag",
        }
    }
}

impl<S: Read + Write> EditorWindow for Win<S> {
    fn select_dot(&mut self) -> Result<(), LinkError> {
        // acme resets addr when the file is first opened, so open it before setting it.
        self.addr()
            .map_err(|err| LinkError::Protocol(format!("cannot read address: {err}")))?;
        self.ctl("addr=dot")
            .map_err(|err| LinkError::Protocol(format!("cannot set addr=dot: {err}")))
    }

    fn read_addr(&mut self) -> Result<(usize, usize), LinkError> {
        self.addr()
            .map_err(|err| LinkError::Protocol(format!("cannot read address: {err}")))
    }

    fn read_body(&mut self, chunk_size: usize) -> Result<Vec<u8>, LinkError> {
        self.read_file(TextFile::Body, chunk_size)
            .map_err(|err| LinkError::Protocol(format!("cannot read body: {err}")))
    }

    fn read_tag(&mut self) -> Result<String, LinkError> {
        let raw = self
            .read_file(TextFile::Tag, DEFAULT_CHUNK_SIZE)
            .map_err(|err| LinkError::Protocol(format!("cannot read tag: {err}")))?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

impl<S: Read + Write> Drop for Win<S> {
    fn drop(&mut self) {
        let fids = [
            self.tag.take(),
            self.body.take(),
            self.addr.take(),
            self.ctl.take(),
        ];
        for fid in fids.into_iter().flatten() {
            let num = fid.num();
            if let Err(err) = self.client.clunk(fid) {
                warn!(id = self.id, fid = num, error = %err, "failed to release acme file");
            }
        }
        debug!(id = self.id, "closed acme window");
    }
}

/// Parse the `addr` file contents: two decimal rune offsets separated by blanks.
pub fn parse_addr(raw: &[u8]) -> Result<(usize, usize), NinepError> {
    let text = String::from_utf8_lossy(raw);
    let mut fields = text.split_whitespace();
    let (Some(q0), Some(q1)) = (fields.next(), fields.next()) else {
        return Err(NinepError::Malformed(format!(
            "short read from acme addr: {text:?}"
        )));
    };
    let parse = |field: &str| {
        field
            .parse::<usize>()
            .map_err(|_| NinepError::Malformed(format!("invalid address {field:?}")))
    };
    Ok((parse(q0)?, parse(q1)?))
}

fn lazy_open<'a, S: Read + Write>(
    client: &mut Client<S>,
    slot: &'a mut Option<Fid>,
    id: u32,
    name: &str,
    mode: u8,
) -> Result<&'a Fid, NinepError> {
    let fid = match slot.take() {
        Some(fid) => fid,
        None => client.open(&format!("{id}/{name}"), mode)?,
    };
    Ok(slot.insert(fid))
}

/// Sequential reader over an open fid.
struct FileReader<'a, S> {
    client: &'a mut Client<S>,
    fid: &'a Fid,
    offset: u64,
}

impl<S: Read + Write> Read for FileReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .client
            .read(self.fid, self.offset, buf)
            .map_err(|err| match err {
                NinepError::Io(err) => err,
                other => io::Error::other(other),
            })?;
        self.offset += n as u64;
        Ok(n)
    }
}
