//! Capturing the state of an editor window.

use std::path::PathBuf;

use tracing::debug;

use crate::domain::errors::LinkError;
use crate::domain::model::WindowSnapshot;

/// Operations the snapshot reader needs from an open editor window.
///
/// Implementations own whatever remote handles back the window and release them on drop.
pub trait EditorWindow {
    /// Point the window's addressable range at the visible selection.
    fn select_dot(&mut self) -> Result<(), LinkError>;

    /// Current address as a pair of rune offsets.
    fn read_addr(&mut self) -> Result<(usize, usize), LinkError>;

    /// Full body text, requesting at most `chunk_size` bytes per read.
    fn read_body(&mut self, chunk_size: usize) -> Result<Vec<u8>, LinkError>;

    /// The window's tag line.
    fn read_tag(&mut self) -> Result<String, LinkError>;
}

/// Read path, selection and body from `window`.
pub fn read_snapshot<W: EditorWindow + ?Sized>(
    window: &mut W,
    chunk_size: usize,
) -> Result<WindowSnapshot, LinkError> {
    window.select_dot()?;
    let (selection_start, selection_end) = window.read_addr()?;
    if selection_start > selection_end {
        return Err(LinkError::Protocol(format!(
            "selection start {selection_start} is after its end {selection_end}"
        )));
    }

    let body = window.read_body(chunk_size)?;
    let tag = window.read_tag()?;
    let path = path_from_tag(&tag)?;
    debug!(
        path = %path.display(),
        selection_start,
        selection_end,
        bytes = body.len(),
        "captured window"
    );

    Ok(WindowSnapshot {
        path,
        body,
        selection_start,
        selection_end,
    })
}

/// The file name is everything in the tag before the first space.
pub fn path_from_tag(tag: &str) -> Result<PathBuf, LinkError> {
    match tag.split_once(' ') {
        Some((name, _)) => Ok(PathBuf::from(name)),
        None => Err(LinkError::Protocol("strange tag with no spaces".to_owned())),
    }
}
