//! Snapshot chunk readers handed to follower state during an install.
//!
//! Follower state only stores the reader while an install is in progress; it
//! never looks at chunk contents. The install driver uses the reader to
//! produce the next chunk and records the id of the chunk the follower
//! expects next (see `FollowerReplicationState::set_next_snapshot_chunk`).

use bytes::Bytes;

use crate::types::{LogIndex, Term};

/// One chunk of a snapshot being transferred.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotChunk {
    /// Opaque chunk identifier
    pub id: Bytes,
    /// Chunk contents
    pub data: Bytes,
}

/// Sequential reader over the chunks of one snapshot.
pub trait SnapshotChunkReader: Send {
    /// Last log index covered by the snapshot.
    fn index(&self) -> LogIndex;

    /// Term of the entry at [`SnapshotChunkReader::index`].
    fn term(&self) -> Term;

    /// Positions the reader at the chunk with the given id; `None` rewinds.
    fn seek(&mut self, chunk_id: Option<&Bytes>);

    /// Id of the chunk the next call to `next_chunk` returns, if any.
    fn next_id(&self) -> Option<Bytes>;

    /// Returns the next chunk and moves past it.
    fn next_chunk(&mut self) -> Option<SnapshotChunk>;
}

/// Snapshot held entirely in memory as a list of chunks.
#[derive(Clone, Debug)]
pub struct MemorySnapshotReader {
    index: LogIndex,
    term: Term,
    chunks: Vec<SnapshotChunk>,
    position: usize,
}

impl MemorySnapshotReader {
    /// Creates a reader over the given chunks.
    pub fn new(index: LogIndex, term: Term, chunks: Vec<SnapshotChunk>) -> Self {
        Self {
            index,
            term,
            chunks,
            position: 0,
        }
    }

    /// Splits `data` into chunks of at most `chunk_size` bytes, ids `"0"`, `"1"`, ...
    pub fn from_bytes(index: LogIndex, term: Term, data: Bytes, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + chunk_size).min(data.len());
            chunks.push(SnapshotChunk {
                id: Bytes::from(chunks.len().to_string()),
                data: data.slice(offset..end),
            });
            offset = end;
        }
        Self::new(index, term, chunks)
    }

    /// Total number of chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl SnapshotChunkReader for MemorySnapshotReader {
    fn index(&self) -> LogIndex {
        self.index
    }

    fn term(&self) -> Term {
        self.term
    }

    fn seek(&mut self, chunk_id: Option<&Bytes>) {
        self.position = match chunk_id {
            None => 0,
            Some(id) => self
                .chunks
                .iter()
                .position(|c| &c.id == id)
                .unwrap_or(self.chunks.len()),
        };
    }

    fn next_id(&self) -> Option<Bytes> {
        self.chunks.get(self.position).map(|c| c.id.clone())
    }

    fn next_chunk(&mut self) -> Option<SnapshotChunk> {
        let chunk = self.chunks.get(self.position).cloned()?;
        self.position += 1;
        Some(chunk)
    }
}
