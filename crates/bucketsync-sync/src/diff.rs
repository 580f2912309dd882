//! Merge-join of two sorted file streams
//!
//! [`zip_folders`] walks both streams in lockstep, holding one lookahead
//! file per side, and pairs files with equal names. Both inputs must be
//! sorted with the same ordering (see [`crate::folder`]); the join does not
//! check this.

use std::cmp::Ordering;

use futures::stream::{self, Stream, StreamExt};

use bucketsync_core::domain::File;

use crate::folder::FileStream;
use crate::SyncError;

/// A source/destination pair; at least one side is present
pub type FilePair = (Option<File>, Option<File>);

/// Pairs the files of two sorted streams by name
///
/// Yields pairs in ascending name order. Every name from either side appears
/// in exactly one pair. The first error from either side is yielded and ends
/// the stream.
pub fn zip_folders(
    source: FileStream,
    dest: FileStream,
) -> impl Stream<Item = Result<FilePair, SyncError>> + Send {
    let state = ZipState {
        source: Side::new(source),
        dest: Side::new(dest),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        match state.step().await {
            Ok(Some(pair)) => Some((Ok(pair), state)),
            Ok(None) => None,
            Err(err) => {
                state.done = true;
                Some((Err(err), state))
            }
        }
    })
}

/// One input with its lookahead slot
struct Side {
    files: FileStream,
    current: Option<File>,
    exhausted: bool,
}

impl Side {
    fn new(files: FileStream) -> Self {
        Self {
            files,
            current: None,
            exhausted: false,
        }
    }

    /// Fills the lookahead slot if it is empty and the stream has more
    async fn fill(&mut self) -> Result<(), SyncError> {
        if self.current.is_none() && !self.exhausted {
            match self.files.next().await {
                Some(file) => self.current = Some(file?),
                None => self.exhausted = true,
            }
        }
        Ok(())
    }
}

struct ZipState {
    source: Side,
    dest: Side,
    done: bool,
}

impl ZipState {
    async fn step(&mut self) -> Result<Option<FilePair>, SyncError> {
        self.source.fill().await?;
        self.dest.fill().await?;

        let ordering = match (&self.source.current, &self.dest.current) {
            (None, None) => return Ok(None),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.name().cmp(b.name()),
        };

        let pair = match ordering {
            Ordering::Less => (self.source.current.take(), None),
            Ordering::Greater => (None, self.dest.current.take()),
            Ordering::Equal => (self.source.current.take(), self.dest.current.take()),
        };
        Ok(Some(pair))
    }
}
