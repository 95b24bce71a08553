//! Parsers for git command output.
//!
//! Every parser here is a pure function over text the caller already
//! captured from a git subprocess: no I/O, no async, no shared state.
//! Malformed input never panics or errors; it degrades to `None` or to a
//! best-effort partial model.
//!
//! The [`args`] module builds the argument vectors whose output formats
//! these parsers expect.

pub mod args;
pub mod blame;
pub mod branch;
pub mod commit;
pub mod diff;
pub mod log;
pub mod remote;
pub mod stash;
pub mod status;

mod entries;

pub use args::{GitVersion, PorcelainVersion};
pub use blame::{Blame, BlameAuthor, RangedBlame, parse_blame};
pub use branch::{Branch, parse_branches};
pub use commit::{BlameLine, Commit, CommitKind, LineRange, UNCOMMITTED_SHA};
pub use diff::{Diff, DiffChunk, parse_diff};
pub use log::{FileStatus, FileStatusKind, Log, LogCommit, LogParams, LogScope, parse_log};
pub use remote::{Remote, RemoteKind, RemoteProvider, parse_remotes};
pub use stash::{Stash, StashCommit, parse_stash};
pub use status::{Status, StatusFile, parse_status};
