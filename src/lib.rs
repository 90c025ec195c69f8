mod broadcast;
mod config;
mod error;
mod graph;
mod index;
mod links;
mod mutate;
mod parse;
mod resolve;
#[cfg(feature = "web")]
mod server;
mod service;
mod store;
mod watch;

pub use crate::broadcast::{EventBroadcaster, LiveEvent, Subscription};
pub use crate::config::{ExcludeFilter, NotesConfig};
pub use crate::error::{Error, Result};
pub use crate::graph::{GraphEdge, GraphNode, GraphSnapshot, LocalGraph};
pub use crate::index::{
    ChangeEvent, FileKind, FileMeta, NoteIndex, NoteRecord, RecentNote, SearchHit,
};
pub use crate::links::{LinkRef, RefKind, Resolution, TaskItem};
#[cfg(feature = "web")]
pub use crate::server::serve;
pub use crate::service::NotesService;
pub use crate::store::{NotePath, NoteStore};
