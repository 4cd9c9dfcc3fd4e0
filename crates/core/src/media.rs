//! Opaque media handles
//!
//! The core never inspects media. Tracks are attached to a transport on
//! `start()` and received tracks are accumulated into a [`RemoteStream`].

use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// A local or remote media track supplied by the transport implementation
pub trait MediaTrack: Send + Sync + std::fmt::Debug {
    /// Track identifier
    fn id(&self) -> String;

    /// Audio or video
    fn kind(&self) -> TrackKind;

    /// Stop producing media; only meaningful for local tracks
    fn stop(&self);

    /// Downcast hook for transport implementations
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a media track
pub type TrackHandle = Arc<dyn MediaTrack>;

/// Remote media stream accumulated from received tracks
///
/// A connection owns exactly one stream for its whole life and hands out
/// `Arc<RemoteStream>` clones; tracks are appended in place so subscribers
/// may keep the handle.
#[derive(Debug, Default)]
pub struct RemoteStream {
    tracks: RwLock<Vec<TrackHandle>>,
}

impl RemoteStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received track
    pub fn add_track(&self, track: TrackHandle) {
        self.tracks.write().push(track);
    }

    /// Snapshot of all tracks
    pub fn tracks(&self) -> Vec<TrackHandle> {
        self.tracks.read().clone()
    }

    /// Snapshot of the tracks of one kind
    pub fn tracks_of_kind(&self, kind: TrackKind) -> Vec<TrackHandle> {
        self.tracks
            .read()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }
}
