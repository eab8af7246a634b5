//! Media instances
//!
//! A [`Media`] is one constructed pipeline serving the streams of a URL. It is
//! reference counted explicitly: every holder obtained from a factory owns
//! one *user*, and [`Media::release`] gives it back. When the last user
//! leaves, the media is unprepared. A non-reusable media is torn down at that
//! point: it leaves its pipeline container, is never handed out again, and
//! raises its `unprepared` notification so a factory can drop it from the
//! cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::auth::AuthRef;
use crate::signal::{HandlerId, Signal};

use super::error::MediaError;
use super::pipeline::{Bin, PipelineContainer};
use super::stream::{LowerTransport, MediaStream};

/// Construction progress of a media
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    New,
    ElementBuilt,
    StreamsCollected,
    PipelineAttached,
    Configured,
    Cached,
}

/// Lifecycle status of a media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    /// Built or stopped, not streaming
    Unprepared,
    /// Active in its pipeline container
    Prepared,
    /// Torn down; can't be prepared or handed out again
    TornDown,
}

struct MediaInner {
    stage: BuildStage,
    status: MediaStatus,
    element: Option<Bin>,
    pipeline: Option<Arc<PipelineContainer>>,
    streams: Vec<MediaStream>,
    dynamic: Vec<String>,
    shared: bool,
    reusable: bool,
    eos_shutdown: bool,
    buffer_size: u32,
    multicast_group: Option<String>,
    protocols: LowerTransport,
    auth: Option<AuthRef>,
    users: usize,
}

/// A constructed media pipeline
pub struct Media {
    id: u64,
    inner: Mutex<MediaInner>,
    unprepared: Signal<u64>,
}

static NEXT_MEDIA_ID: AtomicU64 = AtomicU64::new(1);

impl Media {
    /// Create an empty media with no users
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_MEDIA_ID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(MediaInner {
                stage: BuildStage::New,
                status: MediaStatus::Unprepared,
                element: None,
                pipeline: None,
                streams: Vec::new(),
                dynamic: Vec::new(),
                shared: false,
                reusable: false,
                eos_shutdown: false,
                buffer_size: 0,
                multicast_group: None,
                protocols: LowerTransport::default(),
                auth: None,
                users: 0,
            }),
            unprepared: Signal::new(),
        })
    }

    /// Unique media id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stage(&self) -> BuildStage {
        self.inner.lock().stage
    }

    pub(crate) fn set_stage(&self, stage: BuildStage) {
        self.inner.lock().stage = stage;
    }

    pub fn status(&self) -> MediaStatus {
        self.inner.lock().status
    }

    /// Set the element graph of this media
    pub fn set_element(&self, element: Bin) {
        let mut inner = self.inner.lock();
        inner.element = Some(element);
        if inner.stage < BuildStage::ElementBuilt {
            inner.stage = BuildStage::ElementBuilt;
        }
    }

    /// Run `f` on the element graph, if there is one
    pub fn with_element<R>(&self, f: impl FnOnce(&Bin) -> R) -> Option<R> {
        self.inner.lock().element.as_ref().map(f)
    }

    /// Name of the element graph
    pub fn element_name(&self) -> Option<String> {
        self.with_element(|bin| bin.name().to_string())
    }

    /// Register a payloader stream
    pub fn add_stream(&self, stream: MediaStream) {
        tracing::debug!(media = self.id, index = stream.index, payloader = %stream.payloader, "Found stream");
        self.inner.lock().streams.push(stream);
    }

    /// Register a dynamic payloader
    pub fn add_dynamic(&self, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!(media = self.id, element = %name, "Found dynamic payloader");
        self.inner.lock().dynamic.push(name);
    }

    pub fn n_streams(&self) -> usize {
        self.inner.lock().streams.len()
    }

    pub fn stream(&self, index: usize) -> Option<MediaStream> {
        self.inner.lock().streams.get(index).cloned()
    }

    pub fn streams(&self) -> Vec<MediaStream> {
        self.inner.lock().streams.clone()
    }

    pub fn dynamic(&self) -> Vec<String> {
        self.inner.lock().dynamic.clone()
    }

    pub(crate) fn set_pipeline(&self, pipeline: Arc<PipelineContainer>) {
        let mut inner = self.inner.lock();
        inner.pipeline = Some(pipeline);
        if inner.stage < BuildStage::PipelineAttached {
            inner.stage = BuildStage::PipelineAttached;
        }
    }

    /// The container this media's bin is attached to
    pub fn pipeline(&self) -> Option<Arc<PipelineContainer>> {
        self.inner.lock().pipeline.clone()
    }

    pub fn set_shared(&self, shared: bool) {
        self.inner.lock().shared = shared;
    }

    /// Whether this media may be handed to several clients
    pub fn is_shared(&self) -> bool {
        self.inner.lock().shared
    }

    pub fn set_reusable(&self, reusable: bool) {
        self.inner.lock().reusable = reusable;
    }

    /// Whether this media can be prepared again after an unprepare
    pub fn is_reusable(&self) -> bool {
        self.inner.lock().reusable
    }

    pub fn set_eos_shutdown(&self, eos_shutdown: bool) {
        self.inner.lock().eos_shutdown = eos_shutdown;
    }

    pub fn is_eos_shutdown(&self) -> bool {
        self.inner.lock().eos_shutdown
    }

    pub fn set_buffer_size(&self, size: u32) {
        self.inner.lock().buffer_size = size;
    }

    pub fn buffer_size(&self) -> u32 {
        self.inner.lock().buffer_size
    }

    pub fn set_multicast_group(&self, group: Option<String>) {
        self.inner.lock().multicast_group = group;
    }

    pub fn multicast_group(&self) -> Option<String> {
        self.inner.lock().multicast_group.clone()
    }

    pub fn set_protocols(&self, protocols: LowerTransport) {
        self.inner.lock().protocols = protocols;
    }

    pub fn protocols(&self) -> LowerTransport {
        self.inner.lock().protocols
    }

    pub fn set_auth(&self, auth: Option<AuthRef>) {
        self.inner.lock().auth = auth;
    }

    pub fn auth(&self) -> Option<AuthRef> {
        self.inner.lock().auth.clone()
    }

    /// Number of holders currently using this media
    pub fn users(&self) -> usize {
        self.inner.lock().users
    }

    /// Add a user unless the media was torn down
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.status == MediaStatus::TornDown {
            return false;
        }
        inner.users += 1;
        true
    }

    /// Give back one user. The last user unprepares the media.
    pub fn release(&self) {
        let changed = {
            let mut inner = self.inner.lock();
            if inner.users == 0 {
                tracing::warn!(media = self.id, "Release without a user");
                return;
            }
            inner.users -= 1;
            tracing::trace!(media = self.id, users = inner.users, "Media released");
            inner.users == 0 && self.unprepare_locked(&mut inner)
        };

        if changed {
            self.unprepared.emit(&self.id);
        }
    }

    /// Start streaming: mark the media active in its container
    pub fn prepare(&self) -> Result<(), MediaError> {
        let mut inner = self.inner.lock();

        match inner.status {
            MediaStatus::TornDown => Err(MediaError::TornDown(self.id)),
            MediaStatus::Prepared => Ok(()),
            MediaStatus::Unprepared => {
                let pipeline = inner
                    .pipeline
                    .clone()
                    .ok_or(MediaError::NoPipeline(self.id))?;
                pipeline.set_active(self.id, true);
                inner.status = MediaStatus::Prepared;
                tracing::debug!(media = self.id, pipeline = %pipeline.name(), "Media prepared");
                Ok(())
            }
        }
    }

    /// Stop streaming. A non-reusable media is torn down.
    pub fn unprepare(&self) {
        let changed = {
            let mut inner = self.inner.lock();
            self.unprepare_locked(&mut inner)
        };

        if changed {
            self.unprepared.emit(&self.id);
        }
    }

    fn unprepare_locked(&self, inner: &mut MediaInner) -> bool {
        match inner.status {
            MediaStatus::TornDown => return false,
            MediaStatus::Unprepared if inner.reusable => return false,
            _ => {}
        }

        if inner.eos_shutdown && inner.status == MediaStatus::Prepared {
            tracing::debug!(media = self.id, "Sending EOS before shutdown");
        }

        if let Some(pipeline) = &inner.pipeline {
            pipeline.set_active(self.id, false);
            if !inner.reusable {
                pipeline.detach(self.id);
            }
        }

        inner.status = if inner.reusable {
            MediaStatus::Unprepared
        } else {
            MediaStatus::TornDown
        };

        tracing::debug!(media = self.id, status = ?inner.status, "Media unprepared");
        true
    }

    /// Tear down unconditionally, releasing everything built so far
    pub(crate) fn discard(&self) {
        let changed = {
            let mut inner = self.inner.lock();
            if inner.status == MediaStatus::TornDown {
                false
            } else {
                if let Some(pipeline) = &inner.pipeline {
                    pipeline.detach(self.id);
                }
                inner.users = 0;
                inner.status = MediaStatus::TornDown;
                true
            }
        };

        if changed {
            tracing::debug!(media = self.id, "Media discarded");
            self.unprepared.emit(&self.id);
        }
    }

    /// Notification raised with the media id when the media is unprepared
    pub fn unprepared(&self) -> &Signal<u64> {
        &self.unprepared
    }

    /// Shorthand for `unprepared().connect(..)`
    pub fn connect_unprepared<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&u64) + Send + Sync + 'static,
    {
        self.unprepared.connect(f)
    }
}

impl Drop for Media {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(pipeline) = &inner.pipeline {
            pipeline.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Media {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Media")
            .field("id", &self.id)
            .field("stage", &inner.stage)
            .field("status", &inner.status)
            .field("shared", &inner.shared)
            .field("streams", &inner.streams.len())
            .field("users", &inner.users)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::media::pipeline::PipelineState;

    fn attached_media(container: &Arc<PipelineContainer>) -> Arc<Media> {
        let media = Media::new();
        media.set_element(Bin::new("bin"));
        container.attach(media.id(), "bin");
        media.set_pipeline(Arc::clone(container));
        media
    }

    #[test]
    fn test_stage_progression() {
        let media = Media::new();
        assert_eq!(media.stage(), BuildStage::New);

        media.set_element(Bin::new("bin"));
        assert_eq!(media.stage(), BuildStage::ElementBuilt);

        media.set_pipeline(Arc::new(PipelineContainer::new("p")));
        assert_eq!(media.stage(), BuildStage::PipelineAttached);
    }

    #[test]
    fn test_last_release_tears_down() {
        let container = Arc::new(PipelineContainer::new("p"));
        let media = attached_media(&container);
        let fired = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&fired);
        media.connect_unprepared(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert!(media.try_acquire());
        assert!(media.try_acquire());
        media.prepare().unwrap();
        assert_eq!(container.state(), PipelineState::Playing);

        media.release();
        assert_eq!(media.status(), MediaStatus::Prepared);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        media.release();
        assert_eq!(media.status(), MediaStatus::TornDown);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(container.is_empty());

        assert!(!media.try_acquire());
        assert_eq!(media.prepare(), Err(MediaError::TornDown(media.id())));
    }

    #[test]
    fn test_reusable_media_survives_unprepare() {
        let container = Arc::new(PipelineContainer::new("p"));
        let media = attached_media(&container);
        media.set_reusable(true);

        assert!(media.try_acquire());
        media.prepare().unwrap();
        media.release();

        assert_eq!(media.status(), MediaStatus::Unprepared);
        assert_eq!(container.state(), PipelineState::Null);
        assert!(container.contains(media.id()));

        assert!(media.try_acquire());
        media.prepare().unwrap();
        assert_eq!(container.state(), PipelineState::Playing);
    }

    #[test]
    fn test_prepare_without_pipeline() {
        let media = Media::new();

        assert_eq!(media.prepare(), Err(MediaError::NoPipeline(media.id())));
    }

    #[test]
    fn test_drop_detaches_from_container() {
        let container = Arc::new(PipelineContainer::new("p"));
        let media = attached_media(&container);
        assert_eq!(container.len(), 1);

        drop(media);
        assert!(container.is_empty());
    }
}
