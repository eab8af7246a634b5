//! Media factory
//!
//! A [`MediaFactory`] turns a URL into a [`Media`]. Construction runs through
//! the stages of [`FactoryHooks`]; every stage has a default implementation
//! exposed as a free function (`default_gen_key`, `default_get_element`, ...)
//! so an override can do its own work and still call the default explicitly.
//!
//! # Sharing
//!
//! With `shared` enabled, the factory caches each constructed media under the
//! key produced by `gen_key` and hands the same media to every caller until it
//! is torn down. The cache lock is only held around table operations, so two
//! concurrent `construct` calls for the same uncached key may both build a
//! media. The insert step reconciles them: the first media in the table wins,
//! the other one is discarded and the winner is returned to both callers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::auth::AuthRef;
use crate::signal::{HandlerId, Signal};
use crate::url::RtspUrl;

use super::cache::MediaCache;
use super::error::ConstructError;
use super::instance::{BuildStage, Media};
use super::launch::parse_launch;
use super::pipeline::{Bin, PipelineContainer, DEFAULT_PIPELINE_NAME};
use super::stream::{LowerTransport, MediaStream};

/// Default kernel buffer size stamped on medias
pub const DEFAULT_BUFFER_SIZE: u32 = 0x80000;

/// Default multicast group stamped on medias
pub const DEFAULT_MULTICAST_GROUP: &str = "224.2.0.1";

/// Factory configuration
#[derive(Clone)]
pub struct FactoryConfig {
    /// Launch description consumed by the default `get_element`
    pub launch: Option<String>,

    /// Share medias between clients through the cache
    pub shared: bool,

    /// Send EOS down the pipeline before shutting down
    pub eos_shutdown: bool,

    /// Allowed lower transports
    pub protocols: LowerTransport,

    /// Kernel UDP buffer size
    pub buffer_size: u32,

    /// Multicast group to send media to
    pub multicast_group: Option<String>,

    /// Authentication passed to constructed medias
    pub auth: Option<AuthRef>,

    /// Container to attach every media to instead of a new one per media
    pub pipeline_container: Option<Arc<PipelineContainer>>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            launch: None,
            shared: false,
            eos_shutdown: false,
            protocols: LowerTransport::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            multicast_group: Some(DEFAULT_MULTICAST_GROUP.to_string()),
            auth: None,
            pipeline_container: None,
        }
    }
}

impl FactoryConfig {
    /// Config with a launch description
    pub fn with_launch(launch: impl Into<String>) -> Self {
        Self {
            launch: Some(launch.into()),
            ..Default::default()
        }
    }

    /// Enable or disable sharing
    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Enable or disable EOS on shutdown
    pub fn eos_shutdown(mut self, eos_shutdown: bool) -> Self {
        self.eos_shutdown = eos_shutdown;
        self
    }

    /// Set the allowed transports
    pub fn protocols(mut self, protocols: LowerTransport) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set the buffer size
    pub fn buffer_size(mut self, size: u32) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the multicast group
    pub fn multicast_group(mut self, group: impl Into<String>) -> Self {
        self.multicast_group = Some(group.into());
        self
    }

    /// Attach all medias to `container`
    pub fn pipeline_container(mut self, container: Arc<PipelineContainer>) -> Self {
        self.pipeline_container = Some(container);
        self
    }
}

/// Overridable construction stages
pub trait FactoryHooks: Send + Sync {
    /// Derive the cache key for `url`
    fn gen_key(&self, factory: &MediaFactory, url: &RtspUrl) -> String {
        default_gen_key(factory, url)
    }

    /// Build the element graph for `url`
    fn get_element(&self, factory: &MediaFactory, url: &RtspUrl) -> Result<Bin, ConstructError> {
        default_get_element(factory, url)
    }

    /// Register the stream endpoints of `media`
    fn collect_streams(
        &self,
        factory: &MediaFactory,
        url: &RtspUrl,
        media: &Media,
    ) -> Result<(), ConstructError> {
        default_collect_streams(factory, url, media)
    }

    /// Attach the element graph of `media` to a pipeline container
    fn create_pipeline(
        &self,
        factory: &MediaFactory,
        media: &Media,
    ) -> Result<Arc<PipelineContainer>, ConstructError> {
        default_create_pipeline(factory, media)
    }

    /// Apply factory policy to `media` and raise the media notifications
    fn configure(&self, factory: &MediaFactory, media: &Arc<Media>) {
        default_configure(factory, media)
    }
}

/// Hooks that use every default stage
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl FactoryHooks for DefaultHooks {}

/// Canonical URL including the query string
pub fn default_gen_key(_factory: &MediaFactory, url: &RtspUrl) -> String {
    url.canonical()
}

/// Parse the factory's launch description
pub fn default_get_element(factory: &MediaFactory, _url: &RtspUrl) -> Result<Bin, ConstructError> {
    let launch = factory.launch().ok_or_else(|| {
        tracing::error!("No launch description specified");
        ConstructError::NoLaunch
    })?;

    parse_launch(&launch).map_err(|e| {
        tracing::error!(launch = %launch, error = %e, "Could not parse launch description");
        ConstructError::from(e)
    })
}

/// Find the `payN` and `dynpayN` elements, stopping at the first index
/// that has neither
pub fn default_collect_streams(
    _factory: &MediaFactory,
    _url: &RtspUrl,
    media: &Media,
) -> Result<(), ConstructError> {
    let (streams, dynamic) = media
        .with_element(|bin| {
            let mut streams = Vec::new();
            let mut dynamic = Vec::new();

            for index in 0u32.. {
                let pay = format!("pay{}", index);
                let dynpay = format!("dynpay{}", index);
                let mut found = false;

                if bin.by_name(&pay).is_some() {
                    streams.push(MediaStream::new(index, pay));
                    found = true;
                }
                if bin.by_name(&dynpay).is_some() {
                    dynamic.push(dynpay);
                    found = true;
                }
                if !found {
                    break;
                }
            }

            (streams, dynamic)
        })
        .ok_or(ConstructError::NoElement)?;

    if streams.is_empty() && dynamic.is_empty() {
        tracing::error!(media = media.id(), "No payloaders found");
        return Err(ConstructError::NoStreams);
    }

    for stream in streams {
        media.add_stream(stream);
    }
    for name in dynamic {
        media.add_dynamic(name);
    }

    Ok(())
}

/// Attach to the factory's container, or to a new one
pub fn default_create_pipeline(
    factory: &MediaFactory,
    media: &Media,
) -> Result<Arc<PipelineContainer>, ConstructError> {
    let bin = media.element_name().ok_or(ConstructError::NoElement)?;

    let container = factory
        .pipeline_container()
        .unwrap_or_else(|| Arc::new(PipelineContainer::new(DEFAULT_PIPELINE_NAME)));
    container.attach(media.id(), &bin);

    Ok(container)
}

/// Mirror the factory's shared flag, then raise `media-configure` and
/// `media-constructed`
pub fn default_configure(factory: &MediaFactory, media: &Arc<Media>) {
    media.set_shared(factory.is_shared());

    factory.media_configure.emit(media);
    factory.media_constructed.emit(media);
}

/// Builds and caches medias for one mount point
pub struct MediaFactory {
    config: Mutex<FactoryConfig>,
    hooks: Box<dyn FactoryHooks>,
    cache: MediaCache,
    media_configure: Signal<Arc<Media>>,
    media_constructed: Signal<Arc<Media>>,
}

impl MediaFactory {
    /// Create a factory using the default stages
    pub fn new(config: FactoryConfig) -> Arc<Self> {
        Self::with_hooks(config, DefaultHooks)
    }

    /// Create a factory with custom stages
    pub fn with_hooks(config: FactoryConfig, hooks: impl FactoryHooks + 'static) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
            hooks: Box::new(hooks),
            cache: MediaCache::new(),
            media_configure: Signal::new(),
            media_constructed: Signal::new(),
        })
    }

    /// Snapshot of the configuration
    pub fn config(&self) -> FactoryConfig {
        self.config.lock().clone()
    }

    pub fn set_launch(&self, launch: impl Into<String>) {
        self.config.lock().launch = Some(launch.into());
    }

    pub fn launch(&self) -> Option<String> {
        self.config.lock().launch.clone()
    }

    pub fn set_shared(&self, shared: bool) {
        self.config.lock().shared = shared;
    }

    pub fn is_shared(&self) -> bool {
        self.config.lock().shared
    }

    pub fn set_eos_shutdown(&self, eos_shutdown: bool) {
        self.config.lock().eos_shutdown = eos_shutdown;
    }

    pub fn is_eos_shutdown(&self) -> bool {
        self.config.lock().eos_shutdown
    }

    pub fn set_protocols(&self, protocols: LowerTransport) {
        self.config.lock().protocols = protocols;
    }

    pub fn protocols(&self) -> LowerTransport {
        self.config.lock().protocols
    }

    pub fn set_buffer_size(&self, size: u32) {
        self.config.lock().buffer_size = size;
    }

    pub fn buffer_size(&self) -> u32 {
        self.config.lock().buffer_size
    }

    pub fn set_multicast_group(&self, group: Option<String>) {
        self.config.lock().multicast_group = group;
    }

    pub fn multicast_group(&self) -> Option<String> {
        self.config.lock().multicast_group.clone()
    }

    pub fn set_auth(&self, auth: Option<AuthRef>) {
        self.config.lock().auth = auth;
    }

    pub fn auth(&self) -> Option<AuthRef> {
        self.config.lock().auth.clone()
    }

    pub fn set_pipeline_container(&self, container: Option<Arc<PipelineContainer>>) {
        self.config.lock().pipeline_container = container;
    }

    pub fn pipeline_container(&self) -> Option<Arc<PipelineContainer>> {
        self.config.lock().pipeline_container.clone()
    }

    /// Raised after `configure` applied the factory policy, so observers can
    /// adjust the media
    pub fn media_configure(&self) -> &Signal<Arc<Media>> {
        &self.media_configure
    }

    /// Raised once a media is fully constructed
    pub fn media_constructed(&self) -> &Signal<Arc<Media>> {
        &self.media_constructed
    }

    pub fn connect_media_configure<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&Arc<Media>) + Send + Sync + 'static,
    {
        self.media_configure.connect(f)
    }

    pub fn connect_media_constructed<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&Arc<Media>) + Send + Sync + 'static,
    {
        self.media_constructed.connect(f)
    }

    /// Cache key for `url`
    pub fn gen_key(&self, url: &RtspUrl) -> String {
        self.hooks.gen_key(self, url)
    }

    /// The media cached for `url`, if any, without acquiring a user
    pub fn cached(&self, url: &RtspUrl) -> Option<Arc<Media>> {
        self.cache.get(&self.gen_key(url))
    }

    /// Number of cached medias
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Build or reuse the media for `url`
    ///
    /// The returned media carries one user for the caller, to be given back
    /// with [`Media::release`].
    pub fn construct(self: &Arc<Self>, url: &RtspUrl) -> Result<Arc<Media>, ConstructError> {
        let key = self.hooks.gen_key(self, url);
        let shared = self.is_shared();

        if shared {
            if let Some(media) = self.cache.lookup(&key) {
                tracing::debug!(
                    url = %url,
                    key = %key,
                    media = media.id(),
                    users = media.users(),
                    "Reusing shared media"
                );
                return Ok(media);
            }
        }

        let media = self.build(url)?;
        media.try_acquire();

        if shared && media.is_shared() {
            let cached = self.cache.insert_or_get(&key, &media);

            if !Arc::ptr_eq(&cached, &media) {
                tracing::debug!(
                    key = %key,
                    discarded = media.id(),
                    media = cached.id(),
                    "Concurrent construct won, discarding media"
                );
                media.discard();
                return Ok(cached);
            }

            media.set_stage(BuildStage::Cached);

            if !media.is_reusable() {
                let factory = Arc::downgrade(self);
                let cache_key = key.clone();
                media.connect_unprepared(move |id| {
                    if let Some(factory) = factory.upgrade() {
                        if factory.cache.remove_if(&cache_key, *id) {
                            tracing::debug!(key = %cache_key, media = *id, "Removed media from cache");
                        }
                    }
                });
            }
        }

        tracing::info!(url = %url, media = media.id(), shared, "Constructed media");

        Ok(media)
    }

    fn build(&self, url: &RtspUrl) -> Result<Arc<Media>, ConstructError> {
        let element = self.hooks.get_element(self, url)?;

        let media = Media::new();
        media.set_element(element);

        if let Err(e) = self.finish_build(url, &media) {
            tracing::error!(url = %url, media = media.id(), error = %e, "Media construction failed");
            media.discard();
            return Err(e);
        }

        Ok(media)
    }

    fn finish_build(&self, url: &RtspUrl, media: &Arc<Media>) -> Result<(), ConstructError> {
        self.hooks.collect_streams(self, url, media)?;
        media.set_stage(BuildStage::StreamsCollected);

        let pipeline = self.hooks.create_pipeline(self, media)?;
        if !pipeline.contains(media.id()) {
            let bin = media.element_name().ok_or(ConstructError::NoElement)?;
            pipeline.attach(media.id(), &bin);
        }
        media.set_pipeline(pipeline);

        let config = self.config();
        media.set_eos_shutdown(config.eos_shutdown);
        media.set_buffer_size(config.buffer_size);
        media.set_multicast_group(config.multicast_group);
        media.set_protocols(config.protocols);
        media.set_auth(config.auth);

        self.hooks.configure(self, media);
        media.set_stage(BuildStage::Configured);

        Ok(())
    }
}

impl std::fmt::Debug for MediaFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self.config.lock();
        f.debug_struct("MediaFactory")
            .field("launch", &config.launch)
            .field("shared", &config.shared)
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::media::instance::MediaStatus;
    use crate::media::pipeline::PipelineState;
    use crate::media::ConstructError;

    const LAUNCH: &str = "( videotestsrc ! x264enc ! rtph264pay name=pay0 pt=96 )";

    #[derive(Default)]
    struct CountingHooks {
        get_element: AtomicUsize,
        barrier: Option<Barrier>,
    }

    impl FactoryHooks for Arc<CountingHooks> {
        fn get_element(&self, factory: &MediaFactory, url: &RtspUrl) -> Result<Bin, ConstructError> {
            self.get_element.fetch_add(1, Ordering::SeqCst);
            if let Some(barrier) = &self.barrier {
                barrier.wait();
            }
            default_get_element(factory, url)
        }
    }

    fn counting_factory(config: FactoryConfig) -> (Arc<MediaFactory>, Arc<CountingHooks>) {
        let hooks = Arc::new(CountingHooks::default());
        let factory = MediaFactory::with_hooks(config, Arc::clone(&hooks));
        (factory, hooks)
    }

    fn url(s: &str) -> RtspUrl {
        RtspUrl::parse(s).unwrap()
    }

    #[test]
    fn test_shared_construct_reuses_media() {
        let (factory, hooks) = counting_factory(FactoryConfig::with_launch(LAUNCH).shared(true));
        let u = url("rtsp://h/test");

        let first = factory.construct(&u).unwrap();
        let second = factory.construct(&u).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(hooks.get_element.load(Ordering::SeqCst), 1);
        assert_eq!(first.users(), 2);
        assert_eq!(first.stage(), BuildStage::Cached);
        assert_eq!(factory.cache_len(), 1);
    }

    #[test]
    fn test_unshared_construct_builds_each_time() {
        let (factory, hooks) = counting_factory(FactoryConfig::with_launch(LAUNCH));
        let u = url("rtsp://h/test");

        let first = factory.construct(&u).unwrap();
        let second = factory.construct(&u).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(hooks.get_element.load(Ordering::SeqCst), 2);
        assert_eq!(first.stage(), BuildStage::Configured);
        assert!(!first.is_shared());
        assert_eq!(factory.cache_len(), 0);
    }

    #[test]
    fn test_default_key_includes_query() {
        let factory = MediaFactory::new(FactoryConfig::default());

        let a = factory.gen_key(&url("rtsp://h/test?a=1"));
        let b = factory.gen_key(&url("rtsp://h/test?a=2"));

        assert_ne!(a, b);
        assert_eq!(a, "rtsp://h:554/test?a=1");
    }

    #[test]
    fn test_stamps_factory_config() {
        let config = FactoryConfig::with_launch(LAUNCH)
            .eos_shutdown(true)
            .buffer_size(4096)
            .multicast_group("239.0.0.1")
            .protocols(LowerTransport::TCP);
        let factory = MediaFactory::new(config);

        let media = factory.construct(&url("rtsp://h/test")).unwrap();

        assert!(media.is_eos_shutdown());
        assert_eq!(media.buffer_size(), 4096);
        assert_eq!(media.multicast_group().as_deref(), Some("239.0.0.1"));
        assert_eq!(media.protocols(), LowerTransport::TCP);
        assert_eq!(media.n_streams(), 1);
        assert_eq!(media.stream(0).unwrap().payloader, "pay0");
    }

    #[test]
    fn test_construct_errors() {
        let factory = MediaFactory::new(FactoryConfig::default().shared(true));
        let u = url("rtsp://h/test");

        assert!(matches!(factory.construct(&u), Err(ConstructError::NoLaunch)));

        factory.set_launch("( videotestsrc ! ");
        assert!(matches!(factory.construct(&u), Err(ConstructError::Launch(_))));

        factory.set_launch("videotestsrc ! fakesink");
        assert!(matches!(factory.construct(&u), Err(ConstructError::NoStreams)));

        assert_eq!(factory.cache_len(), 0);
    }

    #[test]
    fn test_collect_streams_stops_at_gap() {
        let factory = MediaFactory::new(FactoryConfig::with_launch(
            "src0 ! rtpvrawpay name=pay0 src1 ! rtpL16pay name=pay3 src2 ! rtpbin name=dynpay1",
        ));

        let media = factory.construct(&url("rtsp://h/test")).unwrap();

        assert_eq!(media.n_streams(), 1);
        assert_eq!(media.dynamic(), vec!["dynpay1".to_string()]);
    }

    #[test]
    fn test_notifications_in_order_and_can_adjust_media() {
        let factory = MediaFactory::new(FactoryConfig::with_launch(LAUNCH).shared(true));
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        factory.connect_media_configure(move |media| {
            o.lock().push("configure");
            media.set_shared(false);
        });
        let o = Arc::clone(&order);
        factory.connect_media_constructed(move |_| o.lock().push("constructed"));

        let u = url("rtsp://h/test");
        let first = factory.construct(&u).unwrap();
        let second = factory.construct(&u).unwrap();

        assert_eq!(*order.lock(), vec!["configure", "constructed", "configure", "constructed"]);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(factory.cache_len(), 0);
    }

    #[test]
    fn test_release_removes_cache_entry() {
        let (factory, hooks) = counting_factory(FactoryConfig::with_launch(LAUNCH).shared(true));
        let u = url("rtsp://h/test");

        let first = factory.construct(&u).unwrap();
        let again = factory.construct(&u).unwrap();
        again.release();
        assert_eq!(factory.cache_len(), 1);

        first.release();
        assert_eq!(first.status(), MediaStatus::TornDown);
        assert_eq!(factory.cache_len(), 0);

        let fresh = factory.construct(&u).unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(hooks.get_element.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reusable_media_stays_cached() {
        let factory = MediaFactory::new(FactoryConfig::with_launch(LAUNCH).shared(true));
        factory.connect_media_configure(|media| media.set_reusable(true));
        let u = url("rtsp://h/test");

        let first = factory.construct(&u).unwrap();
        first.prepare().unwrap();
        first.release();

        let second = factory.construct(&u).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        second.prepare().unwrap();
    }

    #[test]
    fn test_shared_pipeline_container() {
        let container = Arc::new(PipelineContainer::new("shared-pipeline"));
        let factory = MediaFactory::new(
            FactoryConfig::with_launch(LAUNCH).pipeline_container(Arc::clone(&container)),
        );

        let a = factory.construct(&url("rtsp://h/a")).unwrap();
        let b = factory.construct(&url("rtsp://h/b")).unwrap();

        assert_eq!(container.len(), 2);
        assert!(Arc::ptr_eq(&a.pipeline().unwrap(), &b.pipeline().unwrap()));

        a.prepare().unwrap();
        a.release();
        assert_eq!(container.len(), 1);
        assert_eq!(container.state(), PipelineState::Null);
    }

    #[test]
    fn test_custom_key_chains_default() {
        struct PathOnly;

        impl FactoryHooks for PathOnly {
            fn gen_key(&self, factory: &MediaFactory, url: &RtspUrl) -> String {
                let key = default_gen_key(factory, url);
                key.split('?').next().unwrap_or_default().to_string()
            }
        }

        let factory = MediaFactory::with_hooks(FactoryConfig::with_launch(LAUNCH).shared(true), PathOnly);

        let a = factory.construct(&url("rtsp://h/test?a=1")).unwrap();
        let b = factory.construct(&url("rtsp://h/test?a=2")).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_concurrent_construct_keeps_one_cached_media() {
        let hooks = Arc::new(CountingHooks {
            get_element: AtomicUsize::new(0),
            barrier: Some(Barrier::new(2)),
        });
        let factory =
            MediaFactory::with_hooks(FactoryConfig::with_launch(LAUNCH).shared(true), Arc::clone(&hooks));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let factory = Arc::clone(&factory);
                thread::spawn(move || factory.construct(&url("rtsp://h/test")).unwrap())
            })
            .collect();

        let medias: Vec<Arc<Media>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(hooks.get_element.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&medias[0], &medias[1]));
        assert_eq!(medias[0].users(), 2);
        assert_eq!(factory.cache_len(), 1);

        let cached = factory.cached(&url("rtsp://h/test")).unwrap();
        assert!(Arc::ptr_eq(&cached, &medias[0]));
    }
}
