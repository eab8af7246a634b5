//! Element graphs and pipeline containers
//!
//! A [`Bin`] is the element graph of one media. A [`PipelineContainer`] is the
//! execution container bins are attached to. Several medias may share one
//! container; the container runs while at least one attached member is
//! active.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Default name of a container created for a single media
pub const DEFAULT_PIPELINE_NAME: &str = "media-pipeline";

/// A processing node in a bin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    kind: String,
    name: String,
    properties: Vec<(String, String)>,
}

impl Element {
    /// Create an element of type `kind` named `name`
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Element type name
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Element name, unique within its bin
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a property, replacing any previous value
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((key, value)),
        }
    }

    /// Get a property value
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All properties in declaration order
    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }
}

/// A link between two elements of a bin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub src: String,
    pub sink: String,
}

/// A named graph of elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    name: String,
    elements: Vec<Element>,
    links: Vec<Link>,
}

impl Bin {
    /// Create an empty bin
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Bin name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an element
    pub fn add(&mut self, element: Element) {
        self.elements.push(element);
    }

    /// Link two elements by name
    pub fn link(&mut self, src: impl Into<String>, sink: impl Into<String>) {
        self.links.push(Link {
            src: src.into(),
            sink: sink.into(),
        });
    }

    /// Find an element by name
    pub fn by_name(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Elements in insertion order
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Links in declaration order
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the bin has no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Running state of a pipeline container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No member is active
    Null,
    /// At least one member is active
    Playing,
}

#[derive(Debug)]
struct Member {
    owner: u64,
    bin: String,
    active: bool,
}

/// Execution container holding the bins of one or more medias
#[derive(Debug)]
pub struct PipelineContainer {
    id: u64,
    name: String,
    members: Mutex<Vec<Member>>,
}

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

impl PipelineContainer {
    /// Create an empty container
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            members: Mutex::new(Vec::new()),
        }
    }

    /// Unique container id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Container name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach the bin of media `owner`. Attaching an owner twice is a no-op.
    pub fn attach(&self, owner: u64, bin: &str) {
        let mut members = self.members.lock();
        if members.iter().any(|m| m.owner == owner) {
            return;
        }
        members.push(Member {
            owner,
            bin: bin.to_string(),
            active: false,
        });
        tracing::trace!(pipeline = %self.name, owner, bin, "Bin attached");
    }

    /// Detach the bin of media `owner`. Returns false if it was not attached.
    pub fn detach(&self, owner: u64) -> bool {
        let mut members = self.members.lock();
        let before = members.len();
        members.retain(|m| m.owner != owner);
        let removed = members.len() != before;
        if removed {
            tracing::trace!(pipeline = %self.name, owner, "Bin detached");
        }
        removed
    }

    /// Mark an attached member active or inactive
    pub fn set_active(&self, owner: u64, active: bool) -> bool {
        let mut members = self.members.lock();
        match members.iter_mut().find(|m| m.owner == owner) {
            Some(member) => {
                member.active = active;
                true
            }
            None => false,
        }
    }

    /// Whether `owner` is attached
    pub fn contains(&self, owner: u64) -> bool {
        self.members.lock().iter().any(|m| m.owner == owner)
    }

    /// Names of the attached bins
    pub fn bins(&self) -> Vec<String> {
        self.members.lock().iter().map(|m| m.bin.clone()).collect()
    }

    /// Number of attached members
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// Whether nothing is attached
    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Current state, derived from the members
    pub fn state(&self) -> PipelineState {
        if self.members.lock().iter().any(|m| m.active) {
            PipelineState::Playing
        } else {
            PipelineState::Null
        }
    }
}
