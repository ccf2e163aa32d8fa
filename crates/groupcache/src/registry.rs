// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Registration of named groups and the hooks that run around their creation.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::mem;
use std::sync::{Arc, OnceLock};

use foldhash::fast::RandomState;
use parking_lot::{Mutex, RwLock};

use crate::cache::{PolicyKind, ValueCache};
use crate::group::{Getter, Group, GroupConfig, PeerSource};
use crate::peers::{GetRequest, GetResponse, PeerPicker};
use crate::{Error, Result};

/// Default number of entries in a group's main cache.
pub const DEFAULT_MAIN_CAPACITY: usize = 1024;

/// Default number of entries in a group's hot cache.
pub const DEFAULT_HOT_CAPACITY: usize = 128;

/// Default `n` in the 1-in-`n` chance of mirroring a peer's value into the hot cache.
pub const DEFAULT_HOT_PROMOTION_RATIO: u32 = 10;

pub(crate) type PickerFactory = Box<dyn Fn(&str) -> Arc<dyn PeerPicker> + Send + Sync>;
type NewGroupHook = Box<dyn Fn(&Arc<Group>) + Send + Sync>;
type ServerStartHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
enum ServerStart {
    #[default]
    Unregistered,
    Pending(ServerStartHook),
    Registered,
}

#[derive(Default)]
struct Startup {
    hook: ServerStart,
    started: bool,
}

/// The set of groups known to a process, plus its peer configuration.
///
/// A registry is usually created once at startup and shared. Group names are unique within a
/// registry and groups are never removed.
///
/// # Examples
///
/// ```
/// use groupcache::{BoxError, Error, GetterFn, GroupRegistry, PolicyKind};
///
/// let registry = GroupRegistry::new();
/// let getter = || GetterFn::new(|key: String| async move { Ok::<_, BoxError>(key) });
///
/// let group = registry
///     .group_builder("users", getter())
///     .main_capacity(10_000)
///     .hot_capacity(1_000)
///     .policy(PolicyKind::Lru)
///     .build()?;
/// assert_eq!(group.name(), "users");
///
/// assert!(matches!(registry.new_group("users", 10, getter()), Err(Error::DuplicateGroup(_))));
/// assert_eq!(registry.groups(), ["users"]);
/// # Ok::<(), Error>(())
/// ```
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>, RandomState>>,
    picker_factory: Arc<OnceLock<PickerFactory>>,
    new_group_hook: OnceLock<NewGroupHook>,
    startup: Mutex<Startup>,
}

impl GroupRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts configuring a group named `name` that loads missing keys with `getter`.
    pub fn group_builder(&self, name: impl Into<String>, getter: impl Getter + 'static) -> GroupBuilder<'_> {
        GroupBuilder {
            registry: self,
            name: name.into(),
            getter: Arc::new(getter),
            main_capacity: DEFAULT_MAIN_CAPACITY,
            hot_capacity: DEFAULT_HOT_CAPACITY,
            policy: PolicyKind::default(),
            hot_promotion_ratio: DEFAULT_HOT_PROMOTION_RATIO,
            peer_picker: None,
        }
    }

    /// Creates a group with default settings and a main cache of `main_capacity` entries.
    ///
    /// The default policy is [`PolicyKind::Adaptive`], under which a capacity of zero holds a
    /// single entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateGroup`] if the name is taken.
    pub fn new_group(&self, name: impl Into<String>, main_capacity: usize, getter: impl Getter + 'static) -> Result<Arc<Group>> {
        self.group_builder(name, getter).main_capacity(main_capacity).build()
    }

    /// Returns the group named `name`, if any.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Returns the names of all groups, sorted.
    #[must_use]
    pub fn groups(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Sets the factory that gives each group without an explicit picker its peers.
    ///
    /// The factory is consulted lazily, on a group's first lookup, so it may be registered
    /// after groups have been created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConfigured`] if a factory was already registered.
    pub fn register_peer_picker(&self, factory: impl Fn(&str) -> Arc<dyn PeerPicker> + Send + Sync + 'static) -> Result<()> {
        self.picker_factory
            .set(Box::new(factory))
            .or(Err(Error::AlreadyConfigured("peer picker")))
    }

    /// Sets a hook invoked with every group created from now on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConfigured`] if a hook was already registered.
    pub fn register_new_group_hook(&self, hook: impl Fn(&Arc<Group>) + Send + Sync + 'static) -> Result<()> {
        self.new_group_hook
            .set(Box::new(hook))
            .or(Err(Error::AlreadyConfigured("new group hook")))
    }

    /// Sets a hook that starts this process's peer server.
    ///
    /// The hook runs once, when the first group is created. If a group already exists, it runs
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConfigured`] if a hook was already registered.
    pub fn register_server_start(&self, hook: impl FnOnce() + Send + 'static) -> Result<()> {
        let mut startup = self.startup.lock();
        if !matches!(startup.hook, ServerStart::Unregistered) {
            return Err(Error::AlreadyConfigured("server start hook"));
        }

        if startup.started {
            startup.hook = ServerStart::Registered;
            drop(startup);
            hook();
        } else {
            startup.hook = ServerStart::Pending(Box::new(hook));
        }
        Ok(())
    }

    /// Routes a peer request to the group it names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchGroup`] for an unknown group, otherwise whatever the group's
    /// [`serve`](Group::serve) returns.
    pub async fn serve(&self, request: &GetRequest) -> Result<GetResponse> {
        let group = self
            .group(&request.group)
            .ok_or_else(|| Error::NoSuchGroup(request.group.clone()))?;
        group.serve(request).await
    }

    fn insert(&self, group: Group) -> Result<Arc<Group>> {
        let group = {
            let mut groups = self.groups.write();
            if groups.contains_key(group.name()) {
                return Err(Error::DuplicateGroup(group.name().to_owned()));
            }
            let group = Arc::new(group);
            groups.insert(group.name().to_owned(), Arc::clone(&group));
            group
        };

        self.start_server_once();

        tracing::event!(
            name: "groupcache.group.created",
            tracing::Level::INFO,
            group.name = group.name(),
        );

        if let Some(hook) = self.new_group_hook.get() {
            hook(&group);
        }
        Ok(group)
    }

    fn start_server_once(&self) {
        let hook = {
            let mut startup = self.startup.lock();
            if startup.started {
                return;
            }
            startup.started = true;
            match mem::take(&mut startup.hook) {
                ServerStart::Pending(hook) => {
                    startup.hook = ServerStart::Registered;
                    Some(hook)
                }
                other => {
                    startup.hook = other;
                    None
                }
            }
        };

        if let Some(hook) = hook {
            hook();
        }
    }
}

impl Debug for GroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("groups", &self.groups())
            .field("has_peer_picker", &self.picker_factory.get().is_some())
            .finish_non_exhaustive()
    }
}

/// Configures a group before adding it to its registry.
///
/// Created by [`GroupRegistry::group_builder`].
pub struct GroupBuilder<'a> {
    registry: &'a GroupRegistry,
    name: String,
    getter: Arc<dyn Getter>,
    main_capacity: usize,
    hot_capacity: usize,
    policy: PolicyKind,
    hot_promotion_ratio: u32,
    peer_picker: Option<Arc<dyn PeerPicker>>,
}

impl GroupBuilder<'_> {
    /// Sets the number of entries in the main cache, which holds keys this process owns.
    ///
    /// A capacity of zero means unbounded under [`PolicyKind::Lru`]. An adaptive cache needs
    /// a bound, so under [`PolicyKind::Adaptive`] zero holds a single entry.
    #[must_use]
    pub fn main_capacity(mut self, capacity: usize) -> Self {
        self.main_capacity = capacity;
        self
    }

    /// Sets the number of entries in the hot cache, which mirrors popular remote keys.
    ///
    /// Zero is treated as for [`main_capacity`](Self::main_capacity).
    #[must_use]
    pub fn hot_capacity(mut self, capacity: usize) -> Self {
        self.hot_capacity = capacity;
        self
    }

    /// Sets the eviction policy of both caches.
    #[must_use]
    pub fn policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Mirrors a value fetched from a peer into the hot cache with probability `1 / ratio`.
    ///
    /// A ratio of `1` mirrors every value; `0` never does.
    #[must_use]
    pub fn hot_promotion_ratio(mut self, ratio: u32) -> Self {
        self.hot_promotion_ratio = ratio;
        self
    }

    /// Uses `picker` for this group instead of the registry's factory.
    #[must_use]
    pub fn peer_picker(mut self, picker: Arc<dyn PeerPicker>) -> Self {
        self.peer_picker = Some(picker);
        self
    }

    /// Creates the group and registers it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateGroup`] if the name is taken.
    pub fn build(self) -> Result<Arc<Group>> {
        let peer_source = match self.peer_picker {
            Some(picker) => PeerSource::Explicit(picker),
            None => PeerSource::Registry(Arc::clone(&self.registry.picker_factory)),
        };

        self.registry.insert(Group::new(GroupConfig {
            name: self.name,
            getter: self.getter,
            main_cache: ValueCache::new(self.policy, self.main_capacity),
            hot_cache: ValueCache::new(self.policy, self.hot_capacity),
            hot_promotion_ratio: self.hot_promotion_ratio,
            peer_source,
        }))
    }
}

impl Debug for GroupBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupBuilder")
            .field("name", &self.name)
            .field("main_capacity", &self.main_capacity)
            .field("hot_capacity", &self.hot_capacity)
            .field("policy", &self.policy)
            .field("hot_promotion_ratio", &self.hot_promotion_ratio)
            .finish_non_exhaustive()
    }
}
