// Copyright 2024 The farcall contributors
// This file is part of the farcall library.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:

// http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    any::Any,
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use farcall_channel::HostPort;
use parking_lot::RwLock;

/// A shared handle to a live local object; the runtime treats the concrete
/// type as opaque and leaves downcasting to the host's invocation handler.
pub type LocalObject = Arc<dyn Any + Send + Sync>;

/// The address book of live local objects a service exposes to peers.
///
/// Addresses are minted sequentially and never reused within a service; the
/// paired service UUID protects against a peer replaying addresses across
/// service generations.
#[derive(Default)]
pub struct ObjectRegistry {
    objects: RwLock<HashMap<u64, LocalObject>>,
    next_address: AtomicU64,
}

impl ObjectRegistry {
    /// Initializes an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an object and returns its freshly minted address.
    pub fn register(&self, object: LocalObject) -> u64 {
        let address = self.next_address.fetch_add(1, Ordering::Relaxed);
        self.objects.write().insert(address, object);
        address
    }

    /// Returns the object at `address`, if it is still registered.
    pub fn get(&self, address: u64) -> Option<LocalObject> {
        self.objects.read().get(&address).cloned()
    }

    /// Returns `true` if an object is registered at `address`.
    pub fn contains(&self, address: u64) -> bool {
        self.objects.read().contains_key(&address)
    }

    /// Removes the object at `address`, returning `true` if one was there.
    pub fn remove(&self, address: u64) -> bool {
        self.objects.write().remove(&address).is_some()
    }

    /// Returns the number of registered objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns `true` if no objects are registered.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Drops every registered object; used when the owning service is
    /// invalidated.
    pub fn clear(&self) {
        self.objects.write().clear();
    }
}

/// The `name → host port` table a service keeps for peers that registered
/// themselves via a `NameRegister` request.
#[derive(Default)]
pub struct NamingRegistry {
    names: RwLock<HashMap<String, HostPort>>,
}

impl NamingRegistry {
    /// Initializes an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name → host_port`, returning `false` if the name is already
    /// taken by a different host port.
    pub fn register(&self, name: &str, host_port: HostPort) -> bool {
        let mut names = self.names.write();
        match names.get(name) {
            Some(existing) => *existing == host_port,
            None => {
                names.insert(name.to_string(), host_port);
                true
            }
        }
    }

    /// Resolves a name to the registered host port.
    pub fn resolve(&self, name: &str) -> Option<HostPort> {
        self.names.read().get(name).cloned()
    }

    /// Forgets a name, returning `true` if it was registered.
    pub fn remove(&self, name: &str) -> bool {
        self.names.write().remove(name).is_some()
    }
}
