//! Client capabilities
//!
//! Privilege lookup itself lives outside the hub: a [`PermissionChecker`]
//! turns the peer credentials of a connection into a [`Permission`] mask.

use std::collections::HashMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Capability bitmask of a client, or requirement of a sensor
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Permission: u32 {
        /// Ordinary motion and environment sensors
        const STANDARD = 1 << 0;
        /// Body and health related sensors
        const BIO = 1 << 1;
        /// Sensors that reveal device location or heading
        const LOCATION = 1 << 2;
    }
}

impl Permission {
    /// Whether `self` grants everything `required` asks for
    pub fn allows(&self, required: Permission) -> bool {
        self.contains(required)
    }
}

/// Resolve the capabilities of a connecting process
pub trait PermissionChecker: Send + Sync {
    fn permissions(&self, pid: u32, uid: u32) -> Permission;
}

/// Grants the same mask to everyone, with per-uid overrides
#[derive(Debug, Clone)]
pub struct StaticPermissions {
    default: Permission,
    per_uid: HashMap<u32, Permission>,
}

impl StaticPermissions {
    pub fn new(default: Permission) -> Self {
        Self {
            default,
            per_uid: HashMap::new(),
        }
    }

    /// Grant every capability to everyone
    pub fn allow_all() -> Self {
        Self::new(Permission::all())
    }

    /// Override the mask of one uid
    pub fn with_uid(mut self, uid: u32, permission: Permission) -> Self {
        self.per_uid.insert(uid, permission);
        self
    }
}

impl Default for StaticPermissions {
    fn default() -> Self {
        Self::new(Permission::STANDARD)
    }
}

impl PermissionChecker for StaticPermissions {
    fn permissions(&self, _pid: u32, uid: u32) -> Permission {
        self.per_uid.get(&uid).copied().unwrap_or(self.default)
    }
}
