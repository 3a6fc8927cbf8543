//! Permission flags and allowed/denied permission sets.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Individual permission flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
    pub struct Permissions: u32 {
        const READ = 1;
        const WRITE = 2;
        const VIEW = 4;
        const CONTROL = 8;
        const DIRECT_PUBLISH = 16;
    }
}

const SYMBOLS: [(Permissions, char); 5] = [
    (Permissions::READ, 'r'),
    (Permissions::WRITE, 'w'),
    (Permissions::VIEW, 'v'),
    (Permissions::CONTROL, 'c'),
    (Permissions::DIRECT_PUBLISH, 'd'),
];

impl Permissions {
    /// Whether a write-class permission (WRITE or CONTROL) is included.
    pub fn requires_write_access(self) -> bool {
        self.intersects(Self::WRITE | Self::CONTROL)
    }

    /// Short symbolic form, e.g. `rw` for READ | WRITE.
    pub fn symbols(self) -> String {
        SYMBOLS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, c)| *c)
            .collect()
    }
}

/// A pair of allowed and denied permission masks.
///
/// The effective permissions are `allowed & !denied`, so a denial always wins over an
/// allowance held in the same set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PermissionSet {
    pub allowed: Permissions,
    pub denied: Permissions,
}

impl PermissionSet {
    /// Nothing allowed, nothing denied.
    pub const EMPTY: Self = Self::new(Permissions::empty(), Permissions::empty());
    /// Every permission allowed.
    pub const ALL: Self = Self::new(Permissions::all(), Permissions::empty());

    pub const ACCESS_READ: Self = Self::allowing(Permissions::READ);
    pub const ACCESS_WRITE: Self = Self::allowing(Permissions::WRITE);
    pub const ACCESS_VIEW: Self = Self::allowing(Permissions::VIEW);
    pub const ACCESS_CONTROL: Self = Self::allowing(Permissions::CONTROL);
    pub const ACCESS_DIRECT_PUBLISH: Self = Self::allowing(Permissions::DIRECT_PUBLISH);

    pub const fn new(allowed: Permissions, denied: Permissions) -> Self {
        Self { allowed, denied }
    }

    pub const fn allowing(allowed: Permissions) -> Self {
        Self::new(allowed, Permissions::empty())
    }

    pub const fn denying(denied: Permissions) -> Self {
        Self::new(Permissions::empty(), denied)
    }

    /// Effective permissions after applying the denials.
    pub fn permissions(&self) -> Permissions {
        self.allowed.difference(self.denied)
    }

    /// Allows the flags and lifts any denial of them.
    pub fn grant(&mut self, permissions: Permissions) {
        self.allowed.insert(permissions);
        self.denied.remove(permissions);
    }

    /// Adds denied flags.
    pub fn deny(&mut self, permissions: Permissions) {
        self.denied.insert(permissions);
    }

    /// Merges two sets of the same precedence level: allowances and denials are unioned,
    /// so a denial from either side wins.
    pub fn union(self, other: Self) -> Self {
        Self::new(self.allowed | other.allowed, self.denied | other.denied)
    }

    /// Lays a nearer set over this one.
    ///
    /// Every flag the nearer set mentions (allowed or denied) replaces this set's decision
    /// for that flag; unmentioned flags keep their farther decision.
    pub fn overlay(self, nearer: Self) -> Self {
        let mentioned = nearer.allowed | nearer.denied;
        let allowed = self.allowed.difference(mentioned) | nearer.allowed.difference(nearer.denied);
        let denied = self.denied.difference(mentioned) | nearer.denied;
        Self::new(allowed, denied)
    }

    /// Whether every flag of `required` is effectively granted.
    pub fn satisfies(&self, required: Permissions) -> bool {
        self.permissions().contains(required)
    }

    /// Renders the set as `+r+w-v` style notation.
    pub fn permission_string(&self) -> String {
        let mut out = String::new();
        for (flag, symbol) in SYMBOLS {
            if self.denied.contains(flag) {
                out.push('-');
                out.push(symbol);
            } else if self.allowed.contains(flag) {
                out.push('+');
                out.push(symbol);
            }
        }
        out
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.permission_string())
    }
}

impl From<Permissions> for PermissionSet {
    fn from(allowed: Permissions) -> Self {
        Self::allowing(allowed)
    }
}
