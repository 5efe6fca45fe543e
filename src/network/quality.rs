//! Network quality classification.
//!
//! A [`PathStatus`] is the raw reachability snapshot reported by the host
//! platform. [`classify`] reduces it to one [`NetworkQuality`] value.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// NetworkQuality
// ============================================================================

/// Current reachability, reduced to a small set of classes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    /// Wired link.
    Ethernet,
    /// Unconstrained wireless link.
    Wifi,
    /// Expensive, constrained link.
    Cellular,
    /// Path exists but needs a connection to be established first.
    Limited,
    /// No usable path.
    Offline,
    /// Not yet classified or unrecognised interface.
    #[default]
    Unknown,
}

impl fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Cellular => "cellular",
            Self::Limited => "limited",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

// ============================================================================
// PathStatus
// ============================================================================

/// Whether the current path can carry traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathAvailability {
    /// Traffic can flow.
    Satisfied,
    /// No route.
    Unsatisfied,
    /// A connection (VPN, captive portal, dial-up) must be brought up first.
    RequiresConnection,
}

/// Interface carrying the current path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    /// Wired ethernet.
    Ethernet,
    /// Wi-Fi.
    Wifi,
    /// Mobile data.
    Cellular,
    /// Loopback only.
    Loopback,
    /// Anything else.
    Other,
}

/// Raw reachability snapshot from the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathStatus {
    /// Path availability.
    pub availability: PathAvailability,
    /// Interface in use.
    pub interface: InterfaceKind,
    /// Metered link.
    pub is_expensive: bool,
    /// Low-data mode or similar restriction.
    pub is_constrained: bool,
}

impl PathStatus {
    /// A satisfied path over the given interface, unmetered.
    #[inline]
    #[must_use]
    pub const fn satisfied(interface: InterfaceKind) -> Self {
        Self {
            availability: PathAvailability::Satisfied,
            interface,
            is_expensive: false,
            is_constrained: false,
        }
    }

    /// An expensive, constrained cellular path.
    #[inline]
    #[must_use]
    pub const fn cellular() -> Self {
        Self {
            availability: PathAvailability::Satisfied,
            interface: InterfaceKind::Cellular,
            is_expensive: true,
            is_constrained: true,
        }
    }

    /// No usable path.
    #[inline]
    #[must_use]
    pub const fn offline() -> Self {
        Self {
            availability: PathAvailability::Unsatisfied,
            interface: InterfaceKind::Other,
            is_expensive: false,
            is_constrained: false,
        }
    }

    /// A path that has not been classified yet.
    #[inline]
    #[must_use]
    pub const fn unknown() -> Self {
        Self::satisfied(InterfaceKind::Other)
    }

    /// Returns the builder-style copy with the metering flags set.
    #[inline]
    #[must_use]
    pub const fn with_flags(mut self, is_expensive: bool, is_constrained: bool) -> Self {
        self.is_expensive = is_expensive;
        self.is_constrained = is_constrained;
        self
    }
}

impl Default for PathStatus {
    fn default() -> Self {
        Self::unknown()
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classifies a path snapshot.
///
/// Availability wins over interface: an unsatisfied path is offline no
/// matter which interface reported it.
#[must_use]
pub fn classify(path: &PathStatus) -> NetworkQuality {
    match path.availability {
        PathAvailability::Unsatisfied => return NetworkQuality::Offline,
        PathAvailability::RequiresConnection => return NetworkQuality::Limited,
        PathAvailability::Satisfied => {}
    }

    if path.is_expensive && path.is_constrained {
        return NetworkQuality::Cellular;
    }

    match path.interface {
        InterfaceKind::Wifi if !path.is_constrained => NetworkQuality::Wifi,
        InterfaceKind::Ethernet if !path.is_constrained => NetworkQuality::Ethernet,
        InterfaceKind::Cellular => NetworkQuality::Cellular,
        _ => NetworkQuality::Unknown,
    }
}

// ============================================================================
// Tests
// ============================================================================
