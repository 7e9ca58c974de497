//! Symbolic zone and OS identifiers
//!
//! The cluster document names zones and operating systems symbolically
//! (`"NEW_JERSEY"`, `"COREOS"`); the provider API wants numeric codes. An
//! unresolved symbol substitutes a documented default with a warning instead
//! of failing the whole batch.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::warn;

/// Zone used when a symbolic zone cannot be resolved
pub const DEFAULT_ZONE: &str = "NEW_JERSEY";

/// OS used when a symbolic OS cannot be resolved
pub const DEFAULT_OS: &str = "COREOS";

static ZONES: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("NEW_JERSEY", 1),
        ("CHICAGO", 2),
        ("DALLAS", 3),
        ("SEATTLE", 4),
        ("LOS_ANGELES", 5),
        ("ATLANTA", 6),
        ("AMSTERDAM", 7),
        ("LONDON", 8),
        ("FRANKFURT", 9),
        ("SILICON_VALLEY", 12),
        ("SYDNEY", 19),
        ("PARIS", 24),
        ("TOKYO", 25),
        ("MIAMI", 39),
        ("SINGAPORE", 40),
    ])
});

static OPERATING_SYSTEMS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("CENTOS_6", 127),
        ("DEBIAN_7", 139),
        ("UBUNTU_14_04", 160),
        ("COREOS", 179),
        ("DEBIAN_8", 193),
        ("UBUNTU_16_04", 215),
        ("FEDORA_25", 233),
        ("UBUNTU_17_04", 241),
        ("DEBIAN_9", 244),
        ("FEDORA_26", 245),
    ])
});

/// Resolve a symbolic zone to its provider code, falling back to
/// [`DEFAULT_ZONE`] with a warning when the symbol is unknown.
pub fn resolve_zone(symbol: &str) -> u32 {
    match ZONES.get(symbol) {
        Some(code) => *code,
        None => {
            warn!(zone = %symbol, fallback = DEFAULT_ZONE, "unsupported zone, using default");
            ZONES[DEFAULT_ZONE]
        }
    }
}

/// Resolve a symbolic OS to its provider code, falling back to
/// [`DEFAULT_OS`] with a warning when the symbol is unknown.
pub fn resolve_os(symbol: &str) -> u32 {
    match OPERATING_SYSTEMS.get(symbol) {
        Some(code) => *code,
        None => {
            warn!(os = %symbol, fallback = DEFAULT_OS, "unsupported OS, using default");
            OPERATING_SYSTEMS[DEFAULT_OS]
        }
    }
}
