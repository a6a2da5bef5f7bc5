//! In-memory upgrade of persisted configuration written by older releases.
//!
//! Container configuration is persisted on the remote resource in the
//! guest-visible key namespace. Older releases wrote keys under a bare
//! `gantry.` prefix; the current schema namespaces them under
//! `guestinfo.gantry.`. A snapshot loaded from an older-schema resource is
//! upgraded in memory so this process can work with one shape, but the
//! upgraded form must never be written back: an older consumer still reading
//! the resource cannot parse it. The commit path withholds the guest-visible
//! payload on reconfigure when [`migrate_config`] reports an upgrade.

use tracing::debug;

use crate::vm::VmConfig;

/// The configuration schema this release reads and writes.
pub const DATA_VERSION: u32 = 2;

const LEGACY_KEY_PREFIX: &str = "gantry.";
const KEY_PREFIX: &str = "guestinfo.gantry.";

/// Upgrades an older-schema config snapshot in place.
///
/// Returns `true` when the snapshot was produced by an older schema and has
/// been upgraded; callers use this to mark the configuration as migrated.
pub fn migrate_config(config: &mut VmConfig) -> bool {
    if config.schema_version >= DATA_VERSION {
        return false;
    }

    let legacy_keys: Vec<String> = config
        .extra_config
        .keys()
        .filter(|key| key.starts_with(LEGACY_KEY_PREFIX))
        .cloned()
        .collect();

    for key in legacy_keys {
        if let Some(value) = config.extra_config.remove(&key) {
            let renamed = format!("{KEY_PREFIX}{}", &key[LEGACY_KEY_PREFIX.len()..]);
            config.extra_config.insert(renamed, value);
        }
    }

    debug!(
        from = config.schema_version,
        to = DATA_VERSION,
        "upgraded config schema in memory"
    );
    config.schema_version = DATA_VERSION;
    true
}
