//! Input device discovery and classification
//!
//! Candidate character devices are enumerated from the input device
//! directory and classified from sysfs-style metadata: a plain-text device
//! name and hex-encoded capability bitmasks. Anything whose name marks it as
//! a non-pointer/non-keyboard device class is skipped outright; the rest are
//! classified by declared capabilities, with a name-substring heuristic and
//! the legacy aggregate pointer device as fallbacks.
//!
//! Finding no device at all is non-fatal: the capture component keeps
//! running with whatever was found (keyboard-only operation must remain
//! usable) and surfaces the gap as a fault.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::input::event::{REL_X, REL_Y};
use crate::{InjectorError, Result};

/// Default input device directory.
pub const DEV_INPUT_DIR: &str = "/dev/input";
/// Default sysfs metadata root for input devices.
pub const SYS_INPUT_DIR: &str = "/sys/class/input";
/// Legacy aggregate pointer device, last-resort fallback.
pub const LEGACY_POINTER_DEVICE: &str = "mice";

/// Device-class name fragments that are never pointers or keyboards.
const NAME_DENYLIST: [&str; 7] =
    ["button", "switch", "sensor", "video bus", "power", "lid", "sleep"];

/// Minimum number of declared key bits before a device counts as a
/// keyboard. Single-purpose button devices declare a handful; real
/// keyboards declare well over a hundred.
const KEYBOARD_KEY_THRESHOLD: u32 = 64;

/// Capability metadata for one candidate device.
#[derive(Debug, Clone)]
pub struct DeviceMeta {
    pub path: PathBuf,
    pub name: String,
    pub rel_mask: Vec<u64>,
    pub key_mask: Vec<u64>,
}

/// Outcome of a discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredDevices {
    pub pointer: Option<PathBuf>,
    pub keyboard: Option<PathBuf>,
}

/// Parse a sysfs hex-encoded capability bitmask.
///
/// Sysfs prints whitespace-separated 64-bit words, most significant first;
/// the returned vector is indexed least-significant-word-first so bit `n`
/// lives in word `n / 64`.
pub fn parse_hex_bitmask(text: &str) -> Result<Vec<u64>> {
    let mut words = Vec::new();
    for word in text.split_whitespace() {
        let parsed = u64::from_str_radix(word, 16).map_err(|e| {
            InjectorError::parse_error("capability bitmask", format!("bad hex word '{word}': {e}"))
        })?;
        words.push(parsed);
    }
    words.reverse();
    Ok(words)
}

/// Whether bit `bit` is set in a least-significant-word-first mask.
pub fn bit_set(mask: &[u64], bit: u16) -> bool {
    let bit = bit as usize;
    mask.get(bit / 64).is_some_and(|word| (word >> (bit % 64)) & 1 == 1)
}

/// Whether the declared name marks a device class we never want, no matter
/// what its bitmasks claim.
pub fn is_denylisted(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    NAME_DENYLIST.iter().any(|fragment| lower.contains(fragment))
}

/// A pointer device must advertise both relative axes.
pub fn is_pointer(meta: &DeviceMeta) -> bool {
    !is_denylisted(&meta.name) && bit_set(&meta.rel_mask, REL_X) && bit_set(&meta.rel_mask, REL_Y)
}

/// A keyboard advertises far more key bits than any single-purpose button
/// device would ever declare, or says so by name.
pub fn is_keyboard(meta: &DeviceMeta) -> bool {
    if is_denylisted(&meta.name) {
        return false;
    }
    let declared_keys: u32 = meta.key_mask.iter().map(|word| word.count_ones()).sum();
    declared_keys >= KEYBOARD_KEY_THRESHOLD || meta.name.to_ascii_lowercase().contains("keyboard")
}

/// Run discovery against the standard device and sysfs roots.
pub fn discover() -> DiscoveredDevices {
    discover_at(Path::new(DEV_INPUT_DIR), Path::new(SYS_INPUT_DIR))
}

/// Run discovery against explicit roots (tests use fixture trees).
pub fn discover_at(dev_root: &Path, sys_root: &Path) -> DiscoveredDevices {
    let mut result = DiscoveredDevices::default();
    let candidates = enumerate(dev_root, sys_root);

    for meta in &candidates {
        if result.pointer.is_none() && is_pointer(meta) {
            info!(path = %meta.path.display(), name = %meta.name, "selected pointer device");
            result.pointer = Some(meta.path.clone());
        }
        if result.keyboard.is_none() && is_keyboard(meta) {
            info!(path = %meta.path.display(), name = %meta.name, "selected keyboard device");
            result.keyboard = Some(meta.path.clone());
        }
    }

    // Name-substring heuristic for pointers whose rel bitmask was missing
    // or unreadable.
    if result.pointer.is_none() {
        for meta in &candidates {
            if !is_denylisted(&meta.name) && meta.name.to_ascii_lowercase().contains("mouse") {
                info!(path = %meta.path.display(), name = %meta.name, "pointer fallback by name");
                result.pointer = Some(meta.path.clone());
                break;
            }
        }
    }

    // Legacy aggregate pointer device.
    if result.pointer.is_none() {
        let legacy = dev_root.join(LEGACY_POINTER_DEVICE);
        if legacy.exists() {
            info!(path = %legacy.display(), "pointer fallback to legacy aggregate device");
            result.pointer = Some(legacy);
        }
    }

    if result.pointer.is_none() {
        warn!("no usable pointer device found, continuing without mouse capture");
    }
    if result.keyboard.is_none() {
        warn!("no usable keyboard device found, continuing without hotkeys");
    }

    result
}

fn enumerate(dev_root: &Path, sys_root: &Path) -> Vec<DeviceMeta> {
    let entries = match fs::read_dir(dev_root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dev_root.display(), error = %e, "cannot enumerate input devices");
            return Vec::new();
        }
    };

    let mut candidates = Vec::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(node) = file_name.to_str() else { continue };
        if !node.starts_with("event") {
            continue;
        }

        match read_meta(entry.path(), sys_root, node) {
            Ok(meta) => {
                debug!(path = %meta.path.display(), name = %meta.name, "input candidate");
                candidates.push(meta);
            }
            Err(e) => {
                debug!(node, error = %e, "skipping device with unreadable metadata");
            }
        }
    }

    // Deterministic preference order: eventN sorted by node name.
    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    candidates
}

fn read_meta(path: PathBuf, sys_root: &Path, node: &str) -> Result<DeviceMeta> {
    let device_dir = sys_root.join(node).join("device");

    let name = fs::read_to_string(device_dir.join("name"))
        .map_err(|e| InjectorError::device_error(device_dir.join("name"), e))?
        .trim()
        .to_string();

    // A missing capability file just means the device declares none of
    // that event type.
    let rel_mask = read_mask(&device_dir.join("capabilities/rel"))?;
    let key_mask = read_mask(&device_dir.join("capabilities/key"))?;

    Ok(DeviceMeta { path, name, rel_mask, key_mask })
}

fn read_mask(path: &Path) -> Result<Vec<u64>> {
    match fs::read_to_string(path) {
        Ok(text) => parse_hex_bitmask(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(InjectorError::device_error(path.to_path_buf(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn meta(name: &str, rel: &[u64], key: &[u64]) -> DeviceMeta {
        DeviceMeta {
            path: PathBuf::from("/dev/input/event0"),
            name: name.to_string(),
            rel_mask: rel.to_vec(),
            key_mask: key.to_vec(),
        }
    }

    #[test]
    fn parses_multi_word_hex_bitmask_lsw_first() {
        let mask = parse_hex_bitmask("1000000 0 0 70000 0").unwrap();
        assert_eq!(mask.len(), 5);
        // Words come most-significant-first from sysfs.
        assert_eq!(mask[0], 0);
        assert_eq!(mask[1], 0x70000);
        assert_eq!(mask[4], 0x1000000);
        assert!(bit_set(&mask, 64 + 16));
        assert!(!bit_set(&mask, 3));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(parse_hex_bitmask("zz").is_err());
    }

    #[test]
    fn rel_xy_bits_classify_a_pointer() {
        // 0x143: REL_X, REL_Y, wheel and friends — a typical mouse
        let mouse = meta("USB Optical Mouse", &[0x143], &[0x1f0000, 0, 0, 0, 0]);
        assert!(is_pointer(&mouse));

        // Wheel-only device: vertical axis missing
        let wheel = meta("Jog Wheel", &[0x100], &[]);
        assert!(!is_pointer(&wheel));
    }

    #[test]
    fn denylisted_name_rejected_regardless_of_bitmask() {
        let sneaky = meta("ACPI Power Button", &[0x3], &[u64::MAX; 12]);
        assert!(!is_pointer(&sneaky));
        assert!(!is_keyboard(&sneaky));
    }

    #[test]
    fn large_key_mask_or_name_classifies_a_keyboard() {
        let by_mask = meta("AT Translated Set 2", &[], &[u64::MAX, u64::MAX]);
        assert!(is_keyboard(&by_mask));

        let by_name = meta("Wireless Keyboard", &[], &[0xff]);
        assert!(is_keyboard(&by_name));

        let button = meta("Headset Control", &[], &[0x7]);
        assert!(!is_keyboard(&button));
    }

    fn write_device(
        root: &Path,
        node: &str,
        name: &str,
        rel: Option<&str>,
        key: Option<&str>,
    ) {
        let dev = root.join("dev");
        let sys = root.join("sys").join(node).join("device");
        fs::create_dir_all(sys.join("capabilities")).unwrap();
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join(node), b"").unwrap();
        fs::write(sys.join("name"), format!("{name}\n")).unwrap();
        if let Some(rel) = rel {
            fs::write(sys.join("capabilities/rel"), rel).unwrap();
        }
        if let Some(key) = key {
            fs::write(sys.join("capabilities/key"), key).unwrap();
        }
    }

    #[test]
    fn discovery_walks_fixture_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write_device(root, "event0", "Power Button", None, Some("100000 0 0 0"));
        write_device(root, "event1", "USB Optical Mouse", Some("143"), Some("1f0000 0 0 0 0"));
        write_device(
            root,
            "event2",
            "AT Translated Set 2 keyboard",
            None,
            Some("ffffffffffffffff fffffffffffffffe"),
        );

        let found = discover_at(&root.join("dev"), &root.join("sys"));
        assert_eq!(found.pointer, Some(root.join("dev").join("event1")));
        assert_eq!(found.keyboard, Some(root.join("dev").join("event2")));
    }

    #[test]
    fn falls_back_to_name_then_legacy_device() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        // No rel capabilities declared at all, but the name says mouse.
        write_device(root, "event0", "Legacy Serial Mouse", None, None);

        let found = discover_at(&root.join("dev"), &root.join("sys"));
        assert_eq!(found.pointer, Some(root.join("dev").join("event0")));

        // Nothing usable: fall through to the aggregate device.
        let tmp2 = tempfile::tempdir().unwrap();
        let root2 = tmp2.path();
        write_device(root2, "event0", "Sleep Button", None, None);
        fs::write(root2.join("dev").join("mice"), b"").unwrap();

        let found = discover_at(&root2.join("dev"), &root2.join("sys"));
        assert_eq!(found.pointer, Some(root2.join("dev").join("mice")));
        assert_eq!(found.keyboard, None);
    }

    #[test]
    fn empty_tree_degrades_to_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("dev")).unwrap();
        let found = discover_at(&tmp.path().join("dev"), &tmp.path().join("sys"));
        assert_eq!(found.pointer, None);
        assert_eq!(found.keyboard, None);
    }
}
