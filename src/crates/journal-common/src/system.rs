//! Machine and boot identifiers.
//!
//! Journal entries carry `_MACHINE_ID` and `_BOOT_ID` fields; callers filter
//! on them to restrict a reader to the local host or the current boot. Both
//! identifiers are fixed for the lifetime of the process, so they are loaded
//! once and served from a process-wide cell afterwards.

use std::io;
use std::sync::OnceLock;

static MACHINE_ID: OnceLock<uuid::Uuid> = OnceLock::new();
static BOOT_ID: OnceLock<uuid::Uuid> = OnceLock::new();

/// Reads a file from the host filesystem, trying both the normal path and /host/ prefix.
///
/// Containers commonly mount the host filesystem at /host.
fn read_host_file(filename: &str) -> io::Result<String> {
    match std::fs::read_to_string(filename) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            std::fs::read_to_string(format!("/host/{}", filename))
        }
        Err(e) => Err(e),
    }
}

fn parse_id128(content: &str) -> io::Result<uuid::Uuid> {
    uuid::Uuid::try_parse(content.trim()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Loads the machine ID from `/etc/machine-id`, bypassing the cache.
#[cfg(target_os = "linux")]
pub fn load_machine_id() -> io::Result<uuid::Uuid> {
    parse_id128(&read_host_file("/etc/machine-id")?)
}

/// Loads the boot ID from `/proc/sys/kernel/random/boot_id`, bypassing the cache.
#[cfg(target_os = "linux")]
pub fn load_boot_id() -> io::Result<uuid::Uuid> {
    parse_id128(&std::fs::read_to_string("/proc/sys/kernel/random/boot_id")?)
}

#[cfg(not(target_os = "linux"))]
pub fn load_machine_id() -> io::Result<uuid::Uuid> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "machine ID loading not supported on this platform",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn load_boot_id() -> io::Result<uuid::Uuid> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "boot ID loading not supported on this platform",
    ))
}

fn cached(
    cell: &'static OnceLock<uuid::Uuid>,
    load: fn() -> io::Result<uuid::Uuid>,
) -> io::Result<uuid::Uuid> {
    if let Some(id) = cell.get() {
        return Ok(*id);
    }

    // A failed load is not cached; the next call tries again.
    let id = load()?;
    Ok(*cell.get_or_init(|| id))
}

/// The identifier of the current machine.
///
/// Loaded on first use and then served from memory for the remaining
/// lifetime of the process.
pub fn machine_id() -> io::Result<uuid::Uuid> {
    cached(&MACHINE_ID, load_machine_id)
}

/// The identifier of the current boot.
///
/// Loaded on first use and then served from memory for the remaining
/// lifetime of the process.
pub fn boot_id() -> io::Result<uuid::Uuid> {
    cached(&BOOT_ID, load_boot_id)
}

/// A fresh random 128-bit identifier.
pub fn random_id() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}

/// Formats an identifier the way journal fields store it: 32 lowercase hex
/// digits without dashes.
pub fn format_id128(id: &uuid::Uuid) -> String {
    id.as_simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id128_accepts_both_forms() {
        let simple = parse_id128("5f5777e46c5f4131bd9b71cbed6b9abf\n").unwrap();
        let dashed = parse_id128("5f5777e4-6c5f-4131-bd9b-71cbed6b9abf").unwrap();
        assert_eq!(simple, dashed);
    }

    #[test]
    fn test_parse_id128_rejects_garbage() {
        let err = parse_id128("not-an-id").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_format_id128_is_plain_hex() {
        let id = parse_id128("5f5777e4-6c5f-4131-bd9b-71cbed6b9abf").unwrap();
        assert_eq!(format_id128(&id), "5f5777e46c5f4131bd9b71cbed6b9abf");
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(random_id(), random_id());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_boot_id_is_memoized() {
        // Not every sandbox exposes /proc; only compare when it does.
        if let Ok(first) = boot_id() {
            assert_eq!(boot_id().unwrap(), first);
            assert_eq!(BOOT_ID.get(), Some(&first));
        }
    }
}
