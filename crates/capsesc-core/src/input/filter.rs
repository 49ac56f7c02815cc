// Capsesc Input Layer - Device Filtering
// Which opened keyboards are actually tracked

use super::device::is_virtual_device;

/// Check if a device should be tracked.
///
/// The filtering logic is:
///
/// 1. The daemon's own virtual device is never tracked
/// 2. Devices matched by name or node path in `ignore` are never tracked
/// 3. Everything else the platform classified as a keyboard is tracked
///
/// # Arguments
/// * `device_name` - The device name from evdev
/// * `device_path` - The device node (e.g., "/dev/input/event0")
/// * `ignore` - Device names/paths to exclude
/// * `virtual_name` - Name of the daemon's own uinput device
pub fn matches_device_filter(
    device_name: &str,
    device_path: &str,
    ignore: &[String],
    virtual_name: &str,
) -> bool {
    if is_virtual_device(device_name, virtual_name) {
        return false;
    }

    !ignore
        .iter()
        .any(|entry| device_path == entry || device_name == entry)
}

/// Owned filter configuration, built from settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    ignore: Vec<String>,
    virtual_name: String,
}

impl DeviceFilter {
    pub fn new(virtual_name: impl Into<String>, ignore: Vec<String>) -> Self {
        Self {
            ignore,
            virtual_name: virtual_name.into(),
        }
    }

    pub fn accepts(&self, device_name: &str, device_path: &str) -> bool {
        matches_device_filter(device_name, device_path, &self.ignore, &self.virtual_name)
    }

    pub fn virtual_name(&self) -> &str {
        &self.virtual_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_regular_keyboard() {
        assert!(matches_device_filter(
            "AT Translated Set 2 keyboard",
            "/dev/input/event3",
            &[],
            "capsesc"
        ));
    }

    #[test]
    fn test_rejects_own_virtual_device() {
        assert!(!matches_device_filter(
            "capsesc",
            "/dev/input/event20",
            &[],
            "capsesc"
        ));
    }

    #[test]
    fn test_ignore_by_path() {
        let ignore = vec!["/dev/input/event3".to_string()];
        assert!(!matches_device_filter(
            "Logitech Keyboard",
            "/dev/input/event3",
            &ignore,
            "capsesc"
        ));
    }

    #[test]
    fn test_ignore_by_name() {
        let ignore = vec!["Logitech Keyboard".to_string()];
        assert!(!matches_device_filter(
            "Logitech Keyboard",
            "/dev/input/event5",
            &ignore,
            "capsesc"
        ));
    }

    #[test]
    fn test_ignore_list_does_not_match_other_devices() {
        let ignore = vec!["Specific Device".to_string()];
        assert!(matches_device_filter(
            "Other Device",
            "/dev/input/event1",
            &ignore,
            "capsesc"
        ));
    }

    #[test]
    fn test_device_filter_struct() {
        let filter = DeviceFilter::new("capsesc", vec!["Yubikey".to_string()]);
        assert!(filter.accepts("Keychron K2", "/dev/input/event4"));
        assert!(!filter.accepts("Yubikey", "/dev/input/event9"));
        assert!(!filter.accepts("capsesc", "/dev/input/event10"));
        assert_eq!(filter.virtual_name(), "capsesc");
    }
}
