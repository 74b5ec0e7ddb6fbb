/// Turn a volume specifier into the device path udev exposes for it.
///
/// `LABEL=`, `PARTLABEL=`, `UUID=` and `PARTUUID=` are mapped to the matching `/dev/disk/by-*`
/// link. UUIDs are lower-cased since udev always names the links in lower case. Anything else is
/// taken as a device path already. The result is not checked for existence, a missing device shows
/// up when it is mounted.
pub fn resolve_device(spec: &str) -> String {
    if let Some(label) = spec.strip_prefix("LABEL=") {
        format!("/dev/disk/by-label/{label}")
    } else if let Some(label) = spec.strip_prefix("PARTLABEL=") {
        format!("/dev/disk/by-partlabel/{label}")
    } else if let Some(uuid) = spec.strip_prefix("UUID=") {
        format!("/dev/disk/by-uuid/{}", uuid.to_lowercase())
    } else if let Some(uuid) = spec.strip_prefix("PARTUUID=") {
        format!("/dev/disk/by-partuuid/{}", uuid.to_lowercase())
    } else {
        spec.to_owned()
    }
}
