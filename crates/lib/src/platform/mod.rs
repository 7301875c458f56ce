//! Host detection and on-disk locations.

pub mod paths;

/// Architectures with known-good host identifiers.
const KNOWN_ARCHES: &[&str] = &["x86_64", "aarch64"];
/// Operating systems with known-good host identifiers, as written in manifests.
const KNOWN_OSES: &[&str] = &["linux", "darwin", "windows", "freebsd"];

/// The running architecture as it appears in a host identifier.
pub fn arch_name() -> &'static str {
  std::env::consts::ARCH
}

/// The running operating system as it appears in a host identifier.
///
/// Manifests match on `darwin`, not Rust's `macos`.
pub fn os_name() -> &'static str {
  match std::env::consts::OS {
    "macos" => "darwin",
    other => other,
  }
}

/// The `ARCH-OS` identifier of the running system, e.g. `aarch64-darwin`.
pub fn host_identifier() -> String {
  format!("{}-{}", arch_name(), os_name())
}

/// Whether `identifier` is one of the `ARCH-OS` pairs kettle knows about.
///
/// Unknown hosts still work; predicates simply see the raw identifier.
pub fn is_known_host(identifier: &str) -> bool {
  identifier
    .split_once('-')
    .is_some_and(|(arch, os)| KNOWN_ARCHES.contains(&arch) && KNOWN_OSES.contains(&os))
}
