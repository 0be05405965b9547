//! Appliance configuration.
//!
//! Fixed constants for the lossless player appliance, plus the handles
//! to the system-wide files that provisioning mutates.
//!
//! # Example
//!
//! ```rust
//! use lossless_provision::config::{PackageSet, DEFAULT_PACKAGES};
//!
//! let packages = PackageSet::new(DEFAULT_PACKAGES);
//! assert!(packages.names().contains(&"alsa-utils"));
//! ```

use std::env;
use std::path::{Path, PathBuf};

/// Directory under the operator's home holding the player install.
pub const INSTALL_DIR_NAME: &str = "lossless_player";
/// Directory under the operator's home where the music share is mounted.
pub const MOUNT_DIR_NAME: &str = "music_server";

/// systemd unit for the player.
pub const UNIT_NAME: &str = "lossless-player.service";
pub const UNIT_DESCRIPTION: &str = "Lossless Audio Player";
pub const SYSLOG_IDENTIFIER: &str = "lossless-player";
/// Seconds systemd waits before restarting the player.
pub const RESTART_SEC: u32 = 10;

/// Debian packages the appliance needs.
pub const DEFAULT_PACKAGES: &[&str] = &[
    "python3",
    "python3-venv",
    "python3-pip",
    "vlc",
    "libvlc-dev",
    "cifs-utils",
    "alsa-utils",
];

/// Python libraries installed into the virtual environment.
pub const PYTHON_LIBRARIES: &[&str] = &[
    "python-telegram-bot",
    "python-vlc",
    "mutagen",
    "python-dotenv",
];

/// Overlay line that enables the DAC board.
pub const OVERLAY_DIRECTIVE: &str = "dtoverlay=hifiberry-dacplus";
pub const OVERLAY_HEADER: &str = "# Enable HiFiBerry DAC+ audio";
pub const AUDIO_PARAM: &str = "dtparam=audio=on";

pub const DEFAULT_SERVER_IP: &str = "192.168.0.3";
pub const DEFAULT_SHARE: &str = "music";
pub const DEFAULT_VOLUME: u8 = 70;

/// Env override for the boot configuration path.
pub const BOOT_CONFIG_ENV: &str = "LOSSLESS_BOOT_CONFIG";
/// Bookworm and later mount the boot partition here.
pub const BOOT_CONFIG_FIRMWARE: &str = "/boot/firmware/config.txt";
pub const BOOT_CONFIG_LEGACY: &str = "/boot/config.txt";
pub const UNIT_DIR: &str = "/etc/systemd/system";
pub const ASOUND_CONF: &str = "/etc/asound.conf";

/// Ordered, duplicate-free set of OS packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSet {
    names: Vec<&'static str>,
}

impl PackageSet {
    /// Build a set, dropping later duplicates and keeping first-seen order.
    pub fn new(names: &[&'static str]) -> Self {
        let mut unique: Vec<&'static str> = Vec::with_capacity(names.len());
        for name in names {
            if !unique.contains(name) {
                unique.push(name);
            }
        }
        Self { names: unique }
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for PackageSet {
    fn default() -> Self {
        Self::new(DEFAULT_PACKAGES)
    }
}

/// Handles to the global files provisioning reads or mutates.
///
/// Steps take these explicitly rather than reaching for hard-coded paths,
/// so tests can point them at a scratch directory.
#[derive(Debug, Clone)]
pub struct SystemPaths {
    /// Raspberry Pi `config.txt`.
    pub boot_config: PathBuf,
    /// Directory systemd loads system units from.
    pub unit_dir: PathBuf,
    /// ALSA system-wide configuration.
    pub asound_conf: PathBuf,
}

impl SystemPaths {
    /// Resolve the real system paths.
    ///
    /// The boot config uses a 3-tier lookup:
    /// 1. `LOSSLESS_BOOT_CONFIG` environment variable
    /// 2. `/boot/firmware/config.txt` if it exists
    /// 3. `/boot/config.txt`
    pub fn detect() -> Self {
        Self {
            boot_config: resolve_boot_config(env::var_os(BOOT_CONFIG_ENV).map(PathBuf::from)),
            unit_dir: PathBuf::from(UNIT_DIR),
            asound_conf: PathBuf::from(ASOUND_CONF),
        }
    }

    /// All paths rooted under `root`, mirroring the real layout.
    pub fn under(root: &Path) -> Self {
        Self {
            boot_config: root.join("boot/config.txt"),
            unit_dir: root.join("etc/systemd/system"),
            asound_conf: root.join("etc/asound.conf"),
        }
    }

    /// Installed unit file.
    pub fn unit_file(&self) -> PathBuf {
        self.unit_dir.join(UNIT_NAME)
    }
}

fn resolve_boot_config(env_override: Option<PathBuf>) -> PathBuf {
    if let Some(path) = env_override {
        return path;
    }
    let firmware = PathBuf::from(BOOT_CONFIG_FIRMWARE);
    if firmware.exists() {
        return firmware;
    }
    PathBuf::from(BOOT_CONFIG_LEGACY)
}

/// Non-secret settings written into the environment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSettings {
    pub server_ip: String,
    pub share: String,
    pub volume: u8,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            server_ip: DEFAULT_SERVER_IP.to_string(),
            share: DEFAULT_SHARE.to_string(),
            volume: DEFAULT_VOLUME,
        }
    }
}
