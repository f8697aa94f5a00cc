//! Shared constants.

/// Application name used for data and config directories.
pub const APP_NAME: &str = "buildbox";

/// Environment variable overriding the artifact/job store root.
pub const STORE_ENV: &str = "BUILDBOX_STORE";

/// Environment variable overriding the parent directory of isolated build trees.
pub const WORK_ROOT_ENV: &str = "BUILDBOX_WORK_ROOT";

/// Generated app manifest, written at the workspace root.
pub const APP_MANIFEST_FILE: &str = "appinfo.json";

/// Generated build script for native projects.
pub const BUILD_SCRIPT_FILE: &str = "wscript";

/// Generated lint configuration for native projects.
pub const LINT_CONFIG_FILE: &str = "pebble-jshintrc";

/// Bootstrap file the single-script runtime loads the user script from.
pub const USER_SCRIPT_FILE: &str = "zzz_userscript.js";

/// Directory the toolchain writes its outputs to, relative to the workspace.
pub const BUILD_OUTPUT_DIR: &str = "build";

/// Extension of the packaged binary.
pub const PACKAGE_EXTENSION: &str = "pbw";

/// Stored artifact names. Every artifact lives under `<job-id>/<name>`.
pub const BUILD_LOG_ARTIFACT: &str = "build_log.txt";
pub const PACKAGE_ARTIFACT: &str = "watchface.pbw";
pub const SCRIPT_ARTIFACT: &str = "simply.js";

/// Archive entry names inside the packaged binary.
pub const APP_BINARY_ENTRY: &str = "pebble-app.bin";
pub const RESOURCE_PACK_ENTRY: &str = "app_resources.pbpack";
pub const WORKER_BINARY_ENTRY: &str = "pebble-worker.bin";

/// Debug binaries produced next to the package.
pub const APP_ELF: &str = "pebble-app.elf";
pub const WORKER_ELF: &str = "pebble-worker.elf";
