//! Build descriptor generation.
//!
//! Derives the documents the toolchain expects next to the sources:
//! the app manifest (`appinfo.json`) for each flavor, the native build
//! script and the lint configuration.

mod templates;

pub use templates::USER_SCRIPT_WRAPPER;

use serde_json::{Map, Value, json};

use crate::project::{Project, ResourceFile, ResourceKind};
use crate::target::SdkVersion;

/// Media bundled with both script-runtime templates.
const RUNTIME_MEDIA: &[(&str, &str, &str)] = &[
  ("png", "IMAGE_MENU_ICON", "images/menu_icon.png"),
  ("png", "IMAGE_LOGO_SPLASH", "images/logo_splash.png"),
  ("png", "IMAGE_TILE_SPLASH", "images/tile_splash.png"),
  ("font", "MONO_FONT_14", "fonts/UbuntuMono-Regular.ttf"),
];

fn media_entries(resources: &[ResourceFile]) -> Vec<Value> {
  let mut media = Vec::new();
  for resource in resources {
    let file = format!("{}/{}", resource.kind.dir(), resource.file_name);
    for (idx, identifier) in resource.identifiers.iter().enumerate() {
      let mut entry = Map::new();
      entry.insert("type".into(), json!(resource.kind.as_str()));
      entry.insert("name".into(), json!(identifier.resource_id));
      entry.insert("file".into(), json!(file));
      if let Some(regex) = &identifier.character_regex {
        entry.insert("characterRegex".into(), json!(regex));
      }
      if let Some(tracking) = identifier.tracking {
        entry.insert("trackingAdjust".into(), json!(tracking));
      }
      if let Some(compatibility) = &identifier.compatibility {
        entry.insert("compatibility".into(), json!(compatibility));
      }
      // Only the first identifier of the menu icon carries the flag.
      if resource.is_menu_icon && idx == 0 {
        entry.insert("menuIcon".into(), json!(true));
      }
      media.push(Value::Object(entry));
    }
  }
  media
}

fn runtime_media() -> Vec<Value> {
  RUNTIME_MEDIA
    .iter()
    .map(|(kind, name, file)| {
      let mut entry = json!({ "type": kind, "name": name, "file": file });
      if *name == "IMAGE_MENU_ICON" {
        entry["menuIcon"] = json!(true);
      }
      entry
    })
    .collect()
}

fn target_platforms(project: &Project, sdk: SdkVersion) -> Vec<String> {
  let supported: Vec<String> = sdk.platforms().iter().map(|p| p.to_string()).collect();
  match &project.app_platforms {
    Some(selected) => supported.into_iter().filter(|p| selected.contains(p)).collect(),
    None => supported,
  }
}

fn base_manifest(project: &Project, sdk: SdkVersion) -> Map<String, Value> {
  let mut manifest = Map::new();
  manifest.insert("uuid".into(), json!(project.app_uuid));
  manifest.insert("shortName".into(), json!(project.app_short_name));
  manifest.insert("longName".into(), json!(project.long_name()));
  manifest.insert("companyName".into(), json!(project.app_company_name));
  manifest.insert("versionCode".into(), json!(1));
  manifest.insert("versionLabel".into(), json!(project.app_version_label));
  manifest.insert("sdkVersion".into(), json!(sdk.as_str()));
  if sdk != SdkVersion::V2 {
    manifest.insert("targetPlatforms".into(), json!(target_platforms(project, sdk)));
  }
  manifest.insert("capabilities".into(), json!(project.app_capabilities));
  manifest.insert("watchapp".into(), json!({ "watchface": project.app_is_watchface }));
  manifest.insert("appKeys".into(), json!(project.app_keys));
  manifest
}

/// `appinfo.json` for a native project.
pub fn app_manifest(project: &Project, sdk: SdkVersion) -> Value {
  let mut manifest = base_manifest(project, sdk);
  manifest.insert("resources".into(), json!({ "media": media_entries(&project.resources) }));
  Value::Object(manifest)
}

/// `appinfo.json` for a single-script project; the script itself is
/// embedded separately.
pub fn simplyjs_manifest(project: &Project, sdk: SdkVersion) -> Value {
  let mut manifest = base_manifest(project, sdk);
  manifest.insert("capabilities".into(), json!(["configurable"]));
  manifest.insert("watchapp".into(), json!({ "watchface": false }));
  manifest.insert("appKeys".into(), json!({}));
  manifest.insert("resources".into(), json!({ "media": runtime_media() }));
  manifest.insert("simplyjs".into(), json!(true));
  Value::Object(manifest)
}

/// `appinfo.json` for a script-runtime project: the template's media plus
/// the project's png resources.
pub fn pebblejs_manifest(project: &Project, sdk: SdkVersion) -> Value {
  let mut manifest = base_manifest(project, sdk);
  let pngs: Vec<ResourceFile> = project
    .resources
    .iter()
    .filter(|r| r.kind == ResourceKind::Png)
    .cloned()
    .collect();
  let mut media = runtime_media();
  media.extend(media_entries(&pngs));
  manifest.insert("resources".into(), json!({ "media": media }));
  manifest.insert("projectType".into(), json!("pebblejs"));
  Value::Object(manifest)
}

/// Generated `wscript` for a native project.
pub fn build_script(sdk: SdkVersion) -> &'static str {
  match sdk {
    SdkVersion::V2 => templates::WSCRIPT_SDK2,
    SdkVersion::V3 => templates::WSCRIPT_SDK3,
  }
}

/// Generated `pebble-jshintrc`.
pub fn lint_config() -> &'static str {
  templates::JSHINT_CONFIG
}

/// The single-script bootstrap file with `script` embedded as a string literal.
pub fn user_script_bootstrap(script: &str) -> Result<String, serde_json::Error> {
  let escaped = serde_json::to_string(script)?;
  Ok(USER_SCRIPT_WRAPPER.replace("{script}", &escaped))
}
