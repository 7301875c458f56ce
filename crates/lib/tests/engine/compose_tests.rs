//! Configuration composition over the fixture manifest.

use kettle_lib::compose::RequirementKind;
use kettle_lib::engine::EngineError;
use kettle_lib::error::ResolveError;

use super::common::{Fixture, names};

#[test]
fn platform_configuration_selects_display_by_host() {
  let fixture = Fixture::new("vizor");

  let darwin = fixture.engine("aarch64-darwin").compose("vizor-platform").unwrap();
  assert_eq!(darwin.names(), vec!["vizor", "streams", "display-cocoa"]);

  let linux = fixture.engine("x86_64-linux").compose("vizor-platform").unwrap();
  assert_eq!(linux.names(), vec!["vizor", "streams", "display-xcb"]);

  let windows = fixture.engine("x86_64-windows").compose("vizor-platform").unwrap();
  assert_eq!(windows.names(), vec!["vizor", "streams"]);
  assert!(windows.requirements.iter().all(|r| r.kind == RequirementKind::Package));
}

#[test]
fn import_inlines_and_require_appends() {
  let fixture = Fixture::new("vizor");
  let composition = fixture.engine("x86_64-linux").compose("development").unwrap();

  assert_eq!(
    composition.names(),
    vec!["vizor", "streams", "display-xcb", "vizor-core"]
  );
  assert_eq!(composition.requirements[3].kind, RequirementKind::Configuration);
  // Imported configurations are inlined, not listed.
  assert!(!composition.contains("vizor-platform"));
}

#[test]
fn composition_is_byte_identical_across_runs() {
  let fixture = Fixture::new("vizor");
  let first = fixture.engine("x86_64-linux").compose("development").unwrap();
  let second = fixture.engine("x86_64-linux").compose("development").unwrap();

  assert_eq!(first, second);
  assert_eq!(
    serde_json::to_vec(&first).unwrap(),
    serde_json::to_vec(&second).unwrap()
  );
}

#[test]
fn configured_workspace_activates_only_required_packages() {
  let fixture = Fixture::new("vizor");
  let engine = fixture.configured("x86_64-linux", "vizor-platform");

  assert_eq!(
    names(engine.workspace().active_packages()),
    vec!["vizor-platform", "vizor", "streams", "display-xcb"]
  );
  assert!(engine.target("display-cocoa-library").is_err());
}

#[test]
fn unknown_configuration_is_fatal() {
  let fixture = Fixture::new("vizor");
  let err = fixture
    .builder("x86_64-linux")
    .root_configuration("release-candidate".parse().unwrap())
    .load()
    .err()
    .unwrap();

  assert!(matches!(
    err,
    EngineError::Resolve(ResolveError::UnresolvedConfiguration { ref name, .. }) if name == "release-candidate"
  ));
}
