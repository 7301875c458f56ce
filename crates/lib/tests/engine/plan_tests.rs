//! Planning and cache keys over the fixture manifest.

use kettle_lib::ident::TargetKey;

use super::common::{Fixture, names};

fn key(package: &str, name: &str) -> TargetKey {
  TargetKey::new(package.parse().unwrap(), name.parse().unwrap())
}

#[test]
fn executable_plan_orders_dependencies_first() {
  let fixture = Fixture::new("vizor");
  let engine = fixture.configured("x86_64-linux", "vizor-platform");

  let plan = engine.plan(&["Executable/VizorPlatform"]).unwrap();

  assert_eq!(
    names(plan.iter()),
    vec![
      "vizor:vizor-library",
      "streams:streams-library",
      "display-xcb:display-xcb-library",
      "vizor-platform:vizor-platform-library",
      "vizor-platform:vizor-platform-assets",
      "vizor-platform:vizor-platform-executable",
    ]
  );
  assert_eq!(plan.roots, vec![key("vizor-platform", "vizor-platform-executable")]);
}

#[test]
fn host_filtered_dependency_leaves_the_plan() {
  let fixture = Fixture::new("vizor");
  let engine = fixture.configured("x86_64-windows", "vizor-platform");

  let plan = engine.plan(&["vizor-platform-library"]).unwrap();
  assert!(!plan.iter().any(|k| k.package.as_str().starts_with("display")));
  assert_eq!(plan.len(), 3);
}

#[test]
fn first_activated_provider_wins() {
  let fixture = Fixture::new("vizor");
  // Without a configuration every package is active and both display
  // packages provide `Library/Display`.
  let engine = fixture.engine("aarch64-darwin");

  let display = engine.target("Library/Display").unwrap();
  assert_eq!(display, key("display-xcb", "display-xcb-library"));
}

#[test]
fn waves_group_independent_targets() {
  let fixture = Fixture::new("vizor");
  let engine = fixture.configured("x86_64-linux", "vizor-platform");
  let plan = engine.plan(&["vizor-platform-tests"]).unwrap();

  let waves: Vec<Vec<String>> = plan.waves().into_iter().map(|wave| names(wave)).collect();
  assert_eq!(waves.len(), 4);
  assert_eq!(waves[0].len(), 4);
  assert_eq!(waves[3], vec!["vizor-platform:vizor-platform-tests"]);
}

#[test]
fn checksums_are_stable_and_content_sensitive() {
  let fixture = Fixture::new("vizor");
  let engine = fixture.configured("x86_64-linux", "vizor-platform");
  let plan = engine.plan(&["vizor-platform-executable"]).unwrap();
  let before = engine.checksums(&plan).unwrap();
  assert_eq!(before, engine.checksums(&plan).unwrap());

  std::fs::write(
    fixture.root().join("streams/source/Streams/Buffer.cpp"),
    "#include \"Buffer.hpp\"\n// changed\n",
  )
  .unwrap();
  let after = engine.checksums(&plan).unwrap();

  for changed in [
    key("streams", "streams-library"),
    key("vizor-platform", "vizor-platform-library"),
    key("vizor-platform", "vizor-platform-executable"),
  ] {
    assert_ne!(before[&changed], after[&changed], "{changed} should change");
  }
  for unchanged in [
    key("vizor", "vizor-library"),
    key("display-xcb", "display-xcb-library"),
    key("vizor-platform", "vizor-platform-assets"),
  ] {
    assert_eq!(before[&unchanged], after[&unchanged], "{unchanged} should not change");
  }
}

#[test]
fn header_changes_outside_patterns_do_not_invalidate() {
  let fixture = Fixture::new("vizor");
  let engine = fixture.configured("x86_64-linux", "vizor-platform");
  let plan = engine.plan(&["vizor-library"]).unwrap();
  let before = engine.checksums(&plan).unwrap();

  // Only `*.cpp` files are declared sources.
  std::fs::write(fixture.root().join("vizor/source/Vizor/Vizor.hpp"), "#pragma once\n").unwrap();
  assert_eq!(before, engine.checksums(&plan).unwrap());
}
