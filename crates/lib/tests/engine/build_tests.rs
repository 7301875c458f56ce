//! End-to-end builds of the fixture through the shell executor.
//!
//! Fixture commands only use shell builtins since `PATH` is cleared.
#![cfg(unix)]

use std::fs;

use kettle_lib::ident::TargetKey;

use super::common::Fixture;

fn key(package: &str, name: &str) -> TargetKey {
  TargetKey::new(package.parse().unwrap(), name.parse().unwrap())
}

#[tokio::test]
async fn full_build_links_public_dependencies_only() {
  let fixture = Fixture::new("vizor");
  let engine = fixture.configured("x86_64-linux", "vizor-platform");

  let build = engine.build(&["Test/VizorPlatform"]).await.unwrap();
  assert!(build.is_success(), "failed: {:?}", build.report.failed);
  assert_eq!(build.report.executed, 7);
  assert_eq!(build.report.cache_hits, 0);
  assert_eq!(build.report.resolved.len(), 7);

  let executable = build
    .report
    .record(&key("vizor-platform", "vizor-platform-executable"))
    .and_then(|r| r.artifact.clone())
    .unwrap();
  let link_flags = fs::read_to_string(executable).unwrap();
  assert!(link_flags.contains("libVizorPlatform.a"));
  assert!(link_flags.contains("libVizor.a"));
  assert!(link_flags.contains("libDisplayXCB.a"));
  assert!(link_flags.lines().any(|l| l == "-lxcb"));
  // Streams is a private dependency of the platform library.
  assert!(!link_flags.contains("libStreams.a"));

  let tests = build.artifacts()[0];
  let log = fs::read_to_string(tests.artifact.as_ref().unwrap()).unwrap();
  assert_eq!(log, "--verbose\n--color=never\n");
}

#[tokio::test]
async fn private_headers_reach_the_action() {
  let fixture = Fixture::new("vizor");
  let engine = fixture.configured("x86_64-linux", "vizor-platform");

  let record = engine.resolve("vizor-platform-library").await.unwrap();
  let headers = fs::read_to_string(record.artifact.as_ref().unwrap()).unwrap();
  assert!(headers.lines().any(|l| l.ends_with("streams/source")));

  // But they are not exported to consumers.
  assert!(
    !record
      .exported
      .header_search_paths
      .iter()
      .any(|p| p.contains("streams"))
  );
}

#[tokio::test]
async fn rebuild_is_served_from_the_store() {
  let fixture = Fixture::new("vizor");

  let first = fixture
    .configured("x86_64-linux", "vizor-platform")
    .build(&["vizor-platform-tests"])
    .await
    .unwrap();
  assert_eq!(first.report.executed, 7);

  // A fresh engine over the same store.
  let second = fixture
    .configured("x86_64-linux", "vizor-platform")
    .build(&["vizor-platform-tests"])
    .await
    .unwrap();
  assert!(second.is_success());
  assert_eq!(second.report.executed, 0);
  assert_eq!(second.report.cache_hits, 7);
  assert_eq!(
    first.report.record(&key("vizor", "vizor-library")),
    second.report.record(&key("vizor", "vizor-library"))
  );
}

#[tokio::test]
async fn source_edit_rebuilds_dependents_only() {
  let fixture = Fixture::new("vizor");
  fixture
    .configured("x86_64-linux", "vizor-platform")
    .build(&["vizor-platform-tests"])
    .await
    .unwrap();

  fs::write(
    fixture.root().join("streams/source/Streams/Buffer.cpp"),
    "#include \"Buffer.hpp\"\nint buffered = 1;\n",
  )
  .unwrap();

  let rebuilt = fixture
    .configured("x86_64-linux", "vizor-platform")
    .build(&["vizor-platform-tests"])
    .await
    .unwrap();
  assert!(rebuilt.is_success());
  assert_eq!(rebuilt.report.executed, 4);
  assert_eq!(rebuilt.report.cache_hits, 3);
}

#[tokio::test]
async fn failing_command_skips_dependents() {
  let fixture = Fixture::new("vizor");
  let manifest = fixture.manifest_path();
  let content = fs::read_to_string(&manifest).unwrap();
  fs::write(
    &manifest,
    content.replace("printf 'streams' > \\\"$out/libStreams.a\\\"", "echo broken >&2; exit 3"),
  )
  .unwrap();

  let engine = fixture.configured("x86_64-linux", "vizor-platform");
  let build = engine.build(&["vizor-platform-tests", "vizor-library"]).await.unwrap();

  assert!(!build.is_success());
  assert_eq!(build.report.failed.len(), 1);
  let (failed, err) = &build.report.failed[0];
  assert_eq!(failed, &key("streams", "streams-library"));
  assert_eq!(err.partial_output(), Some("broken"));

  assert_eq!(build.report.skipped.len(), 3);
  assert!(build.report.record(&key("vizor", "vizor-library")).is_some());
  assert_eq!(build.artifacts().len(), 1);
}
