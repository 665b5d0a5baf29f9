use std::path::PathBuf;
use serde_json::{json, Value};
use tokio_test::assert_ok;

use jsongen::artifact::{
    display_text, format_for_display, save_artifact, DirectoryTarget, JsonArtifact,
    SaveTarget, JSON_MEDIA_TYPE,
};
use jsongen::GenerationResult;

struct CancelTarget;

impl SaveTarget for CancelTarget
{   fn choose(&mut self, _suggested_name: &str) -> Option<PathBuf>
    {   None
    }
}

fn staged_files(dir: &std::path::Path) -> usize
{   std::fs::read_dir(dir).unwrap().count()
}

#[test]
fn formats_with_two_space_indent()
{   let value = json!({ "moons": [], "name": "Mercury" });
    assert_eq!(
      format_for_display(&value)
    , "{\n  \"moons\": [],\n  \"name\": \"Mercury\"\n}"
    );
}

#[test]
fn formatting_keeps_generated_key_order()
{   let value: Value = serde_json::from_str(
      r#"{"name":"Mercury","diameter_km":4879,"moons":0}"#
    ).unwrap();
    assert_eq!(
      format_for_display(&value)
    , "{\n  \"name\": \"Mercury\",\n  \"diameter_km\": 4879,\n  \"moons\": 0\n}"
    );

    let nested = Value::String(r#"{"zeta":1,"alpha":{"y":2,"b":3}}"#.to_string());
    assert_eq!(
      format_for_display(&nested)
    , "{\n  \"zeta\": 1,\n  \"alpha\": {\n    \"y\": 2,\n    \"b\": 3\n  }\n}"
    );
}

#[test]
fn string_payloads_holding_json_are_pretty_printed()
{   let value = Value::String(r#"{"a":[1,2]}"#.to_string());
    assert_eq!(
      format_for_display(&value)
    , "{\n  \"a\": [\n    1,\n    2\n  ]\n}"
    );
}

#[test]
fn plain_strings_are_rendered_as_is()
{   let value = Value::String("not json at all".to_string());
    assert_eq!(format_for_display(&value), "not json at all");
}

#[test]
fn formatting_is_idempotent()
{   let value = json!({ "users": [{ "id": 1, "tags": ["a", "b"] }], "total": 1 });
    let once = format_for_display(&value);
    let twice = format_for_display(&Value::String(once.clone()));
    assert_eq!(once, twice);
    assert_eq!(once, format_for_display(&value));
}

#[test]
fn formatted_output_parses_back_to_the_payload()
{   let payloads = [
      json!({ "planets": [{ "name": "Earth", "diameter_km": 12742.0 }] })
    , json!([1, "two", null, true, { "nested": { "deep": [] } }])
    , json!({ "unicode": "naïve ☃", "escaped": "line\nbreak \"quoted\"" })
    ];
    for payload in payloads
    {   let text = format_for_display(&payload);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, payload);
    }
}

#[test]
fn display_text_only_for_success()
{   assert_eq!(display_text(None), None);
    assert_eq!(
      display_text(Some(&GenerationResult::Failure("nope".to_string())))
    , None
    );
    assert_eq!(
      display_text(Some(&GenerationResult::Success(json!({ "a": 1 }))))
    , Some("{\n  \"a\": 1\n}".to_string())
    );
}

#[test]
fn saves_through_target_and_releases_staged_file()
{   let staging = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let artifact = JsonArtifact::new("generated.json", "{\n  \"a\": 1\n}".to_string());
    assert_eq!(artifact.media_type, JSON_MEDIA_TYPE);

    let mut target = DirectoryTarget::new(out.path());
    let saved = assert_ok!(save_artifact(&artifact, staging.path(), &mut target));

    let path = saved.unwrap();
    assert_eq!(path, out.path().join("generated.json"));
    assert_eq!(std::fs::read(&path).unwrap(), artifact.bytes);
    assert_eq!(staged_files(staging.path()), 0);
}

#[test]
fn cancelled_save_releases_staged_file()
{   let staging = tempfile::tempdir().unwrap();
    let artifact = JsonArtifact::new("generated.json", "[]".to_string());

    let saved = assert_ok!(save_artifact(&artifact, staging.path(), &mut CancelTarget));

    assert_eq!(saved, None);
    assert_eq!(staged_files(staging.path()), 0);
}

#[test]
fn failed_save_releases_staged_file()
{   let staging = tempfile::tempdir().unwrap();
    let artifact = JsonArtifact::new("generated.json", "[]".to_string());
    let mut target = DirectoryTarget::new(staging.path().join("missing").join("dir"));

    assert!(save_artifact(&artifact, staging.path(), &mut target).is_err());
    assert_eq!(staged_files(staging.path()), 0);
}
