//! Integration tests for the declarative code modification applier: disabled
//! entries, version gating, and all three mod kinds against a real temp tree.

use std::path::Path;

use smol_builder::context::BuildContext;
use smol_builder::models::BuildTarget;
use smol_builder::mods::{self, CodeModRegistry};

// ============================================================================
// FIXTURE SETUP
// ============================================================================

/// Build a context plus a tiny fake source tree under a temp root.
fn fixture(version: &str) -> (tempfile::TempDir, BuildContext, BuildTarget) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = BuildContext::new(dir.path(), version);
    std::fs::create_dir_all(&ctx.source_dir).unwrap();
    std::fs::create_dir_all(&ctx.mods_dir).unwrap();

    std::fs::write(
        ctx.source_dir.join("version.h"),
        "#define RUNTIME_NAME \"Node.js\"\n#define RUNTIME_URL \"https://nodejs.org\"\n",
    )
    .unwrap();
    std::fs::write(
        ctx.source_dir.join("node.gyp"),
        "// build description\n{\"variables\": {\"library_files\": [\"lib/base.js\"]}}\n",
    )
    .unwrap();

    let mut target = BuildTarget::new(version);
    target.apply_custom_patches = true;
    (dir, ctx, target)
}

fn load_registry(ctx: &BuildContext, config: &str) -> CodeModRegistry {
    let path = ctx.mods_dir.join("mods.json");
    std::fs::write(&path, config).unwrap();
    CodeModRegistry::load(&path).unwrap()
}

fn source_file(ctx: &BuildContext, name: &str) -> String {
    std::fs::read_to_string(ctx.source_dir.join(name)).unwrap()
}

// ============================================================================
// DISABLED AND VERSION-GATED ENTRIES
// ============================================================================

#[test]
fn disabled_entry_never_alters_any_file() {
    let (_tmp, ctx, target) = fixture("22.12.0");
    let registry = load_registry(
        &ctx,
        r#"{
            "rename": {
                "enabled": false,
                "type": "text-replace",
                "files": ["version.h"],
                "replacements": [{"search": "Node.js", "replace": "smol"}]
            }
        }"#,
    );

    let before = source_file(&ctx, "version.h");
    let applied = mods::apply_all(&registry, &target, &ctx, true).unwrap();

    assert_eq!(applied, 0);
    assert_eq!(source_file(&ctx, "version.h"), before);
}

#[test]
fn version_excluded_entry_is_skipped() {
    let (_tmp, ctx, target) = fixture("20.0.0");
    let registry = load_registry(
        &ctx,
        r#"{
            "rename": {
                "enabled": true,
                "versions": ["22.12.0"],
                "type": "text-replace",
                "files": ["version.h"],
                "replacements": [{"search": "Node.js", "replace": "smol"}]
            }
        }"#,
    );

    let applied = mods::apply_all(&registry, &target, &ctx, true).unwrap();
    assert_eq!(applied, 0);
    assert!(source_file(&ctx, "version.h").contains("Node.js"));
}

// ============================================================================
// TEXT REPLACE
// ============================================================================

#[test]
fn literal_replace_counts_only_changed_files() {
    let (_tmp, ctx, target) = fixture("22.12.0");
    let registry = load_registry(
        &ctx,
        r#"{
            "rename": {
                "enabled": true,
                "type": "text-replace",
                "files": ["version.h"],
                "replacements": [
                    {"search": "Node.js", "replace": "smol"},
                    {"search": "no-such-text", "replace": "whatever"}
                ]
            }
        }"#,
    );

    let applied = mods::apply_all(&registry, &target, &ctx, true).unwrap();
    assert_eq!(applied, 1);
    let content = source_file(&ctx, "version.h");
    assert!(content.contains("\"smol\""));
    assert!(!content.contains("Node.js"));
}

#[test]
fn zero_match_replace_leaves_file_untouched() {
    let (_tmp, ctx, target) = fixture("22.12.0");
    let registry = load_registry(
        &ctx,
        r#"{
            "noop": {
                "enabled": true,
                "type": "text-replace",
                "files": ["version.h"],
                "replacements": [{"search": "absent", "replace": "x"}]
            }
        }"#,
    );

    let before = source_file(&ctx, "version.h");
    let applied = mods::apply_all(&registry, &target, &ctx, true).unwrap();
    assert_eq!(applied, 0);
    assert_eq!(source_file(&ctx, "version.h"), before);
}

#[test]
fn regex_replace_applies_globally() {
    let (_tmp, ctx, target) = fixture("22.12.0");
    let registry = load_registry(
        &ctx,
        r##"{
            "defines": {
                "enabled": true,
                "type": "text-replace",
                "files": ["version.h"],
                "replacements": [{"search": "#define RUNTIME_(\\w+)", "replace": "#define SMOL_$1", "regex": true}]
            }
        }"##,
    );

    let applied = mods::apply_all(&registry, &target, &ctx, true).unwrap();
    assert_eq!(applied, 1);
    let content = source_file(&ctx, "version.h");
    assert!(content.contains("SMOL_NAME"));
    assert!(content.contains("SMOL_URL"));
}

// ============================================================================
// STRUCTURED APPEND AND PATCH-FILE KINDS
// ============================================================================

#[test]
fn structured_append_extends_the_named_list() {
    let (_tmp, ctx, target) = fixture("22.12.0");
    let registry = load_registry(
        &ctx,
        r#"{
            "register-loader": {
                "enabled": true,
                "type": "structured-append",
                "file": "node.gyp",
                "section": "variables",
                "list": "library_files",
                "values": ["lib/smol.js"]
            }
        }"#,
    );

    let applied = mods::apply_all(&registry, &target, &ctx, true).unwrap();
    assert_eq!(applied, 1);

    let doc: serde_json::Value =
        serde_json::from_str(&source_file(&ctx, "node.gyp")).unwrap();
    assert_eq!(
        doc["variables"]["library_files"],
        serde_json::json!(["lib/base.js", "lib/smol.js"])
    );
}

#[test]
fn patch_file_mod_applies_through_the_engine() {
    let (_tmp, ctx, target) = fixture("22.12.0");
    std::fs::write(
        ctx.mods_dir.join("rename.patch"),
        "--- a/version.h\n+++ b/version.h\n@@ -1,2 +1,2 @@\n-#define RUNTIME_NAME \"Node.js\"\n+#define RUNTIME_NAME \"smol\"\n #define RUNTIME_URL \"https://nodejs.org\"\n",
    )
    .unwrap();

    let registry = load_registry(
        &ctx,
        r#"{
            "rename-patch": {
                "enabled": true,
                "type": "patch",
                "file": "rename.patch"
            }
        }"#,
    );

    let applied = mods::apply_all(&registry, &target, &ctx, true).unwrap();
    assert_eq!(applied, 1);
    assert!(source_file(&ctx, "version.h").contains("\"smol\""));
}

// ============================================================================
// FAILURE ISOLATION
// ============================================================================

#[test]
fn failing_entry_does_not_stop_the_rest() {
    let (_tmp, ctx, target) = fixture("22.12.0");
    let registry = load_registry(
        &ctx,
        r#"{
            "a-broken": {
                "enabled": true,
                "type": "text-replace",
                "files": ["does-not-exist.h"],
                "replacements": [{"search": "x", "replace": "y"}]
            },
            "b-works": {
                "enabled": true,
                "type": "text-replace",
                "files": ["version.h"],
                "replacements": [{"search": "Node.js", "replace": "smol"}]
            }
        }"#,
    );

    let applied = mods::apply_all(&registry, &target, &ctx, true).unwrap();
    assert_eq!(applied, 1);
    assert!(source_file(&ctx, "version.h").contains("smol"));
}

#[test]
fn required_failing_entry_is_fatal() {
    let (_tmp, ctx, target) = fixture("22.12.0");
    let registry = load_registry(
        &ctx,
        r#"{
            "must-work": {
                "enabled": true,
                "required": true,
                "type": "text-replace",
                "files": ["does-not-exist.h"],
                "replacements": [{"search": "x", "replace": "y"}]
            }
        }"#,
    );

    assert!(mods::apply_all(&registry, &target, &ctx, true).is_err());
}

#[test]
fn upstream_dependent_entry_skipped_when_upstream_missing() {
    let (_tmp, ctx, target) = fixture("22.12.0");
    let registry = load_registry(
        &ctx,
        r#"{
            "on-top-of-upstream": {
                "enabled": true,
                "requires_upstream": true,
                "type": "text-replace",
                "files": ["version.h"],
                "replacements": [{"search": "Node.js", "replace": "smol"}]
            }
        }"#,
    );

    let applied = mods::apply_all(&registry, &target, &ctx, false).unwrap();
    assert_eq!(applied, 0);
    assert!(source_file(&ctx, "version.h").contains("Node.js"));
}
