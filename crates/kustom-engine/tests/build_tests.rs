//! Integration tests for layer builds

use kustom_core::{MemoryLoader, ResourceMap};
use kustom_engine::{Builder, EngineError, ErrorCategory, content_hash};
use serde_json::{Value as JsonValue, json};

const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: dply1
spec:
  replicas: 1
  template:
    spec:
      containers:
      - name: nginx
        image: nginx:1.25
"#;

const NAMESPACE: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: ns1
"#;

const KUSTOMIZATION: &str = r#"
namePrefix: foo-
namespace: ns1
commonLabels:
  app: nginx
commonAnnotations:
  note: This is a test annotation
resources:
- deployment.yaml
- namespace.yaml
configMapGenerator:
- name: literalConfigMap
  literals:
  - DB_USERNAME=admin
  - DB_PASSWORD=somepw
secretGenerator:
- name: secret
  commands:
    DB_USERNAME: printf admin
    DB_PASSWORD: printf somepw
  type: Opaque
"#;

fn fixture() -> MemoryLoader {
    MemoryLoader::new()
        .with_text_file("kustomization.yaml", KUSTOMIZATION)
        .with_text_file("deployment.yaml", DEPLOYMENT)
        .with_text_file("namespace.yaml", NAMESPACE)
}

fn build(loader: MemoryLoader) -> Result<ResourceMap, EngineError> {
    Builder::new(loader).build()
}

fn find<'a>(map: &'a ResourceMap, kind: &str) -> &'a JsonValue {
    map.resources()
        .find(|r| r.kind() == kind)
        .unwrap_or_else(|| panic!("no {} in output", kind))
        .document()
        .inner()
}

/// Check the `<stem>-<10 char hash>` shape of a generated name
fn assert_hashed(name: &str, stem: &str) {
    let hash = name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or_else(|| panic!("{} does not start with {}-", name, stem));
    assert_eq!(hash.len(), 10, "unexpected hash in {}", name);
    assert!(hash.chars().all(|c| c.is_ascii_alphanumeric()));
}

mod single_layer {
    use super::*;

    #[test]
    fn test_end_to_end_fixture() {
        let map = build(fixture()).unwrap();
        assert_eq!(map.len(), 4);

        let deployment = find(&map, "Deployment");
        assert_eq!(deployment["metadata"]["name"], "foo-dply1");
        assert_eq!(deployment["metadata"]["namespace"], "ns1");
        assert_eq!(deployment["metadata"]["labels"], json!({"app": "nginx"}));
        assert_eq!(deployment["metadata"]["annotations"], json!({"note": "This is a test annotation"}));
        assert_eq!(deployment["spec"]["selector"]["matchLabels"], json!({"app": "nginx"}));
        assert_eq!(deployment["spec"]["template"]["metadata"]["labels"], json!({"app": "nginx"}));
        assert_eq!(
            deployment["spec"]["template"]["metadata"]["annotations"],
            json!({"note": "This is a test annotation"})
        );

        let config_map = find(&map, "ConfigMap");
        assert_hashed(config_map["metadata"]["name"].as_str().unwrap(), "foo-literalConfigMap");
        assert_eq!(config_map["metadata"]["namespace"], "ns1");
        assert_eq!(config_map["data"], json!({"DB_USERNAME": "admin", "DB_PASSWORD": "somepw"}));
        assert_eq!(config_map["metadata"]["labels"], json!({"app": "nginx"}));

        let secret = find(&map, "Secret");
        assert_hashed(secret["metadata"]["name"].as_str().unwrap(), "foo-secret");
        assert_eq!(secret["type"], "Opaque");
        assert_eq!(secret["data"], json!({"DB_USERNAME": "YWRtaW4=", "DB_PASSWORD": "c29tZXB3"}));

        let namespace = find(&map, "Namespace");
        assert_eq!(namespace["metadata"]["name"], "foo-ns1");
        assert_eq!(namespace["metadata"]["labels"], json!({"app": "nginx"}));
        assert_eq!(namespace["metadata"]["annotations"], json!({"note": "This is a test annotation"}));
        assert!(namespace["metadata"].get("namespace").is_none());
    }

    #[test]
    fn test_builds_are_deterministic() {
        let first = build(fixture()).unwrap().as_yaml().unwrap();
        let second = build(fixture()).unwrap().as_yaml().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_output_keeps_declaration_order() {
        let map = build(fixture()).unwrap();
        let kinds: Vec<&str> = map.resources().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec!["Deployment", "Namespace", "ConfigMap", "Secret"]);
    }

    #[test]
    fn test_raw_resources_are_untouched() {
        let raw = Builder::new(fixture()).raw_resources().unwrap();
        assert_eq!(raw.len(), 2);
        let deployment = find(&raw, "Deployment");
        let authored: JsonValue = serde_yaml::from_str(DEPLOYMENT).unwrap();
        assert_eq!(deployment, &authored);
        assert_eq!(find(&raw, "Namespace")["metadata"]["name"], "ns1");
    }

    #[test]
    fn test_changed_literal_changes_suffix() {
        let name = |loader: MemoryLoader| {
            let map = build(loader).unwrap();
            find(&map, "ConfigMap")["metadata"]["name"].as_str().unwrap().to_string()
        };
        let original = name(fixture());
        let changed = name(fixture().with_text_file(
            "kustomization.yaml",
            &KUSTOMIZATION.replace("DB_PASSWORD=somepw", "DB_PASSWORD=otherpw"),
        ));
        assert_ne!(original, changed);
    }

    #[test]
    fn test_duplicate_resource_is_structural_conflict() {
        let loader = fixture()
            .with_text_file("copy.yaml", DEPLOYMENT)
            .with_text_file(
                "kustomization.yaml",
                "resources:\n- deployment.yaml\n- copy.yaml\n",
            );
        let err = build(loader).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::StructuralConflict);
    }

    #[test]
    fn test_failing_command_is_generation_failure() {
        let loader = fixture().with_text_file(
            "kustomization.yaml",
            "secretGenerator:\n- name: broken\n  commands:\n    KEY: echo oops >&2; exit 3\n",
        );
        let err = build(loader).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::GenerationFailure);
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn test_malformed_resource_file() {
        let loader = fixture()
            .with_text_file("kustomization.yaml", "resources:\n- broken.yaml\n")
            .with_text_file("broken.yaml", "apiVersion: v1\nmetadata:\n  name: nameless-kind\n");
        let err = build(loader).unwrap_err();
        assert!(matches!(&err, EngineError::InvalidResource { file, .. } if file == "broken.yaml"));
        assert_eq!(err.category(), ErrorCategory::Other);
    }

    #[test]
    fn test_directory_without_kustomization() {
        let loader = fixture()
            .with_text_file("kustomization.yaml", "resources:\n- manifests\n")
            .with_text_file("manifests/deployment.yaml", DEPLOYMENT);
        let err = build(loader).unwrap_err();
        assert!(matches!(&err, EngineError::InvalidResource { file, .. } if file == "manifests"));
        assert_eq!(err.category(), ErrorCategory::Other);
    }
}

mod patches {
    use super::*;

    fn with_kustomization(body: &str) -> MemoryLoader {
        fixture().with_text_file("kustomization.yaml", body)
    }

    #[test]
    fn test_patches_run_after_rename() {
        let loader = with_kustomization(
            r#"
namePrefix: foo-
resources:
- deployment.yaml
patchesStrategicMerge:
- replicas.yaml
patchesJson6902:
- target:
    kind: Deployment
    name: dply1
  path: image.yaml
"#,
        )
        .with_text_file(
            "replicas.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: dply1\nspec:\n  replicas: 3\n",
        )
        .with_text_file(
            "image.yaml",
            "- op: replace\n  path: /spec/template/spec/containers/0/image\n  value: nginx:1.27\n",
        );

        let map = build(loader).unwrap();
        let deployment = find(&map, "Deployment");
        assert_eq!(deployment["metadata"]["name"], "foo-dply1");
        assert_eq!(deployment["spec"]["replicas"], 3);
        assert_eq!(deployment["spec"]["template"]["spec"]["containers"][0]["image"], "nginx:1.27");
    }

    #[test]
    fn test_generic_patches_detect_payload() {
        let loader = with_kustomization(
            r#"
resources:
- deployment.yaml
patches:
- patch: |-
    apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: dply1
    spec:
      replicas: null
- target:
    kind: Deployment
  patch: |-
    - op: add
      path: /spec/paused
      value: true
"#,
        );
        let map = build(loader).unwrap();
        let deployment = find(&map, "Deployment");
        assert!(deployment["spec"].get("replicas").is_none());
        assert_eq!(deployment["spec"]["paused"], true);
    }

    #[test]
    fn test_selector_miss_carries_hint() {
        let loader = with_kustomization(
            r#"
resources:
- deployment.yaml
patchesJson6902:
- target:
    kind: Deployment
    name: dply2
  patch: "[]"
"#,
        );
        let err = build(loader).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::SelectorMiss);
        match err {
            EngineError::SelectorMiss { directive, index, help, .. } => {
                assert_eq!(directive, "patchesJson6902");
                assert_eq!(index, 0);
                assert!(help.unwrap().contains("dply1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_allow_empty_tolerates_miss() {
        let loader = with_kustomization(
            r#"
resources:
- deployment.yaml
patchesJson6902:
- target:
    kind: StatefulSet
  allowEmpty: true
  patch: |-
    - op: remove
      path: /spec/replicas
"#,
        );
        let map = build(loader).unwrap();
        assert_eq!(find(&map, "Deployment")["spec"]["replicas"], 1);
    }

    #[test]
    fn test_failed_test_op_aborts_build() {
        let loader = with_kustomization(
            r#"
resources:
- deployment.yaml
patchesJson6902:
- target:
    kind: Deployment
  patch: |-
    - op: test
      path: /spec/replicas
      value: 2
"#,
        );
        let err = build(loader).unwrap_err();
        assert!(matches!(err, EngineError::PatchTestFailed { .. }));
        assert_eq!(err.category(), ErrorCategory::PatchFailure);
    }

    #[test]
    fn test_replacement_copies_generated_name() {
        let loader = with_kustomization(
            r#"
resources:
- deployment.yaml
configMapGenerator:
- name: settings
  literals:
  - mode=fast
replacements:
- source:
    kind: ConfigMap
    name: settings
  targets:
  - select:
      kind: Deployment
    fieldPaths:
    - metadata.annotations.config
    options:
      create: true
"#,
        );
        let map = build(loader).unwrap();
        let config_name = find(&map, "ConfigMap")["metadata"]["name"].clone();
        assert_eq!(find(&map, "Deployment")["metadata"]["annotations"]["config"], config_name);
    }

    #[test]
    fn test_patched_generated_data_gets_new_hash() {
        let loader = MemoryLoader::new()
            .with_text_file(
                "kustomization.yaml",
                r#"
namePrefix: foo-
resources:
- web.yaml
configMapGenerator:
- name: cm
  literals:
  - A=1
patchesStrategicMerge:
- data.yaml
"#,
            )
            .with_text_file(
                "web.yaml",
                r#"
apiVersion: v1
kind: Pod
metadata:
  name: web
spec:
  containers:
  - name: web
    image: nginx
    envFrom:
    - configMapRef:
        name: cm
"#,
            )
            .with_text_file(
                "data.yaml",
                "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\ndata:\n  A: \"2\"\n",
            );

        let map = build(loader).unwrap();
        let config_map = map.resources().find(|r| r.kind() == "ConfigMap").unwrap();
        assert_eq!(config_map.document().inner()["data"]["A"], "2");
        let expected = format!("foo-cm-{}", content_hash(config_map.document(), "cm").unwrap());
        assert_eq!(config_map.name(), expected);

        let pod = find(&map, "Pod");
        assert_eq!(pod["spec"]["containers"][0]["envFrom"][0]["configMapRef"]["name"], expected.as_str());
    }

    #[test]
    fn test_json_patched_generated_data_gets_new_hash() {
        let loader = with_kustomization(
            r#"
configMapGenerator:
- name: cm
  literals:
  - A=1
patchesJson6902:
- target:
    kind: ConfigMap
    name: cm
  patch: |-
    - op: replace
      path: /data/A
      value: "2"
"#,
        );
        let unpatched = build(with_kustomization(
            "configMapGenerator:\n- name: cm\n  literals:\n  - A=1\n",
        ))
        .unwrap();
        let map = build(loader).unwrap();

        let before = find(&unpatched, "ConfigMap")["metadata"]["name"].clone();
        let config_map = map.resources().find(|r| r.kind() == "ConfigMap").unwrap();
        assert_ne!(config_map.name(), before.as_str().unwrap());
        assert_eq!(
            config_map.name(),
            format!("cm-{}", content_hash(config_map.document(), "cm").unwrap())
        );
    }
}

mod overlays {
    use super::*;

    const BASE_KUSTOMIZATION: &str = r#"
resources:
- deployment.yaml
configMapGenerator:
- name: app-config
  literals:
  - LOG_LEVEL=info
"#;

    const BASE_DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
      - name: app
        image: app:1
        envFrom:
        - configMapRef:
            name: app-config
"#;

    fn base() -> MemoryLoader {
        MemoryLoader::new()
            .with_text_file("base/kustomization.yaml", BASE_KUSTOMIZATION)
            .with_text_file("base/deployment.yaml", BASE_DEPLOYMENT)
    }

    fn overlay(body: &str) -> MemoryLoader {
        base().with_text_file("overlay/kustomization.yaml", body)
    }

    fn build_at(loader: MemoryLoader, dir: &str) -> Result<ResourceMap, EngineError> {
        Builder::new(loader.rooted_at(dir)).build()
    }

    fn config_ref(map: &ResourceMap) -> JsonValue {
        find(map, "Deployment")["spec"]["template"]["spec"]["containers"][0]["envFrom"][0]["configMapRef"]["name"]
            .clone()
    }

    #[test]
    fn test_base_references_hashed_name() {
        let map = build_at(base(), "base").unwrap();
        let name = find(&map, "ConfigMap")["metadata"]["name"].clone();
        assert_hashed(name.as_str().unwrap(), "app-config");
        assert_eq!(config_ref(&map), name);
    }

    #[test]
    fn test_merge_generator_rehashes_and_follows_prefix() {
        let base_map = build_at(base(), "base").unwrap();
        let base_name = find(&base_map, "ConfigMap")["metadata"]["name"].as_str().unwrap().to_string();

        let loader = overlay(
            r#"
namePrefix: prod-
resources:
- ../base
configMapGenerator:
- name: app-config
  behavior: merge
  literals:
  - REGION=eu
"#,
        );
        let map = build_at(loader, "overlay").unwrap();
        assert_eq!(map.len(), 2);

        let config_map = find(&map, "ConfigMap");
        assert_eq!(config_map["data"], json!({"LOG_LEVEL": "info", "REGION": "eu"}));
        let name = config_map["metadata"]["name"].as_str().unwrap();
        assert_hashed(name, "prod-app-config");
        assert_ne!(name, format!("prod-{}", base_name));

        assert_eq!(find(&map, "Deployment")["metadata"]["name"], "prod-web");
        assert_eq!(config_ref(&map), json!(name));
    }

    #[test]
    fn test_replace_generator_discards_base_data() {
        let loader = overlay(
            r#"
resources:
- ../base
configMapGenerator:
- name: app-config
  behavior: replace
  literals:
  - ONLY=this
"#,
        );
        let map = build_at(loader, "overlay").unwrap();
        assert_eq!(find(&map, "ConfigMap")["data"], json!({"ONLY": "this"}));
    }

    #[test]
    fn test_create_over_base_conflicts() {
        let loader = overlay(
            r#"
resources:
- ../base
configMapGenerator:
- name: app-config
  literals:
  - A=b
"#,
        );
        let err = build_at(loader, "overlay").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::StructuralConflict);
    }

    #[test]
    fn test_merge_without_base_conflicts() {
        let loader = MemoryLoader::new().with_text_file(
            "kustomization.yaml",
            "configMapGenerator:\n- name: lonely\n  behavior: merge\n  literals:\n  - A=b\n",
        );
        let err = build(loader).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::StructuralConflict);
    }

    #[test]
    fn test_sibling_bases_conflict() {
        let loader = base()
            .with_text_file("other/kustomization.yaml", "resources:\n- deployment.yaml\n")
            .with_text_file("other/deployment.yaml", BASE_DEPLOYMENT)
            .with_text_file("overlay/kustomization.yaml", "resources:\n- ../base\n- ../other\n");
        let err = build_at(loader, "overlay").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(kustom_core::CoreError::DuplicateId { .. })
        ));
    }

    #[test]
    fn test_base_cycle_detected() {
        let loader = MemoryLoader::new()
            .with_text_file("a/kustomization.yaml", "resources:\n- ../b\n")
            .with_text_file("b/kustomization.yaml", "resources:\n- ../a\n");
        let err = build_at(loader, "a").unwrap_err();
        match err {
            EngineError::CycleDetected { path } => assert_eq!(path, "/a -> /b -> /a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_raw_resources_include_bases() {
        let loader = overlay("resources:\n- ../base\n- extra.yaml\n").with_text_file(
            "overlay/extra.yaml",
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n",
        );
        let raw = Builder::new(loader.rooted_at("overlay")).raw_resources().unwrap();
        let names: Vec<&str> = raw.resources().map(|r| r.name()).collect();
        assert_eq!(names, vec!["web", "web"]);
        assert_eq!(config_ref(&raw), "app-config");
    }
}
