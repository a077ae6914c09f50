use projgen::{
    BuildContext, GenerationContext, MANIFEST_FILE, NodeKey, ProjgenError, Solution,
};
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST: &str = r#"
solution: Game
output: Generated
platforms:
  - name: Win
    build_target: StandaloneWindows64
    target_framework: netstandard2.1
    defines: [PLATFORM_WIN]
    editor_defines: [UNITY_EDITOR]
  - name: Android
    build_target: Android
    scripting_backend: il2cpp
    target_framework: netstandard2.1
    defines: [PLATFORM_ANDROID]
modules:
  - name: Core
    descriptor: Assets/Core/Core.asmdef
    sources: [Assets/Core]
  - name: App
    descriptor: Assets/App/App.asmdef
    sources: [Assets/App]
"#;

fn make_project(manifest: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().canonicalize().expect("canonical tempdir");

    fs::create_dir_all(root.join("Assets/Core")).expect("create core");
    fs::create_dir_all(root.join("Assets/App")).expect("create app");
    fs::write(root.join("Assets/Core/Math.cs"), "class Math {}\n").unwrap();
    fs::write(root.join("Assets/App/Main.cs"), "class Main {}\n").unwrap();
    fs::write(
        root.join("Assets/Core/Core.asmdef"),
        r#"{ "name": "Core", "rootNamespace": "Game.Core" }"#,
    )
    .unwrap();
    fs::write(
        root.join("Assets/App/App.asmdef"),
        r#"{ "name": "App", "references": ["Core"], "includePlatforms": ["Editor", "Win"] }"#,
    )
    .unwrap();
    fs::write(root.join(MANIFEST_FILE), manifest).unwrap();
    (dir, root)
}

fn read_outputs(dir: &Path) -> Vec<(String, String)> {
    let mut files: Vec<(String, String)> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            (name, fs::read_to_string(&path).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[test]
fn core_and_app_generate_in_dependency_order() {
    let (_dir, root) = make_project(MANIFEST);
    let context = GenerationContext::discover(root.join("Assets/App")).unwrap();

    let plan = context.plan().unwrap();
    assert_eq!(plan.order, vec!["Core", "App"]);
    let app = plan.graph.module("App").unwrap();
    let edge = app
        .dependencies
        .iter()
        .find(|edge| edge.dependency == NodeKey::module("Core"))
        .unwrap();
    assert_eq!(edge.platforms(BuildContext::Player).iter().collect::<Vec<_>>(), vec!["Win"]);
    assert_eq!(edge.in_editor.len(), 2);

    let report = context.generate().unwrap();
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    let output = root.join("Generated");
    for name in [
        "Core.Generated.props",
        "Core.Generated.targets",
        "Core.csproj",
        "App.Generated.props",
        "App.Generated.targets",
        "App.csproj",
        "Game.sln",
        "build.proj",
    ] {
        assert!(output.join(name).is_file(), "missing {name}");
    }

    let props = fs::read_to_string(output.join("App.Generated.props")).unwrap();
    assert!(props.contains("<Compile Include=\"../Assets/App/Main.cs\" />"));
    assert!(props.contains("<ProjectReference Include=\"Core.csproj\""));
    assert!(!props.contains("'$(Configuration)' == 'Player' And '$(Platform)' == 'Android'"));

    let core = fs::read_to_string(output.join("Core.Generated.props")).unwrap();
    assert!(core.contains("<RootNamespace>Game.Core</RootNamespace>"));
    assert!(core.contains("<AllowUnsafeBlocks>true</AllowUnsafeBlocks>"));

    let solution = Solution::parse(&fs::read_to_string(output.join("Game.sln")).unwrap()).unwrap();
    let names: Vec<&str> = solution.projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Core", "App"]);
    assert_eq!(solution.configurations.len(), 4);
}

#[test]
fn edge_narrows_to_platforms_the_dependency_supports() {
    let (_dir, root) = make_project(MANIFEST);
    fs::write(
        root.join("Assets/Core/Core.asmdef"),
        r#"{ "name": "Core", "includePlatforms": ["Editor", "Win"] }"#,
    )
    .unwrap();
    fs::write(
        root.join("Assets/App/App.asmdef"),
        r#"{ "name": "App", "references": ["Core"] }"#,
    )
    .unwrap();
    let context = GenerationContext::discover(&root).unwrap();

    let plan = context.plan().unwrap();
    assert_eq!(plan.order, vec!["Core", "App"]);
    assert!(!plan.diagnostics.has_errors());
    let app = plan.graph.module("App").unwrap();
    assert_eq!(app.player.len(), 2);
    let edge = app
        .dependencies
        .iter()
        .find(|edge| edge.dependency == NodeKey::module("Core"))
        .unwrap();
    assert_eq!(edge.platforms(BuildContext::Player).iter().collect::<Vec<_>>(), vec!["Win"]);
}

#[test]
fn generation_is_idempotent_and_keeps_hand_edits() {
    let (_dir, root) = make_project(MANIFEST);
    let context = GenerationContext::discover(&root).unwrap();
    context.generate().unwrap();
    let output = root.join("Generated");

    fs::write(output.join("Core.csproj"), "<Project>edited</Project>\n").unwrap();
    let first = read_outputs(&output);

    let report = context.generate().unwrap();
    assert_eq!(report.preserved.len(), 2);
    assert_eq!(read_outputs(&output), first);
}

#[test]
fn hand_added_solution_projects_survive_regeneration() {
    let (_dir, root) = make_project(MANIFEST);
    let context = GenerationContext::discover(&root).unwrap();
    context.generate().unwrap();
    let sln = root.join("Generated/Game.sln");

    let mut solution = Solution::load(&sln).unwrap().unwrap();
    solution.projects.push(projgen::SolutionProject {
        type_guid: projgen::export::solution::CSHARP_PROJECT_TYPE.to_string(),
        name: "Tools".into(),
        path: "../Tools/Tools.csproj".into(),
        guid: "33333333-3333-3333-3333-333333333333".into(),
        lines: Vec::new(),
    });
    let text = solution.to_text().unwrap();
    let mut permissions = fs::metadata(&sln).unwrap().permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    fs::set_permissions(&sln, permissions).unwrap();
    fs::write(&sln, text).unwrap();

    context.generate().unwrap();
    let regenerated = Solution::load(&sln).unwrap().unwrap();
    let names: Vec<&str> = regenerated.projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Core", "App", "Tools"]);
}

#[test]
fn cycles_abort_before_anything_is_written() {
    let (_dir, root) = make_project(MANIFEST);
    fs::write(
        root.join("Assets/Core/Core.asmdef"),
        r#"{ "name": "Core", "references": ["App"] }"#,
    )
    .unwrap();
    let context = GenerationContext::discover(&root).unwrap();

    let err = context.generate().expect_err("cycle");
    match err {
        ProjgenError::CircularDependency { remaining } => {
            assert_eq!(remaining, vec!["App".to_string(), "Core".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!root.join("Generated").exists());
}
