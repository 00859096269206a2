mod support;

use common::types::{ExecutionState, FileConfig, FileOperation};
use support::{def, engine, file_node, initial_vars, no_input_bridge};

fn escaping_write_config() -> FileConfig {
    FileConfig {
        operation: FileOperation::Write,
        source_path: None,
        target_path: Some("../../etc/passwd".to_string()),
        content: Some("pwned".to_string()),
        encoding: "utf-8".to_string(),
        overwrite: true,
        require_project_folder: true,
    }
}

#[tokio::test]
async fn write_outside_project_folder_is_rejected() {
    let project_folder = tempfile::tempdir().unwrap();
    let def = def(vec![file_node("f1", escaping_write_config())], vec![]);

    let result = engine(no_input_bridge())
        .run_definition(def, initial_vars(&[]), project_folder.path().to_path_buf())
        .await;

    assert_eq!(result.state, ExecutionState::Failed);
    let message = result.error.unwrap();
    assert!(message.starts_with("ERR_VALIDATION"), "unexpected error: {message}");
    assert!(message.contains("outside project folder"), "unexpected error: {message}");

    // the escape target must not actually have been written
    assert!(!project_folder.path().join("../../etc/passwd").exists());
}

#[tokio::test]
async fn write_inside_project_folder_succeeds() {
    let project_folder = tempfile::tempdir().unwrap();
    let cfg = FileConfig {
        operation: FileOperation::Write,
        source_path: None,
        target_path: Some("nested/out.txt".to_string()),
        content: Some("hello".to_string()),
        encoding: "utf-8".to_string(),
        overwrite: true,
        require_project_folder: true,
    };
    let def = def(vec![file_node("f1", cfg)], vec![]);

    let result = engine(no_input_bridge())
        .run_definition(def, initial_vars(&[]), project_folder.path().to_path_buf())
        .await;

    assert_eq!(result.state, ExecutionState::Succeeded);
    assert_eq!(
        std::fs::read_to_string(project_folder.path().join("nested/out.txt")).unwrap(),
        "hello"
    );
}
