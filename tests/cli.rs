use assert_cmd::Command;
use std::fs;

const INSTANCE: &str = r#"
nTeams=4;

dist= [0 745 665 929
 745 0 80 337
 665 80 0 380
 929 337 380 0];

opponents=[ 4 3 -2 -1
 3 -4 -1 2
 2 -1 4 -3
 -4 -3 2 1
 -3 4 1 -2
 -2 1 -4 3];
"#;

#[test]
fn solves_a_small_instance_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let instance = dir.path().join("umps4.txt");
    fs::write(&instance, INSTANCE).unwrap();
    let output = dir.path().join("umps4_solution.txt");

    let assert = Command::cargo_bin("tup")
        .unwrap()
        .arg(&instance)
        .arg("2")
        .arg("1")
        .arg("--output")
        .arg(&output)
        .arg("--time-limit")
        .arg("120")
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("best_cost:"));
    assert!(stdout.contains("proved_optimal: true"));

    let written = fs::read_to_string(&output).unwrap();
    let mut lines = written.lines();
    // One umpire number per game, then the separator and the table.
    let first = lines.next().unwrap();
    assert_eq!(first.matches(',').count(), 12);
    assert_eq!(lines.next(), Some("---"));
}
