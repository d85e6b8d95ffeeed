// tests/script_rules.rs

//! The config-driven shell rules: template expansion, a passing copy rule,
//! rule chaining through provided tags, and the failure path.

mod common;

use std::error::Error;
use std::fs;

use common::{make_tree, RecordingDashboard, TaskLog};
use tagdag::config::model::RuleConfig;
use tagdag::driver::Driver;
use tagdag::exec::{expand_template, ScriptActionFactory, ScriptRule};
use tagdag::tag::Tag;

type TestResult = Result<(), Box<dyn Error>>;

fn rule_config(cmd: &str) -> RuleConfig {
    RuleConfig {
        on: Tag::default_tag(),
        pattern: None,
        cmd: cmd.to_string(),
        outputs: vec![],
        provides: vec![],
        silent: false,
    }
}

#[test]
fn templates_expand_known_placeholders() -> TestResult {
    let vars = &[("NAME", "hello"), ("DIR", "sub"), ("IN", "/abs/hello.txt")];
    assert_eq!(expand_template("${NAME}.o", vars)?, "hello.o");
    assert_eq!(
        expand_template("${DIR}/${NAME}.o", vars)?,
        "sub/hello.o"
    );
    assert_eq!(expand_template("cp ${IN} out", vars)?, "cp /abs/hello.txt out");
    assert_eq!(expand_template("no placeholders", vars)?, "no placeholders");
    Ok(())
}

#[test]
fn templates_reject_unknown_and_unterminated_placeholders() {
    let vars = &[("NAME", "hello")];
    let err = expand_template("${TYPO}.o", vars).unwrap_err();
    assert!(format!("{err:#}").contains("unknown placeholder"));

    let err = expand_template("${NAME", vars).unwrap_err();
    assert!(format!("{err:#}").contains("unterminated"));
}

#[tokio::test]
async fn copy_rule_produces_output_under_tmp() -> TestResult {
    let td = tempfile::tempdir()?;
    let src = td.path().join("src");
    let tmp = td.path().join("tmp");
    make_tree(&src, &["hello.txt"]);

    let mut cfg = rule_config("cp ${IN} ${OUT}");
    cfg.pattern = Some("*.txt".to_string());
    cfg.outputs = vec!["${NAME}.copy".to_string()];
    let rule = ScriptRule::from_config("copy", &cfg)?;

    let log = TaskLog::default();
    let mut driver = Driver::new(
        Box::new(RecordingDashboard::new(log.clone())),
        src,
        tmp.clone(),
        2,
    )?;
    driver.add_action_factory(Box::new(ScriptActionFactory::new(rule)));

    driver.start()?;
    driver.run(true).await?;

    let copied = tmp.join("hello.copy");
    assert!(copied.is_file());
    assert_eq!(fs::read_to_string(copied)?, "hello.txt");
    assert!(log
        .for_noun("hello.txt")
        .iter()
        .any(|l| l.ends_with("passed")));
    Ok(())
}

#[tokio::test]
async fn rules_chain_through_provided_tags() -> TestResult {
    let td = tempfile::tempdir()?;
    let src = td.path().join("src");
    let tmp = td.path().join("tmp");
    make_tree(&src, &["hello.txt"]);

    let mut first = rule_config("cp ${IN} ${OUT}");
    first.pattern = Some("*.txt".to_string());
    first.outputs = vec!["${NAME}.upper".to_string()];
    first.provides = vec![Tag::new("upper")];

    let mut second = rule_config("cp ${IN} ${OUT}");
    second.on = Tag::new("upper");
    second.outputs = vec!["${NAME}.final".to_string()];

    let log = TaskLog::default();
    let mut driver = Driver::new(
        Box::new(RecordingDashboard::new(log.clone())),
        src,
        tmp.clone(),
        2,
    )?;
    driver.add_action_factory(Box::new(ScriptActionFactory::new(ScriptRule::from_config(
        "first", &first,
    )?)));
    driver.add_action_factory(Box::new(ScriptActionFactory::new(ScriptRule::from_config(
        "second", &second,
    )?)));

    driver.start()?;
    driver.run(true).await?;

    // first: hello.txt -> tmp/hello.upper (tagged "upper")
    // second: hello.upper -> tmp/hello.final
    assert!(tmp.join("hello.upper").is_file());
    assert!(tmp.join("hello.final").is_file());
    assert_eq!(fs::read_to_string(tmp.join("hello.final"))?, "hello.txt");
    Ok(())
}

#[tokio::test]
async fn failing_command_blocks_and_logs_exit_code() -> TestResult {
    let td = tempfile::tempdir()?;
    let src = td.path().join("src");
    make_tree(&src, &["hello.txt"]);

    let rule = ScriptRule::from_config("fail", &rule_config("exit 3"))?;

    let log = TaskLog::default();
    let mut driver = Driver::new(
        Box::new(RecordingDashboard::new(log.clone())),
        src,
        td.path().join("tmp"),
        1,
    )?;
    driver.add_action_factory(Box::new(ScriptActionFactory::new(rule)));

    driver.start()?;
    driver.run(true).await?;

    assert_eq!(driver.completed_count(), 1);
    let lines = log.for_noun("hello.txt");
    assert!(lines.iter().any(|l| l.contains("exit code 3")));
    assert!(lines.iter().any(|l| l.ends_with("blocked")));

    drop(driver);
    assert!(log
        .for_noun("hello.txt")
        .iter()
        .any(|l| l.ends_with("failed")));
    Ok(())
}
