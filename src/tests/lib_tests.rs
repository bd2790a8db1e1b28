use super::{parse_command, CliParseError, Command, RunArgs, Scope};
use crate::logging::LogLevel;
use std::path::PathBuf;

fn args(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|arg| (*arg).to_owned()).collect()
}

#[test]
fn parse_defaults_to_help_without_command() {
    let cmd = parse_command(Vec::<String>::new()).expect("parse should succeed");
    assert_eq!(cmd, Command::Help);
}

#[test]
fn parse_package_with_options_and_go_flags() {
    let cmd = parse_command(args(&[
        "package", "--dir", "/src/app", "--func", "TestA", "--func", "TestB", "--cover",
        "--log", "debug", "--", "-v", "-count=1",
    ]))
    .expect("parse should succeed");

    let mut expected = RunArgs::new(Scope::Package);
    expected.dir = Some(PathBuf::from("/src/app"));
    expected.functions = vec!["TestA".to_owned(), "TestB".to_owned()];
    expected.cover = true;
    expected.log_level = LogLevel::Debug;
    expected.go_flags = vec!["-v".to_owned(), "-count=1".to_owned()];
    assert_eq!(cmd, Command::Run(expected));
}

#[test]
fn go_flags_after_separator_are_not_interpreted() {
    let cmd = parse_command(args(&["workspace", "--", "--dir", "-h"])).expect("parse");
    let Command::Run(run) = cmd else {
        panic!("expected a run command");
    };
    assert_eq!(run.scope, Scope::Workspace);
    assert_eq!(run.dir, None);
    assert_eq!(run.go_flags, vec!["--dir".to_owned(), "-h".to_owned()]);
}

#[test]
fn parse_file_scope_requires_a_path() {
    let cmd = parse_command(args(&["file", "pkg/a_test.go", "--bench"])).expect("parse");
    let Command::Run(run) = cmd else {
        panic!("expected a run command");
    };
    assert_eq!(run.scope, Scope::File(PathBuf::from("pkg/a_test.go")));
    assert!(run.bench);

    assert_eq!(
        parse_command(args(&["file", "--dir", "x"])),
        Err(CliParseError::MissingFile)
    );
    assert_eq!(parse_command(args(&["file"])), Err(CliParseError::MissingFile));
}

#[test]
fn parse_plan_wraps_the_scope() {
    let cmd = parse_command(args(&["plan", "bench", "--gopath", "--events"])).expect("parse");
    let mut expected = RunArgs::new(Scope::Bench);
    expected.gopath = true;
    expected.events = true;
    assert_eq!(cmd, Command::Plan(expected));
    assert_eq!(
        parse_command(args(&["plan"])),
        Err(CliParseError::MissingValue("plan"))
    );
}

#[test]
fn parse_rejects_unknown_input() {
    assert_eq!(
        parse_command(args(&["everything"])),
        Err(CliParseError::UnknownScope("everything".to_owned()))
    );
    assert_eq!(
        parse_command(args(&["package", "--verbose"])),
        Err(CliParseError::UnknownArgument("--verbose".to_owned()))
    );
    assert_eq!(
        parse_command(args(&["package", "--dir"])),
        Err(CliParseError::MissingValue("--dir"))
    );
    assert_eq!(
        parse_command(args(&["package", "--log", "loud"])),
        Err(CliParseError::InvalidLogLevel("loud".to_owned()))
    );
}

#[test]
fn help_flags_anywhere_before_separator() {
    assert_eq!(parse_command(args(&["-h"])), Ok(Command::Help));
    assert_eq!(
        parse_command(args(&["package", "--help"])),
        Ok(Command::Help)
    );
    assert_eq!(parse_command(args(&["plan", "--help"])), Ok(Command::Help));
}
