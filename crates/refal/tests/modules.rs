//! Module import: private subtrees, cloning, recursion, file resolution.

use std::{fs, io};

use refal::{
    CollectMessages, Machine, RunConfig, Severity, SyntaxError, TranslateError, TranslatorConfig,
    ValueKind,
};
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, text: &str) {
    fs::write(dir.path().join(name), text).expect("test file is written");
}

fn translate(dir: &TempDir, main: &str) -> (Machine, CollectMessages, Result<(), TranslateError>) {
    let mut machine = Machine::new();
    let mut sink = CollectMessages::new();
    let result = machine.translate_file(
        &TranslatorConfig::default(),
        &dir.path().join(main),
        &mut sink,
    );
    (machine, sink, result)
}

fn run(machine: &mut Machine, sink: &mut CollectMessages) -> String {
    let entry = machine.entry().expect("the entry function is defined");
    let mut out = Vec::new();
    let mut input = io::empty();
    machine
        .run(&RunConfig::default(), entry, &mut out, &mut input, sink)
        .expect("the program runs");
    String::from_utf8(out).expect("output is UTF-8")
}

#[test]
fn imported_function_is_cloned_into_the_global_scope() {
    let dir = TempDir::new().unwrap();
    write(&dir, "m.ref", "Greet = <Prout 'hi'>;\n");
    write(&dir, "main.ref", "m: Greet;\nGo = <Greet>;\n");
    let (mut machine, mut sink, result) = translate(&dir, "main.ref");
    result.expect("the import translates");

    // The module name resolves to the namespace placeholder...
    let module = machine.ids.get_value("m");
    assert_eq!(module.kind, ValueKind::Enum);
    assert_eq!(module.index, 0);
    // ...its private subtree holds the function...
    let m = machine.ids.find_first(u32::from('m')).expect("module node");
    let space = machine.ids.find_next(m, u32::from(' ')).expect("private edge");
    let mut inside = machine.ids.find_at(space, u32::from('G')).expect("Greet in the module");
    for chr in "reet".chars() {
        inside = machine.ids.find_next(inside, chr as u32).expect("Greet in the module");
    }
    let private = machine.ids.value(inside);
    assert_eq!(private.kind, ValueKind::ByteCode);
    // ...and the import cloned the same value to the top level.
    assert_eq!(machine.ids.get_value("Greet"), private);

    assert_eq!(run(&mut machine, &mut sink), "hi\n");
}

#[test]
fn builtins_are_visible_inside_modules_without_imports() {
    let dir = TempDir::new().unwrap();
    write(&dir, "m.ref", "Twice { e.X = <Mul 2 <Numb e.X>>; };\n");
    write(&dir, "main.ref", "m: Twice;\nGo = <Prout <Twice '21'>>;\n");
    let (mut machine, mut sink, result) = translate(&dir, "main.ref");
    result.expect("the import translates");
    assert_eq!(run(&mut machine, &mut sink), "42\n");
}

#[test]
fn cyrillic_module_files_resolve() {
    let dir = TempDir::new().unwrap();
    write(&dir, "м.реф", "Привет = <Prout 'привет'>;\n");
    write(&dir, "main.ref", "м: Привет;\nGo = <Привет>;\n");
    let (mut machine, mut sink, result) = translate(&dir, "main.ref");
    result.expect("the import translates");
    assert_eq!(run(&mut machine, &mut sink), "привет\n");
}

#[test]
fn a_name_the_module_does_not_export_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(&dir, "m.ref", "Greet = <Prout 'hi'>;\n");
    write(&dir, "main.ref", "m: Missing;\nGo = <Greet>;\n");
    let (_, sink, result) = translate(&dir, "main.ref");
    match result {
        Err(TranslateError::Syntax { detail, .. }) => {
            assert_eq!(detail, SyntaxError::NotDefinedInModuleRecursive);
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
    assert!(sink.contains("not defined in the module"));
}

#[test]
fn mutually_recursive_imports_are_detected() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.ref", "b: Bf;\nAf = <Prout 'a'>;\n");
    write(&dir, "b.ref", "a: Af;\nBf = <Prout 'b'>;\n");
    write(&dir, "main.ref", "a: Af;\nGo = <Af>;\n");
    let (_, sink, result) = translate(&dir, "main.ref");
    match result {
        Err(TranslateError::Syntax { detail, .. }) => {
            assert_eq!(detail, SyntaxError::NotDefinedInModuleRecursive);
        }
        other => panic!("expected the recursion error, got {other:?}"),
    }
    assert!(sink.contains("mutually recursive"));
}

#[test]
fn a_missing_module_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(&dir, "main.ref", "nowhere: X;\nGo = 1;\n");
    let (_, sink, result) = translate(&dir, "main.ref");
    match result {
        Err(TranslateError::Syntax { detail, .. }) => {
            assert_eq!(detail, SyntaxError::InvalidModuleName);
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
    assert!(sink.count(Severity::Critical) >= 1);
    assert!(sink.contains("module source text is not available"));
}

#[test]
fn a_module_identifier_without_a_function_warns() {
    let dir = TempDir::new().unwrap();
    write(&dir, "m.ref", "Greet = <Prout 'hi'>;\n");
    write(&dir, "main.ref", "m: Greet;\nGo = <Prout m>;\n");
    let (_, sink, result) = translate(&dir, "main.ref");
    result.expect("the orphan module identifier is only a warning");
    assert!(sink.count(Severity::Warning) >= 1);
    assert!(sink.contains("module identifier without a function"));
}

#[test]
fn qualified_lookup_reaches_module_functions() {
    let dir = TempDir::new().unwrap();
    write(&dir, "m.ref", "Greet = <Prout 'hi'>;\nWave = <Prout 'o/'>;\n");
    // Wave is not imported, but remains reachable as `m Wave`.
    write(&dir, "main.ref", "m: Greet;\nGo = <m Wave>;\n");
    let (mut machine, mut sink, result) = translate(&dir, "main.ref");
    result.expect("the qualified call translates");
    assert_eq!(machine.ids.get_value("Wave"), refal::Value::UNDEFINED);
    assert_eq!(run(&mut machine, &mut sink), "o/\n");
}

#[test]
fn a_shared_module_is_translated_once() {
    let dir = TempDir::new().unwrap();
    write(&dir, "shared.ref", "Hi = <Prout 'hi'>;\n");
    write(&dir, "a.ref", "shared: Hi;\nAf = <Hi>;\n");
    write(&dir, "main.ref", "a: Af;\nshared: Hi;\nGo = <Af> <Hi>;\n");
    let (mut machine, mut sink, result) = translate(&dir, "main.ref");
    result.expect("the shared import translates");
    assert_eq!(run(&mut machine, &mut sink), "hi\nhi\n");
}

#[test]
fn invalid_utf8_in_a_source_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.ref"), [b'G', b'o', 0xff, 0xfe]).unwrap();
    let (_, _, result) = translate(&dir, "bad.ref");
    match result {
        Err(TranslateError::Syntax { detail, .. }) => {
            assert_eq!(detail, SyntaxError::InvalidUtf8);
        }
        other => panic!("expected the UTF-8 error, got {other:?}"),
    }
}

#[test]
fn a_missing_main_file_is_a_critical_error() {
    let dir = TempDir::new().unwrap();
    let (_, sink, result) = translate(&dir, "absent.ref");
    assert!(matches!(result, Err(TranslateError::Io(_))));
    assert!(sink.count(Severity::Critical) >= 1);
}
