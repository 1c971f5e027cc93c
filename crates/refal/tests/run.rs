//! End-to-end interpreter checks: translate, run, observe the output.

use std::io;

use refal::{CollectMessages, Machine, RunConfig, RunError, TranslatorConfig};

fn run_with(cfg: &RunConfig, source: &str) -> (Result<(), RunError>, String, CollectMessages) {
    let mut machine = Machine::new();
    let mut sink = CollectMessages::new();
    machine
        .translate_text(&TranslatorConfig::default(), source, &mut sink)
        .unwrap_or_else(|err| panic!("translation failed: {err}\nsource: {source}"));
    let entry = machine.entry().expect("the entry function is defined");
    let mut out = Vec::new();
    let mut input = io::empty();
    let result = machine.run(cfg, entry, &mut out, &mut input, &mut sink);
    (result, String::from_utf8(out).expect("output is UTF-8"), sink)
}

fn run(source: &str) -> (Result<(), RunError>, String, CollectMessages) {
    run_with(&RunConfig::default(), source)
}

fn output(source: &str) -> String {
    let (result, out, sink) = run(source);
    result.unwrap_or_else(|err| {
        panic!("run failed: {err}\nmessages: {:?}\nsource: {source}", sink.messages)
    });
    out
}

#[test]
fn hello_prints_through_the_builtin() {
    assert_eq!(output("Go = <Prout \"Hello\">;"), "Hello\n");
}

#[test]
fn block_sentences_fall_through_in_order() {
    assert_eq!(output("F { 'a' = 1; 'b' = 2; };\nGo = <Prout <F 'a'>>;"), "1\n");
    assert_eq!(output("F { 'a' = 1; 'b' = 2; };\nGo = <Prout <F 'b'>>;"), "2\n");
}

#[test]
fn exhausted_sentences_report_recognition_impossible() {
    let (result, _, sink) = run("F { 'a' = 1; 'b' = 2; };\nGo = <F 'c'>;");
    assert!(matches!(result, Err(RunError::RecognitionImpossible)));
    assert!(sink.contains("recognition impossible"));
    assert!(sink.contains("F"), "the failing function is named");
}

#[test]
fn duplicated_evar_copies_and_moves() {
    assert_eq!(output("Dup { e.X = e.X e.X; };\nGo = <Prout <Dup 'ab'>>;"), "abab\n");
}

#[test]
fn forward_referenced_function_runs() {
    assert_eq!(output("Go = <F>;\nF = <Prout 'ok'>;"), "ok\n");
}

#[test]
fn tail_recursion_stops_at_the_step_limit_in_constant_space() {
    let cfg = RunConfig { steps_limit: Some(500), ..RunConfig::default() };
    let (result, _, sink) = run_with(&cfg, "Loop { = <Loop>; };\nGo = <Loop>;");
    assert!(matches!(result, Err(RunError::StepLimit)));
    assert!(sink.contains("step limit"));
}

#[test]
fn nested_calls_evaluate_innermost_first() {
    assert_eq!(output("Go = <Prout <Add <Mul 6 7> 0>>;"), "42\n");
}

#[test]
fn sibling_calls_evaluate_left_to_right() {
    assert_eq!(
        output("Go = <Prout <Symb <Add 1 2>> <Symb <Add 3 4>>>;"),
        "37\n"
    );
}

#[test]
fn brackets_group_terms_in_the_view() {
    assert_eq!(output("Go = <Prout ('a') 'b'>;"), "(a)b\n");
}

#[test]
fn tvar_matches_a_symbol_or_a_whole_group() {
    assert_eq!(output("First { t.1 e.2 = t.1; };\nGo = <Prout <First ('ab') 'c'>>;"), "(ab)\n");
    assert_eq!(output("First { t.1 e.2 = t.1; };\nGo = <Prout <First 'x' 'yz'>>;"), "x\n");
}

#[test]
fn svar_does_not_match_a_group() {
    let (result, _, _) = run("F s.1 = s.1;\nGo = <F ('a')>;");
    assert!(matches!(result, Err(RunError::RecognitionImpossible)));
}

#[test]
fn repeated_svar_requires_equal_symbols() {
    let source = "Pal { = 'y'; s.1 = 'y'; s.1 e.2 s.1 = <Pal e.2>; e.3 = 'n'; };\nGo = <Prout <Pal 'abba'>>;";
    assert_eq!(output(source), "y\n");
    let source = "Pal { = 'y'; s.1 = 'y'; s.1 e.2 s.1 = <Pal e.2>; e.3 = 'n'; };\nGo = <Prout <Pal 'abca'>>;";
    assert_eq!(output(source), "n\n");
}

#[test]
fn repeated_evar_requires_an_equal_sequence() {
    let source = "Eq { e.1 e.1 = 'y'; e.2 = 'n'; };\nGo = <Prout <Eq 'abab'>>;";
    assert_eq!(output(source), "y\n");
    let source = "Eq { e.1 e.1 = 'y'; e.2 = 'n'; };\nGo = <Prout <Eq 'aba'>>;";
    assert_eq!(output(source), "n\n");
}

#[test]
fn evar_lengthening_respects_bracket_nesting() {
    // e.1 must not swallow half of a group: ('bc') stays one term.
    assert_eq!(
        output("F e.1 s.2 = s.2;\nGo = <Prout <F 'a' ('bc') 'd'>>;"),
        "d\n"
    );
    assert_eq!(
        output("Inner (e.1) = e.1;\nGo = <Prout <Inner ('bc')>>;"),
        "bc\n"
    );
}

#[test]
fn arithmetic_builtins_compose() {
    assert_eq!(output("Go = <Prout <Sub 10 3> ' ' <Div 9 2> ' ' <Mod 9 2>>;"), "7 4 1\n");
    assert_eq!(output("Go = <Prout <Compare 1 2> <Compare 2 2> <Compare 3 2>>;"), "-0+\n");
}

#[test]
fn conversion_builtins_compose() {
    assert_eq!(output("Go = <Prout <Numb '107'>>;"), "107\n");
    assert_eq!(output("Go = <Prout <Symb 42>>;"), "42\n");
    assert_eq!(output("Go = <Prout <Chr 1092 97>>;"), "фa\n");
    assert_eq!(output("Go = <Prout <Ord 'a'>>;"), "97\n");
    assert_eq!(output("Go = <Prout <Type 'q'>>;"), "Lq\n");
}

#[test]
fn division_error_yields_zero() {
    assert_eq!(output("Go = <Prout <Div 1 0> <Mod 1 0>>;"), "0 0\n");
}

#[test]
fn print_keeps_the_view_while_prout_clears_it() {
    assert_eq!(output("Go = <Prout <Print 'aa'>>;"), "aa\naa\n");
}

#[test]
fn identifiers_print_by_name() {
    assert_eq!(output("Flag;\nGo = <Prout Flag>;"), "Flag\n");
}

#[test]
fn recursion_computes_a_real_function() {
    // Unary counting: replicate 'x' n times via tail recursion.
    let source = "\
Rep { 0 e.1 = e.1; s.N e.1 = <Rep <Sub s.N 1> e.1 'x'>; };\n\
Go = <Prout <Rep 4>>;";
    assert_eq!(output(source), "xxxx\n");
}

#[test]
fn the_view_field_survives_between_calls() {
    // The outer call's remaining arguments stay in place while the inner
    // call rewrites its own range.
    assert_eq!(output("Go = <Prout 'a' <Add 1 1> 'b'>;"), "a2b\n");
}
