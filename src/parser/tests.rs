use super::*;
use crate::lexer::tokenize;

fn parse_ok(input: &str) -> Vec<ParsedLine> {
    let lexed = tokenize(input);
    assert!(lexed.errors.is_empty(), "lexer errors: {:?}", lexed.errors);
    let parsed = parse_lines(&lexed.lines);
    assert!(parsed.errors.is_empty(), "parser errors: {:?}", parsed.errors);
    parsed.lines
}

#[test]
fn label_only_line() {
    let lines = parse_ok("LOOP\n");
    assert_eq!(lines[0].label.as_deref(), Some("LOOP"));
    assert_eq!(lines[0].mnemonic, None);
}

#[test]
fn mnemonic_only_no_leading_whitespace() {
    let lines = parse_ok("RET\n");
    assert_eq!(lines[0].label, None);
    assert_eq!(lines[0].mnemonic.as_deref(), Some("RET"));
}

#[test]
fn labeled_instruction() {
    let lines = parse_ok("MAIN START\n");
    assert_eq!(lines[0].label.as_deref(), Some("MAIN"));
    assert_eq!(lines[0].mnemonic.as_deref(), Some("START"));
}

#[test]
fn indented_instruction_with_operands() {
    let lines = parse_ok("     LD GR0,GR1\n");
    assert_eq!(lines[0].label, None);
    assert_eq!(lines[0].mnemonic.as_deref(), Some("LD"));
    assert_eq!(lines[0].operands, vec!["GR0", "GR1"]);
}

#[test]
fn indented_line_requires_a_mnemonic() {
    let result = parse_lines(&tokenize("     NOTAMNEMONIC\n").lines);
    assert!(result.errors.iter().any(|e| e.kind == ErrorKind::IllegalMnemonic));
}

#[test]
fn indented_line_starting_with_operand_is_an_error() {
    let result = parse_lines(&tokenize("     GR0,GR1\n").lines);
    assert!(result.errors.iter().any(|e| e.kind == ErrorKind::ExpectedInstructionAfterIndent));
}

#[test]
fn literal_operand_reconstructed_with_equals_prefix() {
    let lines = parse_ok("LD GR0,=10\n");
    assert_eq!(lines[0].operands, vec!["GR0", "=10"]);
}

#[test]
fn hex_literal_operand() {
    let lines = parse_ok("LD GR0,=#00FF\n");
    assert_eq!(lines[0].operands, vec!["GR0", "=#00FF"]);
}

#[test]
fn string_operand_keeps_quotes() {
    let lines = parse_ok("DC 'HI'\n");
    assert_eq!(lines[0].operands, vec!["'HI'"]);
}

#[test]
fn three_operand_regaddr_with_index() {
    let lines = parse_ok("LD GR0,DATA,GR1\n");
    assert_eq!(lines[0].operands, vec!["GR0", "DATA", "GR1"]);
}

#[test]
fn label_followed_by_unknown_token_is_an_error() {
    let result = parse_lines(&tokenize("FOO GR0\n").lines);
    assert!(result.errors.iter().any(|e| e.kind == ErrorKind::UnexpectedToken));
}

#[test]
fn empty_line_parses_to_all_none() {
    let lines = parse_ok("\n");
    assert_eq!(lines[0].label, None);
    assert_eq!(lines[0].mnemonic, None);
    assert!(lines[0].operands.is_empty());
}
