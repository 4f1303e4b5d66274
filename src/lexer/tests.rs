use super::*;

fn tokenize_ok(src: &str) -> Vec<LexedLine> {
    let result = tokenize(src);
    assert!(result.errors.is_empty(), "lexer errors: {:?}", result.errors);
    result.lines
}

#[test]
fn recognizes_registers() {
    let lines = tokenize_ok("LD GR0,GR1\n");
    let kinds: Vec<_> = lines[0].tokens.iter().map(|t| t.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Identifier("LD".into()),
            TokenKind::Register(0),
            TokenKind::Comma,
            TokenKind::Register(1),
        ]
    );
}

#[test]
fn register_lookalike_is_a_label() {
    let lines = tokenize_ok("GR0X DS 1\n");
    assert_eq!(lines[0].tokens[0].kind, TokenKind::Identifier("GR0X".into()));
}

#[test]
fn invalid_register_number_is_an_error() {
    let result = tokenize("LD GR9,GR1\n");
    assert!(result.errors.iter().any(|e| e.kind == ErrorKind::InvalidRegister));
}

#[test]
fn decimal_and_hex_literals() {
    let lines = tokenize_ok("LD GR0,=10\nLD GR1,=#00FF\n");
    assert_eq!(lines[0].tokens[4].kind, TokenKind::Decimal(10));
    assert_eq!(lines[1].tokens[4].kind, TokenKind::Hex(0x00FF));
}

#[test]
fn signed_decimal() {
    let lines = tokenize_ok("DC -5\n");
    assert_eq!(lines[0].tokens[1].kind, TokenKind::Decimal(-5));
}

#[test]
fn quoted_string_with_doubled_quote_escape() {
    let lines = tokenize_ok("DC 'IT''S'\n");
    assert_eq!(lines[0].tokens[1].kind, TokenKind::QuotedString("IT'S".into()));
}

#[test]
fn unterminated_string_is_an_error() {
    let result = tokenize("DC 'ABC\n");
    assert!(result.errors.iter().any(|e| e.kind == ErrorKind::UnterminatedString));
}

#[test]
fn comment_is_dropped_from_tokens() {
    let lines = tokenize_ok("    RET  ; done\n");
    assert_eq!(lines[0].tokens.len(), 1);
}

#[test]
fn leading_whitespace_flag_set_only_when_indented() {
    let lines = tokenize_ok("MAIN START\n     LD GR0,=1\n");
    assert!(!lines[0].leading_whitespace);
    assert!(lines[1].leading_whitespace);
}

#[test]
fn literal_operand_tokens_are_equals_then_value() {
    let lines = tokenize_ok("LD GR0,=LABEL\n");
    assert_eq!(lines[0].tokens[3].kind, TokenKind::Equals);
    assert_eq!(lines[0].tokens[4].kind, TokenKind::Identifier("LABEL".into()));
}

#[test]
fn crlf_and_cr_line_endings_both_split_lines() {
    let lines = tokenize_ok("NOP\r\nNOP\rNOP\n");
    assert_eq!(lines.len(), 3);
}

#[test]
fn unexpected_character_is_reported() {
    let result = tokenize("LD GR0,@\n");
    assert!(result.errors.iter().any(|e| e.kind == ErrorKind::UnexpectedCharacter));
}
