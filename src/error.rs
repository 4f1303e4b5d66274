#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsmError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
}

impl AsmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self { kind, message: message.into(), span }
    }

    pub fn duplicate_label(label: &str, span: Span) -> Self {
        Self::new(
            ErrorKind::DuplicateLabel,
            format!("Label {} already defined", label),
            span,
        )
    }

    pub fn undefined_label(label: &str, span: Span) -> Self {
        Self::new(
            ErrorKind::UndefinedLabel,
            format!("Undefined label: {}", label),
            span,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    UnterminatedString,
    InvalidEscapeSequence,
    InvalidDecimalLiteral,
    InvalidHexLiteral,
    InvalidRegister,
    UnexpectedCharacter,

    ExpectedInstructionAfterIndent,
    ExpectedOperand,
    UnexpectedToken,
    TooManyOperands,
    TooFewOperands,
    InvalidOperandType,
    Gr0AsIndex,
    IllegalMnemonic,
    InvalidLabelSyntax,

    DuplicateLabel,
    UndefinedLabel,
    NoStartInstruction,
    NoEndInstruction,
    InstructionOutsideBlock,
    InvalidDsCount,
    MissingLabel,
    AddressOverflow,
}

impl std::fmt::Display for AsmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ERROR (line {}:{}): {}",
            self.span.line, self.span.col, self.message
        )
    }
}
