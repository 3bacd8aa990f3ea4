use logos::Logos;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("[line {line}] Error: Unexpected character '{found}'.")]
    UnexpectedCharacter { found: String, line: usize },
    #[error("[line {line}] Error: Unterminated string.")]
    UnterminatedString { line: usize },
    #[error("[line {line}] Error: Unterminated comment.")]
    UnterminatedComment { line: usize },
}

/// Mutable state threaded through the logos callbacks.
#[derive(Debug, Default)]
pub struct LexState {
    pub line: usize,
    pub errors: Vec<LexError>,
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

fn quoted(lex: &mut logos::Lexer<TokenKind>) -> bool {
    lex.extras.line += count_newlines(lex.slice());
    true
}

fn unterminated_string(lex: &mut logos::Lexer<TokenKind>) -> logos::Skip {
    let line = lex.extras.line;
    lex.extras.line += count_newlines(lex.slice());
    lex.extras.errors.push(LexError::UnterminatedString { line });
    logos::Skip
}

// The rest of the input is swallowed: a comment that never closes hides everything after it.
fn unterminated_comment(lex: &mut logos::Lexer<TokenKind>) -> logos::Skip {
    let line = lex.extras.line;
    let rest = lex.remainder();
    lex.extras.line += count_newlines(rest);
    lex.bump(rest.len());
    lex.extras.errors.push(LexError::UnterminatedComment { line });
    logos::Skip
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(extras = LexState)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenKind {
    #[regex(r"\n", |lex| {
        lex.extras.line += 1;
        logos::Skip
    })]
    Newline,
    #[regex(r"\(\*([^*]|\*+[^*)])*\*+\)", |lex| {
        lex.extras.line += count_newlines(lex.slice());
        logos::Skip
    })]
    Comment,
    #[token("(*", unterminated_comment)]
    UnterminatedComment,

    // Keywords
    #[token("MODULE")]
    Module,
    #[token("FROM")]
    From,
    #[token("IMPORT")]
    Import,
    #[token("CONST")]
    Const,
    #[token("VAR")]
    Var,
    #[token("OF")]
    Of,
    #[token("PROCEDURE")]
    Procedure,
    #[token("BEGIN")]
    Begin,
    #[token("RETURN")]
    Return,
    #[token("END")]
    End,
    #[token("CASE")]
    Case,
    #[token("IF")]
    If,
    #[token("THEN")]
    Then,
    #[token("ELSIF")]
    Elsif,
    #[token("ELSE")]
    Else,
    #[token("WHILE")]
    While,
    #[token("FOR")]
    For,
    #[token("TO")]
    To,
    #[token("BY")]
    By,
    #[token("DO")]
    Do,
    #[token("AND")]
    And,
    #[token("OR")]
    Or,
    #[token("NOT")]
    Not,
    #[token("DIV")]
    Div,
    #[token("MOD")]
    Mod,

    // Identifiers and literals
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,
    #[regex(r"[0-9]+\.[0-9]+")]
    #[regex(r"[0-9]+")]
    Number,
    #[regex(r#""[^"]*""#, quoted)]
    #[regex(r"'[^']*'", quoted)]
    Str,
    #[regex(r#""[^"]*"#, unterminated_string)]
    #[regex(r"'[^']*", unterminated_string)]
    UnterminatedStr,

    // Operators
    #[token(":=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("=")]
    Equal,
    #[token("#")]
    Hash,
    #[token("<>")]
    NotEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token("|")]
    Pipe,
    #[token("?")]
    Question,
    #[token("!")]
    Bang,

    /// Synthetic end-of-input marker appended by [`tokenize`].
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TokenKind::Newline => "newline",
            TokenKind::Comment | TokenKind::UnterminatedComment => "comment",
            TokenKind::Module => "MODULE",
            TokenKind::From => "FROM",
            TokenKind::Import => "IMPORT",
            TokenKind::Const => "CONST",
            TokenKind::Var => "VAR",
            TokenKind::Of => "OF",
            TokenKind::Procedure => "PROCEDURE",
            TokenKind::Begin => "BEGIN",
            TokenKind::Return => "RETURN",
            TokenKind::End => "END",
            TokenKind::Case => "CASE",
            TokenKind::If => "IF",
            TokenKind::Then => "THEN",
            TokenKind::Elsif => "ELSIF",
            TokenKind::Else => "ELSE",
            TokenKind::While => "WHILE",
            TokenKind::For => "FOR",
            TokenKind::To => "TO",
            TokenKind::By => "BY",
            TokenKind::Do => "DO",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::Div => "DIV",
            TokenKind::Mod => "MOD",
            TokenKind::Ident => "identifier",
            TokenKind::Number => "number",
            TokenKind::Str | TokenKind::UnterminatedStr => "string",
            TokenKind::Assign => ":=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Equal => "=",
            TokenKind::Hash => "#",
            TokenKind::NotEqual => "<>",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::DotDot => "..",
            TokenKind::Dot => ".",
            TokenKind::Pipe => "|",
            TokenKind::Question => "?",
            TokenKind::Bang => "!",
            TokenKind::Eof => "end of input",
        };
        write!(f, "{}", text)
    }
}

/// Literal payload carried by number and string tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: &str, line: usize) -> Self {
        let literal = match kind {
            // Every number is lexed as floating point; the evaluator re-reads the lexeme.
            TokenKind::Number => lexeme.parse::<f64>().ok().map(Literal::Number),
            TokenKind::Str if lexeme.len() >= 2 => {
                Some(Literal::Text(lexeme[1..lexeme.len() - 1].to_string()))
            }
            _ => None,
        };
        Token {
            kind,
            lexeme: lexeme.to_string(),
            literal,
            line,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::Ident | TokenKind::Number | TokenKind::Str => {
                write!(f, "{} '{}'", self.kind, self.lexeme)
            }
            kind => write!(f, "'{}'", kind),
        }
    }
}

/// Output of a lexing pass: the tokens (always ending in `Eof`) plus any
/// lexical errors met on the way.
#[derive(Debug)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub errors: Vec<LexError>,
}

pub fn tokenize(source: &str) -> Lexed {
    let mut lexer = TokenKind::lexer_with_extras(
        source,
        LexState {
            line: 1,
            errors: Vec::new(),
        },
    );
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let slice = lexer.slice();
        let line = lexer.extras.line;
        match result {
            Ok(TokenKind::Str) => {
                let start_line = line - count_newlines(slice);
                tokens.push(Token::new(TokenKind::Str, slice, start_line));
            }
            Ok(kind) => tokens.push(Token::new(kind, slice, line)),
            Err(()) => {
                let found = slice.to_string();
                lexer
                    .extras
                    .errors
                    .push(LexError::UnexpectedCharacter { found, line });
            }
        }
    }

    let line = lexer.extras.line;
    tokens.push(Token::new(TokenKind::Eof, "", line));
    Lexed {
        tokens,
        errors: std::mem::take(&mut lexer.extras.errors),
    }
}
