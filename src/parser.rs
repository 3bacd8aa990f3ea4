use crate::ast::*;
use crate::lexer::{Token, TokenKind};
use log::debug;
use std::collections::BTreeSet;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("[line {line}] Error{location}: Expected {expected}.")]
    Expected {
        expected: String,
        location: String,
        line: usize,
    },
    #[error("[line {line}] Error{location}: {message}")]
    Invalid {
        message: String,
        location: String,
        line: usize,
    },
}

/// Most values one array dimension or CASE label range may cover.
pub const MAX_RANGE: i128 = 65_536;

fn range_too_large(from: i64, to: i64) -> bool {
    to as i128 - from as i128 >= MAX_RANGE
}

fn location(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => " at end".to_string(),
        _ => format!(" at '{}'", token.lexeme),
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let line = tokens.last().map_or(1, |t| t.line);
            tokens.push(Token::new(TokenKind::Eof, "", line));
        }
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.expected(expected))
        }
    }

    fn expected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError::Expected {
            expected: expected.to_string(),
            location: location(token),
            line: token.line,
        }
    }

    fn invalid(token: &Token, message: impl Into<String>) -> ParseError {
        ParseError::Invalid {
            message: message.into(),
            location: location(token),
            line: token.line,
        }
    }

    /// Parses a whole module: header, imports, declarations, procedures and
    /// the main body, in that order.
    pub fn parse_module(&mut self) -> Result<Block, ParseError> {
        let mut statements = Vec::new();

        if self.matches(TokenKind::Module) {
            let name = self.expect(TokenKind::Ident, "module name")?;
            self.expect(TokenKind::Semicolon, "';' after module name")?;
            statements.push(Stmt::Module(name));
        }

        while self.matches(TokenKind::From) {
            let library = self.expect(TokenKind::Ident, "library name after FROM")?;
            self.expect(TokenKind::Import, "IMPORT")?;
            let mut names = vec![self.expect(TokenKind::Ident, "imported procedure name")?];
            while self.matches(TokenKind::Comma) {
                names.push(self.expect(TokenKind::Ident, "imported procedure name")?);
            }
            self.expect(TokenKind::Semicolon, "';' after import list")?;
            statements.push(Stmt::Import(library, names));
        }

        loop {
            match self.peek().kind {
                TokenKind::Const => {
                    self.advance();
                    self.parse_consts(&mut statements)?;
                }
                TokenKind::Var => {
                    self.advance();
                    self.parse_vars(&mut statements)?;
                }
                TokenKind::Procedure => {
                    let proc = self.parse_procedure()?;
                    statements.push(Stmt::Procedure(Rc::new(proc)));
                }
                _ => break,
            }
        }

        self.expect(TokenKind::Begin, "BEGIN")?;
        let body = self.parse_statements()?;
        self.expect(TokenKind::End, "END at end of module")?;
        self.matches(TokenKind::Ident);
        self.matches(TokenKind::Dot);
        if !self.check(TokenKind::Eof) {
            return Err(Self::invalid(self.peek(), "Unexpected text after end of module."));
        }
        statements.push(Stmt::Main(body));

        debug!("parsed {} top-level statements", statements.len());
        Ok(Block { statements })
    }

    fn parse_consts(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        while self.check(TokenKind::Ident) {
            let name = self.advance();
            self.expect(TokenKind::Equal, "'=' in constant declaration")?;
            let value = self.parse_expr()?;
            self.expect(TokenKind::Semicolon, "';' after constant declaration")?;
            out.push(Stmt::Const(name, value));
        }
        Ok(())
    }

    fn parse_vars(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        while self.check(TokenKind::Ident) {
            let mut names = vec![self.advance()];
            while self.matches(TokenKind::Comma) {
                names.push(self.expect(TokenKind::Ident, "variable name")?);
            }
            self.expect(TokenKind::Colon, "':' after variable name")?;

            // `ARRAY` is optional before the bracketed ranges.
            if self.peek().kind == TokenKind::Ident
                && self.peek().lexeme == "ARRAY"
                && self.peek_next() == TokenKind::LBracket
            {
                self.advance();
            }

            if self.check(TokenKind::LBracket) {
                let dimensions = self.parse_dimensions()?;
                self.expect(TokenKind::Of, "OF after array ranges")?;
                let element = self.expect(TokenKind::Ident, "array element type")?;
                for name in names {
                    out.push(Stmt::VarArray(name, element.clone(), dimensions.clone()));
                }
            } else {
                let declared_type = self.expect(TokenKind::Ident, "type name")?;
                for name in names {
                    out.push(Stmt::Var(VarDecl {
                        name,
                        declared_type: declared_type.clone(),
                    }));
                }
            }
            self.expect(TokenKind::Semicolon, "';' after variable declaration")?;
        }
        Ok(())
    }

    // [1..3][0..4] or [1..3, 0..4]
    fn parse_dimensions(&mut self) -> Result<Dimensions, ParseError> {
        let mut dimensions = Dimensions::new();
        while self.matches(TokenKind::LBracket) {
            loop {
                let start = self.peek().clone();
                let from = self.parse_integer()?;
                self.expect(TokenKind::DotDot, "'..' in array range")?;
                let to = self.parse_integer()?;
                if from > to {
                    return Err(Self::invalid(&start, "Array range is empty."));
                }
                if range_too_large(from, to) {
                    return Err(Self::invalid(&start, "Array range is too large."));
                }
                dimensions.insert(dimensions.len(), (from..=to).collect());
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket, "']' after array range")?;
        }
        Ok(dimensions)
    }

    fn parse_integer(&mut self) -> Result<i64, ParseError> {
        let negative = self.matches(TokenKind::Minus);
        let token = self.expect(TokenKind::Number, "integer")?;
        let value: i64 = token
            .lexeme
            .parse()
            .map_err(|_| Self::invalid(&token, "Expected an integer."))?;
        Ok(if negative { -value } else { value })
    }

    fn parse_procedure(&mut self) -> Result<Procedure, ParseError> {
        self.expect(TokenKind::Procedure, "PROCEDURE")?;
        let name = self.expect(TokenKind::Ident, "procedure name")?;

        let mut params = Vec::new();
        if self.matches(TokenKind::LParen) {
            if !self.check(TokenKind::RParen) {
                loop {
                    self.matches(TokenKind::Var);
                    let mut names = vec![self.expect(TokenKind::Ident, "parameter name")?];
                    while self.matches(TokenKind::Comma) {
                        names.push(self.expect(TokenKind::Ident, "parameter name")?);
                    }
                    self.expect(TokenKind::Colon, "':' after parameter name")?;
                    let declared_type = self.expect(TokenKind::Ident, "parameter type")?;
                    params.extend(names.into_iter().map(|name| VarDecl {
                        name,
                        declared_type: declared_type.clone(),
                    }));
                    if !(self.matches(TokenKind::Semicolon) || self.matches(TokenKind::Comma)) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')' after parameters")?;
        }

        let return_type = if self.matches(TokenKind::Colon) {
            Some(self.expect(TokenKind::Ident, "return type")?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "';' after procedure header")?;

        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Var => {
                    self.advance();
                    self.parse_vars(&mut body)?;
                }
                TokenKind::Procedure => {
                    let nested = self.parse_procedure()?;
                    body.push(Stmt::Procedure(Rc::new(nested)));
                }
                _ => break,
            }
        }

        self.expect(TokenKind::Begin, "BEGIN in procedure")?;
        body.extend(self.parse_statements()?);
        self.expect(TokenKind::End, "END at end of procedure")?;
        if self.check(TokenKind::Ident) {
            let closing = self.advance();
            if closing.lexeme != name.lexeme {
                return Err(Self::invalid(
                    &closing,
                    format!("Procedure {} is closed with END {}.", name.lexeme, closing.lexeme),
                ));
            }
        }
        self.expect(TokenKind::Semicolon, "';' after procedure")?;

        Ok(Procedure {
            name,
            return_type,
            params,
            body,
        })
    }

    fn parse_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        loop {
            while self.matches(TokenKind::Semicolon) {}
            match self.peek().kind {
                TokenKind::End
                | TokenKind::Else
                | TokenKind::Elsif
                | TokenKind::Pipe
                | TokenKind::Eof => break,
                _ => statements.push(self.parse_statement()?),
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let condition = self.parse_expr()?;
                self.expect(TokenKind::Do, "DO after WHILE condition")?;
                let body = self.parse_statements()?;
                self.expect(TokenKind::End, "END after WHILE body")?;
                Ok(Stmt::While(condition, body))
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Case => self.parse_case(),
            TokenKind::Return => {
                self.advance();
                let value = match self.peek().kind {
                    TokenKind::Semicolon | TokenKind::End | TokenKind::Eof => Expr::Empty,
                    _ => self.parse_expr()?,
                };
                Ok(Stmt::Return(value))
            }
            TokenKind::Question => {
                self.advance();
                let (name, indices) = self.parse_io_target()?;
                Ok(Stmt::Read(name, indices))
            }
            TokenKind::Bang => {
                self.advance();
                let (name, indices) = self.parse_io_target()?;
                Ok(Stmt::Write(name, indices))
            }
            TokenKind::Ident => self.parse_ident_statement(),
            _ => Err(self.expected("statement")),
        }
    }

    fn parse_io_target(&mut self) -> Result<(Token, Vec<Expr>), ParseError> {
        let name = self.expect(TokenKind::Ident, "variable name")?;
        let indices = if self.matches(TokenKind::LBracket) {
            self.parse_indices()?
        } else {
            Vec::new()
        };
        Ok((name, indices))
    }

    fn parse_ident_statement(&mut self) -> Result<Stmt, ParseError> {
        let name = self.advance();
        match self.peek().kind {
            TokenKind::Assign => {
                self.advance();
                let value = self.parse_expr()?;
                Ok(Stmt::Assign(Expr::Literal(name), value))
            }
            TokenKind::LBracket => {
                self.advance();
                let indices = self.parse_indices()?;
                self.expect(TokenKind::Assign, "':=' after array element")?;
                let value = self.parse_expr()?;
                Ok(Stmt::Assign(Expr::ArrayAccess(name, indices), value))
            }
            TokenKind::LParen => {
                self.advance();
                let args = self.parse_arguments()?;
                Ok(Stmt::Call(name, args))
            }
            _ => Ok(Stmt::Call(name, Vec::new())),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::If, "IF")?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::Then, "THEN after IF condition")?;
        let then_body = self.parse_statements()?;

        let mut elsifs = Vec::new();
        while self.check(TokenKind::Elsif) {
            let line = self.advance().line;
            let condition = self.parse_expr()?;
            self.expect(TokenKind::Then, "THEN after ELSIF condition")?;
            let body = self.parse_statements()?;
            elsifs.push(Elsif {
                condition,
                body,
                line,
            });
        }

        let else_branch = if self.matches(TokenKind::Else) {
            Some(ElseBranch {
                body: self.parse_statements()?,
            })
        } else {
            None
        };
        self.expect(TokenKind::End, "END after IF")?;
        Ok(Stmt::If(condition, then_body, elsifs, else_branch))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let line = self.expect(TokenKind::For, "FOR")?.line;
        let index = self.expect(TokenKind::Ident, "loop variable")?;
        self.expect(TokenKind::Assign, "':=' after loop variable")?;
        let start = self.parse_expr()?;
        self.expect(TokenKind::To, "TO in FOR statement")?;
        let bound = self.parse_expr()?;
        let step = if self.matches(TokenKind::By) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Do, "DO in FOR statement")?;
        let body = self.parse_statements()?;
        self.expect(TokenKind::End, "END after FOR body")?;
        let init = Stmt::Assign(Expr::Literal(index), start);
        Ok(Stmt::For(Box::new(init), bound, step, body, line))
    }

    fn parse_case(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::Case, "CASE")?;
        let selector = self.expect(TokenKind::Ident, "CASE selector variable")?;
        self.expect(TokenKind::Of, "OF after CASE selector")?;

        let mut branches = Vec::new();
        loop {
            while self.matches(TokenKind::Pipe) {}
            if !(self.check(TokenKind::Number) || self.check(TokenKind::Minus)) {
                break;
            }
            let labels = self.parse_case_labels()?;
            self.expect(TokenKind::Colon, "':' after CASE label")?;
            let body = self.parse_statements()?;
            branches.push(CaseBranch { labels, body });
        }

        let default = if self.matches(TokenKind::Else) {
            self.parse_statements()?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::End, "END after CASE")?;
        Ok(Stmt::Case(selector, branches, default))
    }

    // 1, 3, 5..7
    fn parse_case_labels(&mut self) -> Result<BTreeSet<i64>, ParseError> {
        let mut labels = BTreeSet::new();
        loop {
            let start = self.peek().clone();
            let from = self.parse_integer()?;
            if self.matches(TokenKind::DotDot) {
                let to = self.parse_integer()?;
                if range_too_large(from, to) {
                    return Err(Self::invalid(&start, "CASE label range is too large."));
                }
                labels.extend(from..=to);
            } else {
                labels.insert(from);
            }
            if !self.matches(TokenKind::Comma) {
                return Ok(labels);
            }
        }
    }

    /// Index list after an opening `[`: accepts `[i][j]` and `[i, j]`.
    fn parse_indices(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut indices = Vec::new();
        loop {
            indices.push(self.parse_expr()?);
            if self.matches(TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RBracket, "']' after index")?;
            if !self.matches(TokenKind::LBracket) {
                return Ok(indices);
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after arguments")?;
        Ok(args)
    }

    /// Operators fold strictly left to right: `a + b * c` is `(a + b) * c`.
    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_operand()?;
        while let Some(op) = binary_op(self.peek().kind) {
            let line = self.advance().line;
            let right = self.parse_operand()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right), line);
        }
        Ok(left)
    }

    fn parse_operand(&mut self) -> Result<Expr, ParseError> {
        match self.peek().kind {
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')' after expression")?;
                Ok(Expr::Grouping(Box::new(inner)))
            }
            TokenKind::Minus | TokenKind::Not => {
                self.advance();
                Ok(Expr::Negation(Box::new(self.parse_operand()?)))
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_operand()
            }
            TokenKind::Ident => {
                let name = self.advance();
                if self.matches(TokenKind::LBracket) {
                    Ok(Expr::ArrayAccess(name, self.parse_indices()?))
                } else if self.matches(TokenKind::LParen) {
                    Ok(Expr::ProcedureCall(name, self.parse_arguments()?))
                } else {
                    Ok(Expr::Literal(name))
                }
            }
            TokenKind::Number | TokenKind::Str => Ok(Expr::Literal(self.advance())),
            _ => Err(self.expected("expression")),
        }
    }
}

fn binary_op(kind: TokenKind) -> Option<BinOp> {
    let op = match kind {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Div => BinOp::IntDiv,
        TokenKind::Mod => BinOp::Mod,
        TokenKind::Equal => BinOp::Eq,
        TokenKind::Hash | TokenKind::NotEqual => BinOp::Ne,
        TokenKind::Less => BinOp::Lt,
        TokenKind::LessEqual => BinOp::Le,
        TokenKind::Greater => BinOp::Gt,
        TokenKind::GreaterEqual => BinOp::Ge,
        TokenKind::And => BinOp::And,
        TokenKind::Or => BinOp::Or,
        _ => return None,
    };
    Some(op)
}

pub fn parse_module(tokens: Vec<Token>) -> Result<Block, ParseError> {
    Parser::new(tokens).parse_module()
}
