//! Formula lexer and recursive-descent parser.

use crate::{BinaryOperator, FormulaError, FormulaExpr, UnaryOperator};
use rust_decimal::Decimal;
use sheetcalc_primitives::value::parse_number;
use sheetcalc_primitives::{CellReference, CellValue, ErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(Decimal),
    String(String),
    Identifier(String),
    SheetName(String),
    Error(ErrorKind),
    CellRef(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Ampersand,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Colon,
    Bang,
    Eof,
}

/// A token with its byte span in the lexed text.
#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

struct Lexer<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        }
    }

    fn next_token(&mut self) -> Result<Token, FormulaError> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                start: self.input.len(),
                end: self.input.len(),
            });
        };

        let kind = match ch {
            '(' => self.simple(TokenKind::LParen),
            ')' => self.simple(TokenKind::RParen),
            ',' => self.simple(TokenKind::Comma),
            '+' => self.simple(TokenKind::Plus),
            '-' => self.simple(TokenKind::Minus),
            '*' => self.simple(TokenKind::Star),
            '/' => self.simple(TokenKind::Slash),
            '&' => self.simple(TokenKind::Ampersand),
            ':' => self.simple(TokenKind::Colon),
            '=' => {
                self.advance();
                let _ = self.consume('=');
                TokenKind::Equal
            }
            '!' => {
                self.advance();
                if self.consume('=') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                self.advance();
                if self.consume('=') {
                    TokenKind::LessEqual
                } else if self.consume('>') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                self.advance();
                if self.consume('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '"' => self.string_token()?,
            '\'' => self.sheet_name_token()?,
            '#' => self.error_token()?,
            '.' | '0'..='9' => self.number_token()?,
            '$' | 'A'..='Z' | 'a'..='z' | '_' => self.identifier_or_cell_token(),
            _ => {
                return Err(FormulaError::ParseError(format!(
                    "Unexpected character '{}' at {}",
                    ch, start
                )))
            }
        };

        Ok(Token {
            kind,
            start: self.byte_pos(start),
            end: self.byte_pos(self.pos),
        })
    }

    fn simple(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn string_token(&mut self) -> Result<TokenKind, FormulaError> {
        self.advance(); // consume opening "
        let mut result = String::new();
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == '"' {
                if self.consume('"') {
                    result.push('"');
                    continue;
                }
                return Ok(TokenKind::String(result));
            }
            result.push(ch);
        }
        Err(FormulaError::ParseError(
            "Unterminated string literal".to_string(),
        ))
    }

    fn sheet_name_token(&mut self) -> Result<TokenKind, FormulaError> {
        self.advance(); // consume opening '
        let mut result = String::new();
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == '\'' {
                return Ok(TokenKind::SheetName(result));
            }
            result.push(ch);
        }
        Err(FormulaError::ParseError(
            "Unterminated sheet name".to_string(),
        ))
    }

    fn error_token(&mut self) -> Result<TokenKind, FormulaError> {
        let rest = &self.input[self.byte_pos(self.pos)..];
        for kind in ErrorKind::ALL {
            let label = kind.label();
            if rest
                .get(..label.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(label))
            {
                self.pos += label.chars().count();
                return Ok(TokenKind::Error(kind));
            }
        }
        let literal: String = rest
            .chars()
            .take_while(|ch| !ch.is_whitespace() && !is_delimiter(*ch))
            .collect();
        Err(FormulaError::ParseError(format!(
            "Unknown error literal '{}'",
            literal
        )))
    }

    fn number_token(&mut self) -> Result<TokenKind, FormulaError> {
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(ch) = self.peek() {
            match ch {
                '0'..='9' => self.advance(),
                '.' if !seen_dot => {
                    seen_dot = true;
                    self.advance();
                }
                _ => break,
            }
        }
        let text = self.slice(start, self.pos);
        let value = parse_number(text).ok_or_else(|| {
            FormulaError::ParseError(format!("Invalid number literal '{}'", text))
        })?;
        Ok(TokenKind::Number(value))
    }

    fn identifier_or_cell_token(&mut self) -> TokenKind {
        let start = self.pos;
        let _ = self.consume('$');
        let mut letters = 0;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_alphabetic()) {
            letters += 1;
            self.advance();
        }
        if letters > 0 {
            let _ = self.consume('$');
            let mut digits = 0;
            while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
                digits += 1;
                self.advance();
            }
            if digits > 0
                && is_boundary(self.peek())
                && !self.at_sheet_bang()
                && self.peek() != Some('(')
            {
                return TokenKind::CellRef(self.slice(start, self.pos).to_string());
            }
        }

        // not a cell ref; re-read as an identifier
        self.pos = start;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_alphanumeric() || ch == '_') {
            self.advance();
        }
        if self.pos == start {
            // a lone '$'
            self.advance();
        }
        TokenKind::Identifier(self.slice(start, self.pos).to_string())
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
            self.advance();
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, ch)| *ch)
    }

    /// A `!` that separates a sheet name from a cell, as opposed to `!=`.
    fn at_sheet_bang(&self) -> bool {
        self.peek() == Some('!') && self.chars.get(self.pos + 1).map(|(_, ch)| *ch) != Some('=')
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn consume(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn byte_pos(&self, idx: usize) -> usize {
        self.chars
            .get(idx)
            .map(|(i, _)| *i)
            .unwrap_or(self.input.len())
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        &self.input[self.byte_pos(start)..self.byte_pos(end)]
    }
}

fn is_delimiter(ch: char) -> bool {
    ch.is_whitespace()
        || matches!(
            ch,
            '(' | ')' | ',' | '+' | '-' | '*' | '/' | '&' | ':' | '!' | '=' | '<' | '>'
        )
}

fn is_boundary(ch: Option<char>) -> bool {
    match ch {
        None => true,
        Some(ch) => is_delimiter(ch),
    }
}

/// Split formula text (without the leading `=`) into tokens ending in `Eof`.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::Eof);
        tokens.push(token);
        if is_eof {
            return Ok(tokens);
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, idx: 0 }
    }

    fn parse_expression(&mut self) -> Result<FormulaExpr, FormulaError> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut expr = self.parse_concat()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Equal => BinaryOperator::Equal,
                TokenKind::NotEqual => BinaryOperator::NotEqual,
                TokenKind::Less => BinaryOperator::Less,
                TokenKind::LessEqual => BinaryOperator::LessEqual,
                TokenKind::Greater => BinaryOperator::Greater,
                TokenKind::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_concat()?;
            expr = FormulaExpr::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_concat(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut expr = self.parse_add_sub()?;
        while matches!(self.peek_kind(), TokenKind::Ampersand) {
            self.advance();
            let right = self.parse_add_sub()?;
            expr = FormulaExpr::binary(BinaryOperator::Concat, expr, right);
        }
        Ok(expr)
    }

    fn parse_add_sub(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut expr = self.parse_mul_div()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_mul_div()?;
            expr = FormulaExpr::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_mul_div(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = FormulaExpr::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<FormulaExpr, FormulaError> {
        let op = match self.peek_kind() {
            TokenKind::Plus => UnaryOperator::Plus,
            TokenKind::Minus => UnaryOperator::Negate,
            _ => return self.parse_primary(),
        };
        self.advance();
        let expr = self.parse_unary()?;
        Ok(FormulaExpr::UnaryOp {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_primary(&mut self) -> Result<FormulaExpr, FormulaError> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Number(value) => Ok(FormulaExpr::Literal(CellValue::number(value))),
            TokenKind::String(value) => Ok(FormulaExpr::Literal(CellValue::Text(value))),
            TokenKind::Error(kind) => Ok(FormulaExpr::ErrorLiteral(kind)),
            TokenKind::Identifier(name) => self.parse_identifier_or_ref(name),
            TokenKind::SheetName(name) => self.parse_sheet_ref(name),
            TokenKind::CellRef(text) => self.parse_cell_or_range(&text, None),
            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Eof => Err(FormulaError::ParseError(
                "Unexpected end of input".to_string(),
            )),
            other => Err(FormulaError::ParseError(format!(
                "Unexpected token {:?} at {}",
                other, token.start
            ))),
        }
    }

    fn parse_identifier_or_ref(&mut self, name: String) -> Result<FormulaExpr, FormulaError> {
        if matches!(self.peek_kind(), TokenKind::Bang) {
            return self.parse_sheet_ref(name);
        }

        if matches!(self.peek_kind(), TokenKind::LParen) {
            self.advance();
            let args = self.parse_arguments()?;
            return Ok(FormulaExpr::FunctionCall { name, args });
        }

        match name.to_uppercase().as_str() {
            "TRUE" => Ok(FormulaExpr::Literal(CellValue::Boolean(true))),
            "FALSE" => Ok(FormulaExpr::Literal(CellValue::Boolean(false))),
            _ => Err(FormulaError::ParseError(format!(
                "Unexpected identifier '{}'",
                name
            ))),
        }
    }

    fn parse_sheet_ref(&mut self, sheet: String) -> Result<FormulaExpr, FormulaError> {
        if !matches!(self.peek_kind(), TokenKind::Bang) {
            return Err(FormulaError::ParseError(format!(
                "Sheet name '{}' missing '!'.",
                sheet
            )));
        }
        self.advance();
        match self.advance().kind.clone() {
            TokenKind::CellRef(text) => self.parse_cell_or_range(&text, Some(sheet)),
            other => Err(FormulaError::ParseError(format!(
                "Expected cell reference after sheet name, got {:?}",
                other
            ))),
        }
    }

    fn parse_cell_or_range(
        &mut self,
        first: &str,
        sheet: Option<String>,
    ) -> Result<FormulaExpr, FormulaError> {
        let start = parse_cell_ref_text(first);
        if !matches!(self.peek_kind(), TokenKind::Colon) {
            return Ok(match start {
                Some(reference) => FormulaExpr::CellRef { sheet, reference },
                None => FormulaExpr::ErrorLiteral(ErrorKind::BadReference),
            });
        }

        self.advance();
        let TokenKind::CellRef(end_text) = self.advance().kind.clone() else {
            return Err(FormulaError::ParseError(
                "Expected cell reference after ':'".to_string(),
            ));
        };
        let end = parse_cell_ref_text(&end_text);
        Ok(match (start, end) {
            (Some(start), Some(end)) => FormulaExpr::RangeRef { sheet, start, end },
            _ => FormulaExpr::ErrorLiteral(ErrorKind::BadReference),
        })
    }

    fn parse_arguments(&mut self) -> Result<Vec<FormulaExpr>, FormulaError> {
        let mut args = Vec::new();
        if matches!(self.peek_kind(), TokenKind::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.peek_kind() {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RParen => {
                    self.advance();
                    return Ok(args);
                }
                _ => {
                    return Err(FormulaError::ParseError(
                        "Expected ',' or ')' in argument list".to_string(),
                    ))
                }
            }
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), FormulaError> {
        let token = self.advance();
        if std::mem::discriminant(&token.kind) == std::mem::discriminant(kind) {
            Ok(())
        } else {
            Err(FormulaError::ParseError(format!(
                "Expected {:?}, got {:?}",
                kind, token.kind
            )))
        }
    }

    fn expect_end(&self) -> Result<(), FormulaError> {
        if matches!(self.peek_kind(), TokenKind::Eof) {
            Ok(())
        } else {
            Err(FormulaError::ParseError(
                "Unexpected trailing input".to_string(),
            ))
        }
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.idx].kind
    }

    fn advance(&mut self) -> &Token {
        let token = &self.tokens[self.idx];
        if !matches!(token.kind, TokenKind::Eof) {
            self.idx += 1;
        }
        token
    }
}

/// References whose column letters overflow are unusable; they evaluate to
/// `#REF!`.
fn parse_cell_ref_text(text: &str) -> Option<CellReference> {
    CellReference::parse(text).ok()
}

/// Parse a formula string into an AST
pub fn parse_formula(formula: &str) -> Result<FormulaExpr, FormulaError> {
    let formula = formula.trim_start();
    let formula = formula.strip_prefix('=').unwrap_or(formula);
    if formula.trim().is_empty() {
        return Err(FormulaError::ParseError("Empty formula".to_string()));
    }

    let mut parser = Parser::new(tokenize(formula)?);
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a bare cell or range reference such as `B2`, `'My Sheet'!A1:C3`.
///
/// Used to resolve references built at evaluation time.
pub fn parse_reference(text: &str) -> Result<FormulaExpr, FormulaError> {
    let mut parser = Parser::new(tokenize(text.trim())?);
    let token = parser.advance().clone();
    let expr = match token.kind {
        TokenKind::CellRef(text) => parser.parse_cell_or_range(&text, None)?,
        TokenKind::Identifier(name) | TokenKind::SheetName(name) => parser.parse_sheet_ref(name)?,
        other => {
            return Err(FormulaError::ParseError(format!(
                "Expected a reference, got {:?}",
                other
            )))
        }
    };
    parser.expect_end()?;
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert!(parse_formula("").is_err());
        assert!(parse_formula("=").is_err());
        assert!(parse_formula("=   ").is_err());
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_formula("=1+2*3").unwrap();
        let FormulaExpr::BinaryOp { op, right, .. } = expr else {
            panic!("expected binary op");
        };
        assert_eq!(op, BinaryOperator::Add);
        assert!(matches!(
            *right,
            FormulaExpr::BinaryOp {
                op: BinaryOperator::Multiply,
                ..
            }
        ));

        let expr = parse_formula("=A1&B1=C1").unwrap();
        assert!(matches!(
            expr,
            FormulaExpr::BinaryOp {
                op: BinaryOperator::Equal,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_comparison_spellings() {
        for (text, expected) in [
            ("=1=2", BinaryOperator::Equal),
            ("=1==2", BinaryOperator::Equal),
            ("=1<>2", BinaryOperator::NotEqual),
            ("=1!=2", BinaryOperator::NotEqual),
            ("=A1!=B1", BinaryOperator::NotEqual),
            ("=1<=2", BinaryOperator::LessEqual),
            ("=1>=2", BinaryOperator::GreaterEqual),
        ] {
            let expr = parse_formula(text).unwrap();
            assert!(
                matches!(expr, FormulaExpr::BinaryOp { op, .. } if op == expected),
                "{text}"
            );
        }
    }

    #[test]
    fn test_parse_error_literals() {
        let expr = parse_formula("=#div/0!").unwrap();
        assert!(matches!(
            expr,
            FormulaExpr::ErrorLiteral(ErrorKind::DivideByZero)
        ));
        let expr = parse_formula("=#NAME? & 1").unwrap();
        assert!(matches!(expr, FormulaExpr::BinaryOp { .. }));
        assert!(parse_formula("=#BOGUS!").is_err());
    }

    #[test]
    fn test_parse_sheet_refs() {
        let expr = parse_formula("='My Sheet'!$A$1").unwrap();
        let FormulaExpr::CellRef { sheet, reference } = expr else {
            panic!("expected cell ref");
        };
        assert_eq!(sheet.as_deref(), Some("My Sheet"));
        assert!(reference.abs_col && reference.abs_row);

        let expr = parse_formula("=Sheet1!A1:b2").unwrap();
        assert!(matches!(expr, FormulaExpr::RangeRef { sheet: Some(_), .. }));
    }

    #[test]
    fn test_parse_function_calls() {
        let expr = parse_formula("=if(a1, version(), sum(A1:A3, 2))").unwrap();
        let FormulaExpr::FunctionCall { name, args } = expr else {
            panic!("expected function call");
        };
        assert_eq!(name, "if");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_parse_unary_plus_is_kept() {
        let expr = parse_formula("=+A1").unwrap();
        assert!(matches!(
            expr,
            FormulaExpr::UnaryOp {
                op: UnaryOperator::Plus,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_overflowing_reference_is_bad_ref() {
        let expr = parse_formula("=ZZZZZZZZZZ1").unwrap();
        assert!(matches!(
            expr,
            FormulaExpr::ErrorLiteral(ErrorKind::BadReference)
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_formula("=1+").is_err());
        assert!(parse_formula("=(1").is_err());
        assert!(parse_formula("=\"abc").is_err());
        assert!(parse_formula("=A1 B1").is_err());
        assert!(parse_formula("=foo").is_err());
        assert!(parse_formula("=1 ? 2").is_err());
    }

    #[test]
    fn test_parse_reference_only() {
        assert!(matches!(
            parse_reference(" b3 ").unwrap(),
            FormulaExpr::CellRef { sheet: None, .. }
        ));
        assert!(matches!(
            parse_reference("'Data Sheet'!A1:A4").unwrap(),
            FormulaExpr::RangeRef { .. }
        ));
        assert!(parse_reference("A1+1").is_err());
        assert!(parse_reference("hello").is_err());
    }

    #[test]
    fn test_token_spans() {
        let tokens = tokenize("Sheet1!a1 + 'x y'!B2").unwrap();
        let spans: Vec<(usize, usize)> = tokens.iter().map(|t| (t.start, t.end)).collect();
        assert_eq!(spans[0], (0, 6));
        assert_eq!(spans[2], (7, 9));
        assert_eq!(spans[4], (12, 17));
    }
}
