//! Hand-written tokenizer for the `${…}` expression language, in the house
//! style of the teacher's own parsers (`hcl/parser.rs`, `config/parser.rs`
//! lean on an external crate for their own grammar, but this one is
//! bespoke, so it gets a small lexer of its own, shaped the way
//! `rossmacarthur-upon`'s `lex.rs` separates tokenizing from parsing).

use crate::error::RenderError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    Dot,
    Comma,
    Colon,
    Question,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Eof,
}

pub struct Lexer<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer { src, chars: src.chars().collect(), pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, RenderError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_ws();
            let Some(c) = self.peek() else {
                tokens.push(Token::Eof);
                break;
            };
            let tok = match c {
                '.' => {
                    self.bump();
                    Token::Dot
                }
                ',' => {
                    self.bump();
                    Token::Comma
                }
                ':' => {
                    self.bump();
                    Token::Colon
                }
                '?' => {
                    self.bump();
                    Token::Question
                }
                '(' => {
                    self.bump();
                    Token::LParen
                }
                ')' => {
                    self.bump();
                    Token::RParen
                }
                '[' => {
                    self.bump();
                    Token::LBracket
                }
                ']' => {
                    self.bump();
                    Token::RBracket
                }
                '{' => {
                    self.bump();
                    Token::LBrace
                }
                '}' => {
                    self.bump();
                    Token::RBrace
                }
                '+' => {
                    self.bump();
                    Token::Plus
                }
                '-' => {
                    self.bump();
                    Token::Minus
                }
                '*' => {
                    self.bump();
                    Token::Star
                }
                '/' => {
                    self.bump();
                    Token::Slash
                }
                '%' => {
                    self.bump();
                    Token::Percent
                }
                '=' if self.peek_at(1) == Some('=') => {
                    self.bump();
                    self.bump();
                    Token::EqEq
                }
                '!' if self.peek_at(1) == Some('=') => {
                    self.bump();
                    self.bump();
                    Token::NotEq
                }
                '!' => {
                    self.bump();
                    Token::Bang
                }
                '<' if self.peek_at(1) == Some('=') => {
                    self.bump();
                    self.bump();
                    Token::Le
                }
                '<' => {
                    self.bump();
                    Token::Lt
                }
                '>' if self.peek_at(1) == Some('=') => {
                    self.bump();
                    self.bump();
                    Token::Ge
                }
                '>' => {
                    self.bump();
                    Token::Gt
                }
                '&' if self.peek_at(1) == Some('&') => {
                    self.bump();
                    self.bump();
                    Token::AndAnd
                }
                '|' if self.peek_at(1) == Some('|') => {
                    self.bump();
                    self.bump();
                    Token::OrOr
                }
                '\'' | '"' => self.lex_string(c)?,
                c if c.is_ascii_digit() => self.lex_number(),
                c if c.is_alphabetic() || c == '_' => self.lex_ident(),
                other => {
                    return Err(RenderError::compile(
                        self.src,
                        format!("unexpected character '{other}'"),
                    ))
                }
            };
            tokens.push(tok);
        }
        Ok(tokens)
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, RenderError> {
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(RenderError::compile(self.src, "unterminated string literal"))
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('\\') => s.push('\\'),
                    Some(c) if c == quote => s.push(quote),
                    Some(other) => s.push(other),
                    None => {
                        return Err(RenderError::compile(self.src, "unterminated escape sequence"))
                    }
                },
                Some(c) => s.push(c),
            }
        }
        Ok(Token::Str(s))
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            Token::Float(text.parse().unwrap_or(0.0))
        } else {
            match text.parse::<i64>() {
                Ok(i) => Token::Int(i),
                Err(_) => Token::Float(text.parse().unwrap_or(0.0)),
            }
        }
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        match text.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Ident(text),
        }
    }
}
