use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use snafu::ensure;

use crate::error::{
    CompileResult, LiteralOutOfRangeSnafu, MalformedLiteralSnafu, MalformedOperatorSnafu,
    UnexpectedTokenSnafu, UnknownCharacterSnafu,
};

lazy_static! {
    static ref PUNCTUATION_DOUBLE_RE: Regex = Regex::new(r"^==|^!=|^<=|^>=|^&&").unwrap();
    static ref PUNCTUATION_RE: Regex = Regex::new(r"^[-+*/=<>&;,{}()\[\]]").unwrap();
    static ref WORD_RE: Regex = Regex::new(r"^[a-zA-Z_]\w*").unwrap();
    static ref CONSTANT_RE: Regex = Regex::new(r"^[0-9]\w*").unwrap();
    static ref COMMENT_RE: Regex = Regex::new(r"^//[^\n]*").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Void,
    Char,
    Int,
    Long,
    IntLit,
    Semi,
    Ident,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Amper,
    LogAnd,
    If,
    Else,
    While,
    For,
    Return,
    Print,
    Comma,
}

impl TokenKind {
    fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "return" => TokenKind::Return,
            "print" => TokenKind::Print,
            "void" => TokenKind::Void,
            "char" => TokenKind::Char,
            "int" => TokenKind::Int,
            "long" => TokenKind::Long,
            _ => return None,
        };
        Some(kind)
    }

    fn punctuation(text: &str) -> TokenKind {
        match text {
            "==" => TokenKind::Eq,
            "!=" => TokenKind::Ne,
            "<=" => TokenKind::Le,
            ">=" => TokenKind::Ge,
            "&&" => TokenKind::LogAnd,
            "=" => TokenKind::Assign,
            "+" => TokenKind::Plus,
            "-" => TokenKind::Minus,
            "*" => TokenKind::Star,
            "/" => TokenKind::Slash,
            "<" => TokenKind::Lt,
            ">" => TokenKind::Gt,
            "&" => TokenKind::Amper,
            ";" => TokenKind::Semi,
            "," => TokenKind::Comma,
            "{" => TokenKind::LBrace,
            "}" => TokenKind::RBrace,
            "(" => TokenKind::LParen,
            ")" => TokenKind::RParen,
            "[" => TokenKind::LBracket,
            "]" => TokenKind::RBracket,
            _ => unreachable!(),
        }
    }

    pub fn is_type(self) -> bool {
        matches!(
            self,
            TokenKind::Void | TokenKind::Char | TokenKind::Int | TokenKind::Long
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Eof => "end of file",
            TokenKind::Assign => "'='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Eq => "'=='",
            TokenKind::Ne => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::Le => "'<='",
            TokenKind::Ge => "'>='",
            TokenKind::Void => "'void'",
            TokenKind::Char => "'char'",
            TokenKind::Int => "'int'",
            TokenKind::Long => "'long'",
            TokenKind::IntLit => "integer literal",
            TokenKind::Semi => "';'",
            TokenKind::Ident => "identifier",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Amper => "'&'",
            TokenKind::LogAnd => "'&&'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::While => "'while'",
            TokenKind::For => "'for'",
            TokenKind::Return => "'return'",
            TokenKind::Print => "'print'",
            TokenKind::Comma => "','",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>) -> Token {
        Token {
            kind,
            lexeme: lexeme.into(),
        }
    }

    pub fn eof() -> Token {
        Token::new(TokenKind::Eof, "")
    }

    pub fn as_int(&self) -> i64 {
        match self.kind {
            TokenKind::IntLit => self.lexeme.parse().unwrap_or_default(),
            _ => unreachable!(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Ident | TokenKind::IntLit => write!(f, "{} '{}'", self.kind, self.lexeme),
            kind => write!(f, "{}", kind),
        }
    }
}

pub struct Lexer {
    src: String,
    pos: usize,
    line: usize,
    current: Token,
    rejected: Option<Token>,
    finished: bool,
}

impl Lexer {
    pub fn new(src: impl Into<String>) -> Lexer {
        Lexer {
            src: src.into(),
            pos: 0,
            line: 1,
            current: Token::eof(),
            rejected: None,
            finished: false,
        }
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn reject(&mut self, token: Token) {
        debug_assert!(self.rejected.is_none(), "only one token can be rejected");
        self.rejected = Some(token);
    }

    pub fn eat(&mut self, kind: TokenKind) -> CompileResult<Token> {
        ensure!(
            self.current.kind == kind,
            UnexpectedTokenSnafu {
                expected: kind.to_string(),
                found: self.current.to_string(),
            }
        );
        let eaten = self.current.clone();
        self.next_token()?;
        Ok(eaten)
    }

    pub fn next_token(&mut self) -> CompileResult<Token> {
        let token = match self.rejected.take() {
            Some(token) => token,
            None => self.scan()?,
        };
        self.current = token.clone();
        Ok(token)
    }

    fn skip_whitespace(&mut self) {
        loop {
            let rest = &self.src[self.pos..];
            if let Some(m) = COMMENT_RE.find(rest) {
                self.pos += m.end();
                continue;
            }
            match rest.chars().next() {
                Some(ch) if ch.is_whitespace() => {
                    if ch == '\n' {
                        self.line += 1;
                    }
                    self.pos += ch.len_utf8();
                }
                _ => break,
            }
        }
    }

    fn scan(&mut self) -> CompileResult<Token> {
        self.skip_whitespace();

        let src = &self.src[self.pos..];

        let token = if src.is_empty() {
            Token::eof()
        } else if let Some(m) = PUNCTUATION_DOUBLE_RE.find(src) {
            Token::new(TokenKind::punctuation(m.as_str()), m.as_str())
        } else if let Some(m) = PUNCTUATION_RE.find(src) {
            Token::new(TokenKind::punctuation(m.as_str()), m.as_str())
        } else if let Some(m) = CONSTANT_RE.find(src) {
            ensure!(
                m.as_str().bytes().all(|b| b.is_ascii_digit()),
                MalformedLiteralSnafu { text: m.as_str() }
            );
            ensure!(
                m.as_str().parse::<i64>().is_ok(),
                LiteralOutOfRangeSnafu { text: m.as_str() }
            );
            Token::new(TokenKind::IntLit, m.as_str())
        } else if let Some(m) = WORD_RE.find(src) {
            match TokenKind::keyword(m.as_str()) {
                Some(kind) => Token::new(kind, m.as_str()),
                None => Token::new(TokenKind::Ident, m.as_str()),
            }
        } else {
            let ch = src.chars().next().unwrap_or_default();
            if ch == '!' {
                return MalformedOperatorSnafu { text: "!" }.fail();
            }
            return UnknownCharacterSnafu { ch }.fail();
        };

        self.pos += token.lexeme.len();
        Ok(token)
    }
}

impl Iterator for Lexer {
    type Item = CompileResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let token = self.next_token();
        self.finished = !matches!(&token, Ok(t) if t.kind != TokenKind::Eof);
        Some(token)
    }
}
