// SPDX-License-Identifier: MIT

//! Tokenizer for code fragments
//!
//! Fragments are line oriented: newlines and `;` end a statement and `#`
//! starts a comment. Indentation opens and closes blocks the way Python does;
//! `tokenize` turns it into `Indent`/`Dedent` tokens, measured relative to the
//! first statement so a uniformly indented fragment parses unchanged.

use std::fmt;

use logos::Logos;

use super::error::{ScriptError, ScriptResult};

/// Token types for the fragment language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"([ \t\r\f]+|#[^\n]*|\\\n)")]
pub enum Token {
    // Keywords
    #[token("import")]
    Import,
    #[token("as")]
    As,
    #[token("return")]
    Return,
    #[token("pass")]
    Pass,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("in")]
    In,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    None_,

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Literals
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r"'([^'\\\n]|\\.)*'", |lex| unescape(lex.slice()))]
    String(String),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("//=")]
    DoubleSlashEq,
    #[token("%=")]
    PercentEq,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // Statement separators
    #[token("\n")]
    Newline,
    #[token(";")]
    Semicolon,

    // Synthesized by `tokenize`
    Indent,
    Dedent,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Import => write!(f, "import"),
            Token::As => write!(f, "as"),
            Token::Return => write!(f, "return"),
            Token::Pass => write!(f, "pass"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::In => write!(f, "in"),
            Token::If => write!(f, "if"),
            Token::Elif => write!(f, "elif"),
            Token::Else => write!(f, "else"),
            Token::For => write!(f, "for"),
            Token::While => write!(f, "while"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::True => write!(f, "True"),
            Token::False => write!(f, "False"),
            Token::None_ => write!(f, "None"),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Float(n) => write!(f, "{}", n),
            Token::Int(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "{:?}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::DoubleStar => write!(f, "**"),
            Token::Slash => write!(f, "/"),
            Token::DoubleSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Le => write!(f, "<="),
            Token::Ge => write!(f, ">="),
            Token::Eq => write!(f, "="),
            Token::PlusEq => write!(f, "+="),
            Token::MinusEq => write!(f, "-="),
            Token::StarEq => write!(f, "*="),
            Token::SlashEq => write!(f, "/="),
            Token::DoubleSlashEq => write!(f, "//="),
            Token::PercentEq => write!(f, "%="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Dot => write!(f, "."),
            Token::Newline => write!(f, "newline"),
            Token::Semicolon => write!(f, ";"),
            Token::Indent => write!(f, "indent"),
            Token::Dedent => write!(f, "dedent"),
        }
    }
}

/// A token with the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: usize,
}

/// Tokenize a fragment
pub fn tokenize(source: &str) -> ScriptResult<Vec<SpannedToken>> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut last_end = 0;
    let mut indents = Indentation::default();
    let mut bracket_depth = 0usize;
    let mut at_line_start = true;

    for (result, span) in Token::lexer(source).spanned() {
        line += source[last_end..span.start].matches('\n').count();
        last_end = span.start;

        let token = match result {
            Ok(token) => token,
            Err(()) => {
                return Err(ScriptError::syntax(
                    format!("invalid token '{}'", &source[span.clone()]),
                    line,
                ))
            }
        };

        if token == Token::Newline {
            at_line_start = bracket_depth == 0;
        } else if at_line_start {
            // First real token of a logical line; blank and comment-only
            // lines never get here
            at_line_start = false;
            let width = measure_indent(source, span.start);
            for token in indents.process(width, line)? {
                tokens.push(SpannedToken { token, line });
            }
        }

        match token {
            Token::LParen | Token::LBracket | Token::LBrace => bracket_depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => {
                bracket_depth = bracket_depth.saturating_sub(1)
            }
            _ => {}
        }
        tokens.push(SpannedToken { token, line });
    }

    for token in indents.finish() {
        tokens.push(SpannedToken { token, line });
    }
    Ok(tokens)
}

/// Width of the whitespace between the start of the line and `offset`;
/// a tab advances to the next multiple of four
fn measure_indent(source: &str, offset: usize) -> usize {
    let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    source[line_start..offset].chars().fold(0, |width, c| match c {
        ' ' => width + 1,
        '\t' => width + 4 - width % 4,
        _ => width,
    })
}

/// Stack of open indentation levels; the first statement sets the base
#[derive(Debug, Default)]
struct Indentation {
    stack: Vec<usize>,
}

impl Indentation {
    fn process(&mut self, width: usize, line: usize) -> ScriptResult<Vec<Token>> {
        let Some(&current) = self.stack.last() else {
            self.stack.push(width);
            return Ok(Vec::new());
        };

        if width > current {
            self.stack.push(width);
            return Ok(vec![Token::Indent]);
        }

        let mut out = Vec::new();
        while self.stack.len() > 1 && self.stack.last().is_some_and(|&top| top > width) {
            self.stack.pop();
            out.push(Token::Dedent);
        }
        if self.stack.last() != Some(&width) {
            return Err(ScriptError::syntax(
                "unindent does not match any outer indentation level",
                line,
            ));
        }
        Ok(out)
    }

    fn finish(self) -> impl Iterator<Item = Token> {
        let open = self.stack.len().saturating_sub(1);
        std::iter::repeat(Token::Dedent).take(open)
    }
}

fn unescape(slice: &str) -> Option<String> {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Some(out)
}
