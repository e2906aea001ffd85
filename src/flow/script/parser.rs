// SPDX-License-Identifier: MIT

//! Recursive-descent parser for code fragments
//!
//! Parses statements like:
//! - `import math`
//! - `x = state["outputs"][-1]["x"]`
//! - `for row in state["outputs"]:` followed by an indented block
//! - `return x * 2 + y`
//!
//! Every nested block, bracket and folded operator counts toward the depth
//! limit, so the tree handed to the evaluator is never deeper than
//! `max_depth`.

use super::ast::{BinaryOp, CompareOp, Expr, Literal, Program, Statement, Target, UnaryOp};
use super::error::{ScriptError, ScriptResult};
use super::lexer::{tokenize, SpannedToken, Token};

/// Default limit on syntax nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Parse a fragment into a program
pub fn parse(source: &str) -> ScriptResult<Program> {
    parse_with_depth(source, DEFAULT_MAX_DEPTH)
}

/// Parse a fragment, rejecting syntax nested deeper than `max_depth`
pub fn parse_with_depth(source: &str, max_depth: usize) -> ScriptResult<Program> {
    let tokens = tokenize(source)?;
    Parser::new(tokens, max_depth).program()
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    /// Open brackets; newlines inside them do not end a statement
    nesting: usize,
    depth: usize,
    max_depth: usize,
    /// Enclosing loops; `break` and `continue` need one
    loops: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>, max_depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
            depth: 0,
            max_depth,
            loops: 0,
        }
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn error<T>(&self, message: impl Into<String>) -> ScriptResult<T> {
        Err(ScriptError::syntax(message, self.line()))
    }

    fn peek(&mut self) -> Option<&Token> {
        if self.nesting > 0 {
            while matches!(self.tokens.get(self.pos), Some(t) if t.token == Token::Newline) {
                self.pos += 1;
            }
        }
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        self.peek();
        let token = self.tokens.get(self.pos).map(|t| t.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&mut self, expected: &Token) -> bool {
        self.peek() == Some(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> ScriptResult<()> {
        if self.eat(expected) {
            return Ok(());
        }
        match self.peek().cloned() {
            Some(found) => self.error(format!("expected '{}', found '{}'", expected, found)),
            None => self.error(format!("expected '{}', found end of input", expected)),
        }
    }

    /// Whether the last consumed token was `token`
    fn after(&self, token: &Token) -> bool {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .is_some_and(|t| &t.token == token)
    }

    fn ident(&mut self) -> ScriptResult<String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            Some(other) => self.error(format!("expected identifier, found '{}'", other)),
            None => self.error("expected identifier, found end of input"),
        }
    }

    fn enter(&mut self) -> ScriptResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return self.error(format!("syntax nested deeper than {}", self.max_depth));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn program(mut self) -> ScriptResult<Program> {
        let statements = self.statements(false)?;
        Ok(Program { statements })
    }

    /// Statements up to the end of input, or up to and including the `Dedent`
    /// that closes the current block
    fn statements(&mut self, in_block: bool) -> ScriptResult<Vec<Statement>> {
        let mut statements = Vec::new();

        loop {
            while matches!(self.peek(), Some(Token::Newline) | Some(Token::Semicolon)) {
                self.pos += 1;
            }
            match self.peek() {
                None => break,
                Some(Token::Dedent) if in_block => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Indent) | Some(Token::Dedent) => return self.error("unexpected indent"),
                _ => {}
            }

            let compound = matches!(
                self.peek(),
                Some(Token::If) | Some(Token::For) | Some(Token::While)
            );
            statements.push(self.statement()?);
            if compound && self.after(&Token::Dedent) {
                continue;
            }

            match self.peek() {
                None | Some(Token::Newline) | Some(Token::Semicolon) | Some(Token::Dedent) => {}
                Some(other) => {
                    let other = other.clone();
                    return self.error(format!("unexpected '{}' after statement", other));
                }
            }
        }

        Ok(statements)
    }

    fn statement(&mut self) -> ScriptResult<Statement> {
        match self.peek() {
            Some(Token::If) => self.if_statement(),
            Some(Token::For) => self.for_statement(),
            Some(Token::While) => {
                self.pos += 1;
                let cond = self.expression()?;
                let body = self.loop_body()?;
                Ok(Statement::While { cond, body })
            }
            _ => self.simple_statement(),
        }
    }

    fn simple_statement(&mut self) -> ScriptResult<Statement> {
        match self.peek() {
            Some(Token::Import) => {
                self.pos += 1;
                let mut module = self.ident()?;
                while self.eat(&Token::Dot) {
                    module.push('.');
                    module.push_str(&self.ident()?);
                }
                let alias = if self.eat(&Token::As) {
                    Some(self.ident()?)
                } else {
                    None
                };
                Ok(Statement::Import { module, alias })
            }
            Some(Token::Return) => {
                self.pos += 1;
                match self.peek() {
                    None | Some(Token::Newline) | Some(Token::Semicolon) | Some(Token::Dedent) => {
                        Ok(Statement::Return(None))
                    }
                    _ => Ok(Statement::Return(Some(self.expression()?))),
                }
            }
            Some(Token::Pass) => {
                self.pos += 1;
                Ok(Statement::Pass)
            }
            Some(Token::Break) | Some(Token::Continue) => {
                if self.loops == 0 {
                    let keyword = if self.check(&Token::Break) { "break" } else { "continue" };
                    return self.error(format!("'{}' outside loop", keyword));
                }
                match self.advance() {
                    Some(Token::Break) => Ok(Statement::Break),
                    _ => Ok(Statement::Continue),
                }
            }
            _ => {
                let expr = self.expression()?;
                if self.eat(&Token::Eq) {
                    let target = self.target(expr)?;
                    let value = self.expression()?;
                    return Ok(Statement::Assign { target, value });
                }
                if let Some(op) = self.augmented_op() {
                    let target = self.target(expr.clone())?;
                    let value = self.expression()?;
                    return Ok(Statement::AugAssign {
                        target,
                        read: expr,
                        op,
                        value,
                    });
                }
                Ok(Statement::Expr(expr))
            }
        }
    }

    fn augmented_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek()? {
            Token::PlusEq => BinaryOp::Add,
            Token::MinusEq => BinaryOp::Sub,
            Token::StarEq => BinaryOp::Mul,
            Token::SlashEq => BinaryOp::Div,
            Token::DoubleSlashEq => BinaryOp::FloorDiv,
            Token::PercentEq => BinaryOp::Mod,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn if_statement(&mut self) -> ScriptResult<Statement> {
        self.expect(&Token::If)?;
        let mut branches = Vec::new();
        let cond = self.expression()?;
        branches.push((cond, self.suite()?));

        while self.clause(&Token::Elif) {
            let cond = self.expression()?;
            branches.push((cond, self.suite()?));
        }
        let otherwise = if self.clause(&Token::Else) {
            self.suite()?
        } else {
            Vec::new()
        };

        Ok(Statement::If {
            branches,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> ScriptResult<Statement> {
        self.expect(&Token::For)?;
        let mut targets = vec![self.ident()?];
        while self.eat(&Token::Comma) {
            targets.push(self.ident()?);
        }
        self.expect(&Token::In)?;
        let iter = self.expression()?;
        let body = self.loop_body()?;
        Ok(Statement::For {
            targets,
            iter,
            body,
        })
    }

    fn loop_body(&mut self) -> ScriptResult<Vec<Statement>> {
        self.loops += 1;
        let body = self.suite();
        self.loops -= 1;
        body
    }

    /// Continuation keyword of a compound statement (`elif`, `else`), which
    /// may sit on the line after a one-line suite
    fn clause(&mut self, keyword: &Token) -> bool {
        let mut pos = self.pos;
        while matches!(self.tokens.get(pos), Some(t) if t.token == Token::Newline) {
            pos += 1;
        }
        if matches!(self.tokens.get(pos), Some(t) if &t.token == keyword) {
            self.pos = pos + 1;
            return true;
        }
        false
    }

    /// `: <simple statements>` on the same line, or `:` and an indented block
    fn suite(&mut self) -> ScriptResult<Vec<Statement>> {
        self.expect(&Token::Colon)?;
        self.enter()?;
        let body = self.suite_body();
        self.leave();
        body
    }

    fn suite_body(&mut self) -> ScriptResult<Vec<Statement>> {
        if !self.check(&Token::Newline) {
            let mut body = vec![self.simple_statement()?];
            while self.eat(&Token::Semicolon) {
                if matches!(self.peek(), None | Some(Token::Newline) | Some(Token::Dedent)) {
                    break;
                }
                body.push(self.simple_statement()?);
            }
            return Ok(body);
        }

        while self.eat(&Token::Newline) {}
        if !self.eat(&Token::Indent) {
            return self.error("expected an indented block");
        }
        self.statements(true)
    }

    fn target(&self, expr: Expr) -> ScriptResult<Target> {
        let mut path = Vec::new();
        let mut current = expr;

        loop {
            match current {
                Expr::Name(name) => {
                    if path.is_empty() {
                        return Ok(Target::Name(name));
                    }
                    path.reverse();
                    return Ok(Target::Index { name, path });
                }
                Expr::Index { object, index } => {
                    path.push(*index);
                    current = *object;
                }
                _ => return self.error("cannot assign to expression"),
            }
        }
    }

    fn expression(&mut self) -> ScriptResult<Expr> {
        self.enter()?;
        let result = self.conditional();
        self.leave();
        result
    }

    fn conditional(&mut self) -> ScriptResult<Expr> {
        let then = self.or_expr()?;
        if !self.eat(&Token::If) {
            return Ok(then);
        }
        let cond = self.or_expr()?;
        self.expect(&Token::Else)?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or_expr(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut left = self.and_expr()?;
        while self.eat(&Token::Or) {
            self.enter()?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn and_expr(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut left = self.not_expr()?;
        while self.eat(&Token::And) {
            self.enter()?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn not_expr(&mut self) -> ScriptResult<Expr> {
        if self.eat(&Token::Not) {
            self.enter()?;
            let operand = self.not_expr();
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand?),
            });
        }
        self.comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek()? {
            Token::EqEq => CompareOp::Eq,
            Token::NotEq => CompareOp::NotEq,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Lte,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Gte,
            Token::In => CompareOp::In,
            Token::Not => {
                let next = self.tokens.get(self.pos + 1).map(|t| &t.token);
                if next != Some(&Token::In) {
                    return None;
                }
                self.pos += 1;
                CompareOp::NotIn
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    /// Chained comparisons (`a < b < c`) expand to a conjunction of pairs
    fn comparison(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut left = self.sum()?;
        let mut chain: Option<Expr> = None;

        while let Some(op) = self.compare_op() {
            self.enter()?;
            let right = self.sum()?;
            let pair = Expr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right.clone()),
            };
            chain = Some(match chain {
                None => pair,
                Some(prev) => Expr::And(Box::new(prev), Box::new(pair)),
            });
            left = right;
        }

        self.depth = mark;
        Ok(chain.unwrap_or(left))
    }

    fn sum(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            let right = self.term()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        self.depth = mark;
        Ok(left)
    }

    fn term(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::DoubleSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            let right = self.factor()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        self.depth = mark;
        Ok(left)
    }

    fn factor(&mut self) -> ScriptResult<Expr> {
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Plus) => Some(UnaryOp::Pos),
            _ => None,
        };
        let Some(op) = op else {
            return self.power();
        };

        self.pos += 1;
        self.enter()?;
        let operand = self.factor();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    /// `**` binds tighter than unary minus on its left and is right-associative
    fn power(&mut self) -> ScriptResult<Expr> {
        let base = self.postfix()?;
        if !self.eat(&Token::DoubleStar) {
            return Ok(base);
        }
        self.enter()?;
        let exponent = self.factor();
        self.leave();
        Ok(Expr::Binary {
            left: Box::new(base),
            op: BinaryOp::Pow,
            right: Box::new(exponent?),
        })
    }

    fn postfix(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut expr = self.atom()?;
        loop {
            if matches!(
                self.peek(),
                Some(Token::LBracket) | Some(Token::Dot) | Some(Token::LParen)
            ) {
                self.enter()?;
            }
            match self.peek() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    self.nesting += 1;
                    let index = self.expression();
                    let closed = index.is_ok() && self.eat(&Token::RBracket);
                    self.nesting -= 1;
                    let index = index?;
                    if !closed {
                        return self.error("expected ']'");
                    }
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    let attr = self.ident()?;
                    expr = Expr::Attribute {
                        object: Box::new(expr),
                        attr,
                    };
                }
                Some(Token::LParen) => {
                    self.pos += 1;
                    let args = self.sequence(&Token::RParen)?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                    };
                }
                _ => break,
            }
        }
        self.depth = mark;
        Ok(expr)
    }

    /// Comma separated expressions up to `close`; the opener is already consumed
    fn sequence(&mut self, close: &Token) -> ScriptResult<Vec<Expr>> {
        self.nesting += 1;
        let items = self.sequence_items(close);
        self.nesting -= 1;
        items
    }

    fn sequence_items(&mut self, close: &Token) -> ScriptResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn dict_items(&mut self) -> ScriptResult<Vec<(Expr, Expr)>> {
        self.nesting += 1;
        let mut entries = Vec::new();
        let result = loop {
            if self.eat(&Token::RBrace) {
                break Ok(());
            }
            let key = match self.expression() {
                Ok(k) => k,
                Err(e) => break Err(e),
            };
            if let Err(e) = self.expect(&Token::Colon) {
                break Err(e);
            }
            let value = match self.expression() {
                Ok(v) => v,
                Err(e) => break Err(e),
            };
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                break self.expect(&Token::RBrace);
            }
        };
        self.nesting -= 1;
        result.map(|_| entries)
    }

    fn atom(&mut self) -> ScriptResult<Expr> {
        let token = match self.advance() {
            Some(t) => t,
            None => return self.error("unexpected end of input"),
        };

        match token {
            Token::Int(n) => Ok(Expr::Literal(Literal::Int(n))),
            Token::Float(n) => Ok(Expr::Literal(Literal::Float(n))),
            Token::String(s) => Ok(Expr::Literal(Literal::String(s))),
            Token::True => Ok(Expr::Literal(Literal::Boolean(true))),
            Token::False => Ok(Expr::Literal(Literal::Boolean(false))),
            Token::None_ => Ok(Expr::Literal(Literal::None)),
            Token::Ident(name) => Ok(Expr::Name(name)),
            Token::LParen => {
                self.nesting += 1;
                let inner = self.expression();
                let closed = inner.is_ok() && self.eat(&Token::RParen);
                self.nesting -= 1;
                let inner = inner?;
                if !closed {
                    return self.error("expected ')'");
                }
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::List(self.sequence(&Token::RBracket)?)),
            Token::LBrace => Ok(Expr::Dict(self.dict_items()?)),
            other => self.error(format!("unexpected '{}'", other)),
        }
    }
}
