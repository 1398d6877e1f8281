use super::ast::*;
use super::error::CompileError;
use super::lexer::{SpannedToken, Token};

/// Deepest expression / block nesting accepted. Keeps the recursive parser
/// and the tree-walking interpreter well inside the run thread's stack.
const MAX_NESTING: usize = 96;

const IMPORT_KEYWORDS: &[&str] = &["import", "use", "from", "mod", "extern"];

pub fn parse(tokens: Vec<SpannedToken>) -> Result<Script, Vec<CompileError>> {
    let mut parser = Parser::new(tokens);
    parser.parse_script()
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
    errors: Vec<CompileError>,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            errors: Vec::new(),
        }
    }

    fn parse_script(&mut self) -> Result<Script, Vec<CompileError>> {
        let mut functions = Vec::new();
        let mut body = Vec::new();

        self.skip_separators();

        while !self.at_eof() {
            match self.peek() {
                Token::Fn => match self.parse_fn_def() {
                    Ok(f) => functions.push(f),
                    Err(e) => {
                        self.errors.push(e);
                        self.recover();
                    }
                },
                Token::RBrace => {
                    self.errors.push(CompileError::parser("unmatched '}'", self.span()));
                    self.advance();
                }
                _ => match self.parse_stmt() {
                    Ok(s) => body.push(s),
                    Err(e) => {
                        self.errors.push(e);
                        self.recover();
                    }
                },
            }
            self.skip_separators();
        }

        if self.errors.is_empty() {
            Ok(Script { functions, body })
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map_or(&Token::Eof, |t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).map_or(&Token::Eof, |t| &t.token)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).map_or(Span::new(0, 0), |t| t.span)
    }

    fn indent(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |t| t.indent)
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(Span::new(0, 0), |t| t.span)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Span, CompileError> {
        if self.peek() == expected {
            let sp = self.span();
            self.advance();
            Ok(sp)
        } else {
            Err(self.unexpected(&format!("'{}'", expected_symbol(expected))))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span), CompileError> {
        if let Token::Ident(name) = self.peek().clone() {
            let sp = self.span();
            self.advance();
            Ok((name, sp))
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        CompileError::parser(
            format!("expected {expected}, found {}", self.peek().describe()),
            self.span(),
        )
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Token::Newline) {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Token::Newline | Token::Semicolon) {
            self.advance();
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            Token::Newline | Token::Semicolon | Token::RBrace | Token::Eof
        )
    }

    fn expect_statement_end(&self) -> Result<(), CompileError> {
        if self.at_statement_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of statement"))
        }
    }

    /// Skip to the start of the next line so one bad statement does not hide
    /// errors further down.
    fn recover(&mut self) {
        self.depth = 0;
        while !matches!(self.peek(), Token::Newline | Token::Eof) {
            self.advance();
        }
    }

    fn enter(&mut self) -> Result<(), CompileError> {
        self.nest(|| format!("script is nested more than {MAX_NESTING} levels deep"))
    }

    /// One more operator in a left-to-right chain (`a + b + c`, `xs[0][1]`).
    /// Parsing the chain is a loop, but every later pass walks the tree one
    /// level per operator, so the chain counts toward the same limit.
    fn fold(&mut self) -> Result<(), CompileError> {
        self.nest(|| {
            format!(
                "expression is nested more than {MAX_NESTING} levels deep; \
                 split long operator chains across several statements"
            )
        })
    }

    fn nest(&mut self, message: impl FnOnce() -> String) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            Err(CompileError::parser(message(), self.span()))
        } else {
            Ok(())
        }
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ── Functions ─────────────────────────────────────────────────

    fn parse_fn_def(&mut self) -> Result<FnDef, CompileError> {
        let start = self.span();
        let header_indent = self.indent();
        self.advance(); // fn
        let (name, _) = self.expect_ident("a function name")?;
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        while !matches!(self.peek(), Token::RParen) {
            let (param, _) = self.expect_ident("a parameter name")?;
            params.push(param);
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        let body = self.parse_block(header_indent)?;
        Ok(FnDef {
            name,
            params,
            body,
            span: start.merge(self.prev_span()),
        })
    }

    // ── Blocks ────────────────────────────────────────────────────

    /// `{ stmts }`, `: stmt; stmt` on the same line, or `:` followed by an
    /// indented block deeper than `header_indent`.
    fn parse_block(&mut self, header_indent: usize) -> Result<Vec<Stmt>, CompileError> {
        self.enter()?;
        let block = match self.peek() {
            Token::LBrace => self.parse_brace_block(),
            Token::Colon => {
                self.advance();
                if matches!(self.peek(), Token::Newline) {
                    self.skip_newlines();
                    self.parse_indented_block(header_indent)
                } else {
                    self.parse_inline_block()
                }
            }
            _ => Err(self.unexpected("'{' or ':' to start a block")),
        };
        self.leave();
        block
    }

    fn parse_brace_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let open = self.expect(&Token::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                Token::RBrace => {
                    self.advance();
                    return Ok(stmts);
                }
                Token::Eof => {
                    return Err(CompileError::parser(
                        "expected '}' to close this block",
                        open,
                    ))
                }
                _ => stmts.push(self.parse_stmt()?),
            }
        }
    }

    fn parse_inline_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = vec![self.parse_stmt()?];
        while matches!(self.peek(), Token::Semicolon) {
            self.advance();
            if self.at_statement_end() {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_indented_block(&mut self, header_indent: usize) -> Result<Vec<Stmt>, CompileError> {
        let block_indent = self.indent();
        if block_indent <= header_indent || self.at_eof() {
            return Err(CompileError::parser(
                "expected an indented block after ':'",
                self.span(),
            ));
        }
        let mut stmts = Vec::new();
        loop {
            stmts.push(self.parse_stmt()?);
            self.skip_separators();
            if self.at_eof() {
                break;
            }
            let indent = self.indent();
            if indent <= header_indent {
                break;
            }
            if indent != block_indent {
                return Err(CompileError::parser(
                    if indent > block_indent {
                        "unexpected indent"
                    } else {
                        "unindent does not match any outer indentation level"
                    },
                    self.span(),
                ));
            }
        }
        Ok(stmts)
    }

    // ── Statements ────────────────────────────────────────────────

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.span();
        match self.peek().clone() {
            Token::If => {
                let header_indent = self.indent();
                self.advance();
                self.parse_if(span, header_indent)
            }
            Token::While => {
                let header_indent = self.indent();
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block(header_indent)?;
                Ok(Stmt::While {
                    cond,
                    body,
                    span: span.merge(self.prev_span()),
                })
            }
            Token::For => {
                let header_indent = self.indent();
                self.advance();
                let (var, _) = self.expect_ident("a loop variable name")?;
                self.expect(&Token::In)?;
                let iter = self.parse_expr()?;
                let body = self.parse_block(header_indent)?;
                Ok(Stmt::For {
                    var,
                    iter,
                    body,
                    span: span.merge(self.prev_span()),
                })
            }
            Token::Fn => Err(CompileError::parser(
                "functions can only be defined at the top level",
                span,
            )),
            Token::Return => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_statement_end()?;
                Ok(Stmt::Return {
                    value,
                    span: span.merge(self.prev_span()),
                })
            }
            Token::Break => self.keyword_stmt(Stmt::Break(span)),
            Token::Continue => self.keyword_stmt(Stmt::Continue(span)),
            Token::Pass => self.keyword_stmt(Stmt::Pass(span)),
            Token::Reserved(kw) => Err(CompileError::parser(
                if IMPORT_KEYWORDS.contains(&kw.as_str()) {
                    format!(
                        "'{kw}' statements are not allowed: scripts cannot load modules, \
                         every available function is already defined"
                    )
                } else {
                    format!("'{kw}' is not supported in scripts")
                },
                span,
            )),
            Token::Let => {
                self.advance();
                let stmt = self.parse_simple_stmt()?;
                match &stmt {
                    Stmt::Assign {
                        target: Target::Name(..),
                        op: None,
                        ..
                    } => Ok(stmt),
                    _ => Err(CompileError::parser(
                        "expected 'let name = value'",
                        span,
                    )),
                }
            }
            _ => self.parse_simple_stmt(),
        }
    }

    fn keyword_stmt(&mut self, stmt: Stmt) -> Result<Stmt, CompileError> {
        self.advance();
        self.expect_statement_end()?;
        Ok(stmt)
    }

    fn parse_if(&mut self, start: Span, header_indent: usize) -> Result<Stmt, CompileError> {
        let cond = self.parse_expr()?;
        let then_body = self.parse_block(header_indent)?;
        let else_body = if self.at_else(header_indent) {
            let else_span = self.span();
            let chained = if matches!(self.peek(), Token::Elif) {
                self.advance();
                true
            } else {
                self.advance(); // else
                if matches!(self.peek(), Token::If) {
                    self.advance();
                    true
                } else {
                    false
                }
            };
            if chained {
                // Each `elif` nests one more `if` in the else branch.
                self.enter()?;
                let nested = self.parse_if(else_span, header_indent);
                self.leave();
                vec![nested?]
            } else {
                self.parse_block(header_indent)?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
            span: start.merge(self.prev_span()),
        })
    }

    /// An `else`/`elif` belongs to this `if` when it follows the block on the
    /// same line, or starts a later line at the `if`'s indentation.
    fn at_else(&mut self, header_indent: usize) -> bool {
        let mut look = self.pos;
        while matches!(self.tokens.get(look).map(|t| &t.token), Some(Token::Newline)) {
            look += 1;
        }
        let Some(token) = self.tokens.get(look) else {
            return false;
        };
        if !matches!(token.token, Token::Else | Token::Elif) {
            return false;
        }
        let same_line = look == self.pos
            && !matches!(
                self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)).map(|t| &t.token),
                Some(Token::Newline | Token::Semicolon)
            );
        if same_line || token.indent == header_indent {
            self.pos = look;
            true
        } else {
            false
        }
    }

    /// Expression statement or assignment.
    fn parse_simple_stmt(&mut self) -> Result<Stmt, CompileError> {
        let expr = self.parse_expr()?;
        let op = match self.peek() {
            Token::Eq => None,
            Token::PlusEq => Some(BinOp::Add),
            Token::MinusEq => Some(BinOp::Sub),
            Token::StarEq => Some(BinOp::Mul),
            Token::SlashEq => Some(BinOp::Div),
            Token::PercentEq => Some(BinOp::Mod),
            _ => {
                self.expect_statement_end()?;
                return Ok(Stmt::Expr(expr));
            }
        };
        self.advance();
        let span = expr.span;
        let target = match expr.kind {
            ExprKind::Name(name) => Target::Name(name, span),
            ExprKind::Index(object, index) => Target::Index {
                object: *object,
                index: *index,
            },
            ExprKind::Field(object, field) => Target::Field {
                object: *object,
                field,
            },
            _ => {
                return Err(CompileError::parser(
                    "can only assign to a name, an element xs[i] or a field m.key",
                    span,
                ))
            }
        };
        let value = self.parse_expr()?;
        self.expect_statement_end()?;
        Ok(Stmt::Assign {
            target,
            op,
            span: span.merge(value.span),
            value,
        })
    }

    // ── Expressions ───────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let expr = self.parse_or();
        self.leave();
        expr
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Token::Or) {
            self.fold()?;
            self.advance();
            let right = self.parse_and()?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Logical(LogicOp::Or, Box::new(left), Box::new(right)),
                span,
            );
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Token::And) {
            self.fold()?;
            self.advance();
            let right = self.parse_not()?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Logical(LogicOp::And, Box::new(left), Box::new(right)),
                span,
            );
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, CompileError> {
        if matches!(self.peek(), Token::Not) {
            let start = self.span();
            self.advance();
            self.enter()?;
            let operand = self.parse_not();
            self.leave();
            let operand = operand?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(ExprKind::Unary(UnaryOp::Not, Box::new(operand)), span));
        }
        self.parse_comparison()
    }

    fn comparison_op(&self) -> Option<(BinOp, bool)> {
        let op = match self.peek() {
            Token::EqEq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            Token::In => BinOp::In,
            Token::Not if matches!(self.peek_at(1), Token::In) => return Some((BinOp::In, true)),
            _ => return None,
        };
        Some((op, false))
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let left = self.parse_range()?;
        let Some((op, negated)) = self.comparison_op() else {
            return Ok(left);
        };
        self.advance();
        if negated {
            self.advance();
        }
        let right = self.parse_range()?;
        if self.comparison_op().is_some() {
            return Err(CompileError::parser(
                "chained comparisons are not supported; combine them with 'and'",
                self.span(),
            ));
        }
        let span = left.span.merge(right.span);
        let cmp = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), span);
        Ok(if negated {
            Expr::new(ExprKind::Unary(UnaryOp::Not, Box::new(cmp)), span)
        } else {
            cmp
        })
    }

    fn parse_range(&mut self) -> Result<Expr, CompileError> {
        let left = self.parse_add()?;
        if matches!(self.peek(), Token::DotDot) {
            self.advance();
            let right = self.parse_add()?;
            let span = left.span.merge(right.span);
            return Ok(Expr::new(ExprKind::Range(Box::new(left), Box::new(right)), span));
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.fold()?;
            self.advance();
            let right = self.parse_mul()?;
            let span = left.span.merge(right.span);
            left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), span);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.fold()?;
            self.advance();
            let right = self.parse_unary()?;
            let span = left.span.merge(right.span);
            left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), span);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Not => UnaryOp::Not,
            Token::Plus => {
                self.advance();
                self.enter()?;
                let operand = self.parse_unary();
                self.leave();
                return operand;
            }
            _ => return self.parse_power(),
        };
        let start = self.span();
        self.advance();
        self.enter()?;
        let operand = self.parse_unary();
        self.leave();
        let operand = operand?;
        let span = start.merge(operand.span);
        Ok(Expr::new(ExprKind::Unary(op, Box::new(operand)), span))
    }

    fn parse_power(&mut self) -> Result<Expr, CompileError> {
        let left = self.parse_postfix()?;
        if matches!(self.peek(), Token::StarStar) {
            self.advance();
            // Right-associative, and `2 ** -1` is allowed
            self.enter()?;
            let right = self.parse_unary();
            self.leave();
            let right = right?;
            let span = left.span.merge(right.span);
            return Ok(Expr::new(ExprKind::Binary(BinOp::Pow, Box::new(left), Box::new(right)), span));
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut expr = self.parse_primary()?;

        loop {
            if matches!(self.peek(), Token::Dot | Token::LBracket | Token::LParen) {
                self.fold()?;
            }
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let (field, field_span) = self.expect_ident("a field name after '.'")?;
                    if matches!(self.peek(), Token::LParen) {
                        self.advance();
                        let (args, named) = self.parse_args()?;
                        if let Some((name, _)) = named.first() {
                            return Err(CompileError::parser(
                                format!("method '{field}' does not take named arguments (got '{name}')"),
                                field_span,
                            ));
                        }
                        let span = expr.span.merge(self.prev_span());
                        expr = Expr::new(
                            ExprKind::Method {
                                receiver: Box::new(expr),
                                method: field,
                                args,
                            },
                            span,
                        );
                    } else {
                        let span = expr.span.merge(field_span);
                        expr = Expr::new(ExprKind::Field(Box::new(expr), field), span);
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket)?;
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr::new(ExprKind::Index(Box::new(expr), Box::new(index)), span);
                }
                Token::LParen => {
                    let ExprKind::Name(callee) = &expr.kind else {
                        return Err(CompileError::parser(
                            "only named functions can be called",
                            self.span(),
                        ));
                    };
                    let callee = callee.clone();
                    self.advance();
                    let (args, named) = self.parse_args()?;
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr::new(ExprKind::Call { callee, args, named }, span);
                }
                _ => break,
            }
        }

        self.depth = base;
        Ok(expr)
    }

    /// Call arguments up to and including `)`. Named arguments (`name=value`)
    /// must follow the positional ones.
    fn parse_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), CompileError> {
        let mut args = Vec::new();
        let mut named: Vec<(String, Expr)> = Vec::new();
        while !matches!(self.peek(), Token::RParen) {
            if let (Token::Ident(name), Token::Eq) = (self.peek().clone(), self.peek_at(1)) {
                let name_span = self.span();
                self.advance();
                self.advance();
                if named.iter().any(|(n, _)| *n == name) {
                    return Err(CompileError::parser(
                        format!("argument '{name}' given more than once"),
                        name_span,
                    ));
                }
                named.push((name, self.parse_expr()?));
            } else {
                if !named.is_empty() {
                    return Err(CompileError::parser(
                        "positional argument follows a named argument",
                        self.span(),
                    ));
                }
                args.push(self.parse_expr()?);
            }
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok((args, named))
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        let kind = match self.peek().clone() {
            Token::Int(v) => ExprKind::Int(v),
            Token::Float(v) => ExprKind::Float(v),
            Token::Str(s) => ExprKind::Str(s),
            Token::True => ExprKind::Bool(true),
            Token::False => ExprKind::Bool(false),
            Token::Null => ExprKind::Null,
            Token::Ident(name) => ExprKind::Name(name),
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                return Ok(Expr::new(inner.kind, span.merge(self.prev_span())));
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !matches!(self.peek(), Token::RBracket) {
                    items.push(self.parse_expr()?);
                    if matches!(self.peek(), Token::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(&Token::RBracket)?;
                return Ok(Expr::new(ExprKind::List(items), span.merge(self.prev_span())));
            }
            Token::LBrace => return self.parse_map_literal(),
            Token::Reserved(kw) => {
                return Err(CompileError::parser(
                    format!("'{kw}' is not supported in scripts"),
                    span,
                ))
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(Expr::new(kind, span))
    }

    fn parse_map_literal(&mut self) -> Result<Expr, CompileError> {
        let start = self.expect(&Token::LBrace)?;
        let mut entries: Vec<(String, Expr)> = Vec::new();
        loop {
            self.skip_newlines();
            let key = match self.peek().clone() {
                Token::RBrace => break,
                Token::Str(k) | Token::Ident(k) => k,
                _ => return Err(self.unexpected("a map key (string or name)")),
            };
            let key_span = self.span();
            self.advance();
            self.skip_newlines();
            self.expect(&Token::Colon)?;
            self.skip_newlines();
            let value = self.parse_expr()?;
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(CompileError::parser(format!("duplicate map key '{key}'"), key_span));
            }
            entries.push((key, value));
            self.skip_newlines();
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                self.skip_newlines();
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::new(ExprKind::Map(entries), start.merge(self.prev_span())))
    }
}

fn expected_symbol(token: &Token) -> String {
    let described = token.describe();
    described.trim_matches('\'').to_string()
}
