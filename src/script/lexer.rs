use super::ast::Span;
use super::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,

    // Identifiers & keywords
    Ident(String),
    Let,
    Fn,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Return,
    Break,
    Continue,
    Pass,
    And,
    Or,
    Not,
    /// Keyword of a construct scripts may not use (`import`, `class`, ...).
    Reserved(String),

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    DotDot,    // ..
    Colon,
    Semicolon,

    // Operators
    Plus,
    Minus,
    Star,
    StarStar,   // **
    Slash,
    SlashSlash, // //
    Percent,
    Lt,
    Gt,
    Le,         // <=
    Ge,         // >=
    EqEq,       // ==
    Ne,         // !=
    Eq,         // =
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,

    // Special
    Newline,
    Eof,
}

impl Token {
    /// How the token reads in an error message.
    pub fn describe(&self) -> String {
        match self {
            Token::Int(n) => format!("number {n}"),
            Token::Float(f) => format!("number {f}"),
            Token::Str(s) => format!("string \"{s}\""),
            Token::Ident(name) => format!("'{name}'"),
            Token::Reserved(kw) => format!("'{kw}'"),
            Token::Newline => "end of line".to_string(),
            Token::Eof => "end of script".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Let => "let",
            Token::Fn => "fn",
            Token::If => "if",
            Token::Elif => "elif",
            Token::Else => "else",
            Token::While => "while",
            Token::For => "for",
            Token::In => "in",
            Token::Return => "return",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Pass => "pass",
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::DotDot => "..",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::StarStar => "**",
            Token::Slash => "/",
            Token::SlashSlash => "//",
            Token::Percent => "%",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::EqEq => "==",
            Token::Ne => "!=",
            Token::Eq => "=",
            Token::PlusEq => "+=",
            Token::MinusEq => "-=",
            Token::StarEq => "*=",
            Token::SlashEq => "/=",
            Token::PercentEq => "%=",
            Token::Int(_)
            | Token::Float(_)
            | Token::Str(_)
            | Token::Ident(_)
            | Token::Reserved(_)
            | Token::Newline
            | Token::Eof => "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
    /// Indentation width of the line the token sits on.
    pub indent: usize,
}

pub fn lex(source: &str) -> Result<Vec<SpannedToken>, Vec<CompileError>> {
    let mut lexer = Lexer::new(source);
    lexer.tokenize()
}

fn keyword(word: &str) -> Option<Token> {
    let token = match word {
        "let" => Token::Let,
        "fn" | "def" => Token::Fn,
        "if" => Token::If,
        "elif" => Token::Elif,
        "else" => Token::Else,
        "while" => Token::While,
        "for" => Token::For,
        "in" => Token::In,
        "return" => Token::Return,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "pass" => Token::Pass,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" | "True" => Token::True,
        "false" | "False" => Token::False,
        "null" | "None" => Token::Null,
        "import" | "use" | "from" | "mod" | "extern" | "class" | "global" | "nonlocal"
        | "lambda" | "with" | "try" | "except" | "raise" | "yield" | "del" | "async"
        | "await" | "unsafe" => Token::Reserved(word.to_string()),
        _ => return None,
    };
    Some(token)
}

const TAB_WIDTH: usize = 4;

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Open `(` and `[` count. Line breaks inside them are not statement ends.
    depth: usize,
    indent: usize,
    tokens: Vec<SpannedToken>,
    errors: Vec<CompileError>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            depth: 0,
            indent: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<SpannedToken>, Vec<CompileError>> {
        self.measure_indent();
        while self.pos < self.bytes.len() {
            self.skip_whitespace_and_comments();
            if self.pos >= self.bytes.len() {
                break;
            }

            let start = self.pos;
            let ch = self.bytes[self.pos];

            match ch {
                b'\n' | b'\r' => {
                    self.pos += 1;
                    self.measure_indent();
                    if self.depth == 0 {
                        if let Some(last) = self.tokens.last() {
                            if !Self::continues_expression(&last.token) {
                                self.push(Token::Newline, start, start + 1);
                            }
                        }
                    }
                }
                b'(' => {
                    self.depth += 1;
                    self.single(Token::LParen, start);
                }
                b')' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.single(Token::RParen, start);
                }
                b'[' => {
                    self.depth += 1;
                    self.single(Token::LBracket, start);
                }
                b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.single(Token::RBracket, start);
                }
                b'{' => self.single(Token::LBrace, start),
                b'}' => self.single(Token::RBrace, start),
                b',' => self.single(Token::Comma, start),
                b':' => self.single(Token::Colon, start),
                b';' => self.single(Token::Semicolon, start),
                b'.' => {
                    self.pos += 1;
                    if self.peek() == Some(b'.') {
                        self.pos += 1;
                        self.push(Token::DotDot, start, self.pos);
                    } else {
                        self.push(Token::Dot, start, self.pos);
                    }
                }
                b'+' => self.with_assign(Token::Plus, Token::PlusEq, start),
                b'-' => self.with_assign(Token::Minus, Token::MinusEq, start),
                b'%' => self.with_assign(Token::Percent, Token::PercentEq, start),
                b'*' => {
                    if self.bytes.get(self.pos + 1) == Some(&b'*') {
                        self.pos += 2;
                        self.push(Token::StarStar, start, self.pos);
                    } else {
                        self.with_assign(Token::Star, Token::StarEq, start);
                    }
                }
                b'/' => {
                    if self.bytes.get(self.pos + 1) == Some(&b'/') {
                        self.pos += 2;
                        self.push(Token::SlashSlash, start, self.pos);
                    } else {
                        self.with_assign(Token::Slash, Token::SlashEq, start);
                    }
                }
                b'<' => self.with_assign(Token::Lt, Token::Le, start),
                b'>' => self.with_assign(Token::Gt, Token::Ge, start),
                b'=' => self.with_assign(Token::Eq, Token::EqEq, start),
                b'!' => self.with_assign(Token::Not, Token::Ne, start),
                b'&' | b'|' => {
                    self.pos += 1;
                    if self.peek() == Some(ch) {
                        self.pos += 1;
                        let token = if ch == b'&' { Token::And } else { Token::Or };
                        self.push(token, start, self.pos);
                    } else {
                        self.errors.push(CompileError::lexer(
                            format!("unexpected '{}'; use '{0}{0}' or '{1}'", ch as char, if ch == b'&' { "and" } else { "or" }),
                            Span::new(start, self.pos),
                        ));
                    }
                }
                b'"' | b'\'' => {
                    self.pos += 1;
                    self.lex_string(start, ch);
                }
                b'0'..=b'9' => self.lex_number(start),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_ident(start),
                _ => {
                    let shown = self.source[start..].chars().next().unwrap_or('?');
                    self.errors.push(CompileError::lexer(
                        format!("unexpected character '{shown}'"),
                        Span::new(start, start + shown.len_utf8()),
                    ));
                    self.pos += shown.len_utf8();
                }
            }
        }

        // Remove trailing newline
        if let Some(last) = self.tokens.last() {
            if matches!(last.token, Token::Newline) {
                self.tokens.pop();
            }
        }

        self.tokens.push(SpannedToken {
            token: Token::Eof,
            span: Span::new(self.pos, self.pos),
            indent: 0,
        });

        if self.errors.is_empty() {
            Ok(std::mem::take(&mut self.tokens))
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn single(&mut self, token: Token, start: usize) {
        self.pos += 1;
        self.push(token, start, self.pos);
    }

    /// `op` or, when followed by `=`, `op_eq`.
    fn with_assign(&mut self, op: Token, op_eq: Token, start: usize) {
        self.pos += 1;
        if self.peek() == Some(b'=') {
            self.pos += 1;
            self.push(op_eq, start, self.pos);
        } else {
            self.push(op, start, self.pos);
        }
    }

    fn push(&mut self, token: Token, start: usize, end: usize) {
        // An infix operator opening a line continues the previous one:
        //   total = a
        //       + b
        if Self::continues_from_previous(&token) {
            if let Some(last) = self.tokens.last() {
                if matches!(last.token, Token::Newline) {
                    self.tokens.pop();
                }
            }
        }
        self.tokens.push(SpannedToken {
            token,
            span: Span::new(start, end),
            indent: self.indent,
        });
    }

    /// At the start of a line: skip blank and comment-only lines and record
    /// the indentation of the next line with content.
    fn measure_indent(&mut self) {
        loop {
            let mut width = 0;
            while let Some(b) = self.peek() {
                match b {
                    b' ' => width += 1,
                    b'\t' => width += TAB_WIDTH,
                    _ => break,
                }
                self.pos += 1;
            }
            match self.peek() {
                Some(b'\n' | b'\r') => self.pos += 1,
                Some(b'#') => self.skip_comment(),
                _ => {
                    self.indent = width;
                    return;
                }
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' || b == b'\r' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' => self.pos += 1,
                b'#' => self.skip_comment(),
                b'\\' if matches!(self.bytes.get(self.pos + 1), Some(b'\n' | b'\r')) => {
                    // explicit line continuation
                    self.pos += 2;
                }
                _ => break,
            }
        }
    }

    /// Returns true if a newline after this token should be suppressed,
    /// because the token indicates an expression continues on the next line.
    fn continues_expression(token: &Token) -> bool {
        matches!(
            token,
            Token::Plus
                | Token::Minus
                | Token::Star
                | Token::StarStar
                | Token::Slash
                | Token::SlashSlash
                | Token::Percent
                | Token::Lt
                | Token::Gt
                | Token::Le
                | Token::Ge
                | Token::EqEq
                | Token::Ne
                | Token::And
                | Token::Or
                | Token::Not
                | Token::Eq
                | Token::PlusEq
                | Token::MinusEq
                | Token::StarEq
                | Token::SlashEq
                | Token::PercentEq
                | Token::Comma
                | Token::Dot
                | Token::DotDot
                | Token::LBrace
                | Token::Semicolon
                | Token::Newline
        )
    }

    /// Returns true if this token at the START of a new line means the
    /// previous expression continues. Excludes `-` and `not`, which also
    /// start statements.
    fn continues_from_previous(token: &Token) -> bool {
        matches!(
            token,
            Token::Plus
                | Token::Star
                | Token::StarStar
                | Token::Slash
                | Token::SlashSlash
                | Token::Percent
                | Token::Lt
                | Token::Gt
                | Token::Le
                | Token::Ge
                | Token::EqEq
                | Token::Ne
                | Token::And
                | Token::Or
                | Token::Dot
                | Token::DotDot
        )
    }

    fn lex_number(&mut self, start: usize) {
        let mut is_float = false;
        self.eat_digits();
        if self.peek() == Some(b'.') && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit) {
            is_float = true;
            self.pos += 1;
            self.eat_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mut look = self.pos + 1;
            if matches!(self.bytes.get(look), Some(b'+' | b'-')) {
                look += 1;
            }
            if self.bytes.get(look).is_some_and(u8::is_ascii_digit) {
                is_float = true;
                self.pos = look;
                self.eat_digits();
            }
        }

        let text: String = self.source[start..self.pos].chars().filter(|c| *c != '_').collect();
        let span = Span::new(start, self.pos);
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => self.push(Token::Float(v), start, self.pos),
                Err(_) => self.errors.push(CompileError::lexer(format!("invalid number '{text}'"), span)),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => self.push(Token::Int(v), start, self.pos),
                Err(_) => self.errors.push(CompileError::lexer(
                    format!("integer literal {text} is too large"),
                    span,
                )),
            }
        }
    }

    fn eat_digits(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn lex_ident(&mut self, start: usize) {
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word = &self.source[start..self.pos];
        let token = keyword(word).unwrap_or_else(|| Token::Ident(word.to_string()));
        self.push(token, start, self.pos);
    }

    fn lex_string(&mut self, start: usize, quote: u8) {
        let mut value = String::new();
        loop {
            let Some(ch) = self.source[self.pos..].chars().next() else {
                self.errors.push(CompileError::lexer(
                    "unterminated string",
                    Span::new(start, self.pos),
                ));
                return;
            };
            match ch {
                '\n' | '\r' => {
                    self.errors.push(CompileError::lexer(
                        "unterminated string: strings cannot span lines",
                        Span::new(start, self.pos),
                    ));
                    return;
                }
                '\\' => {
                    self.pos += 1;
                    let Some(esc) = self.source[self.pos..].chars().next() else {
                        continue;
                    };
                    self.pos += esc.len_utf8();
                    match esc {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' | '\'' | '"' => value.push(esc),
                        other => self.errors.push(CompileError::lexer(
                            format!("unknown escape '\\{other}'"),
                            Span::new(self.pos - 1 - other.len_utf8(), self.pos),
                        )),
                    }
                }
                c if c as u32 == u32::from(quote) => {
                    self.pos += 1;
                    self.push(Token::Str(value), start, self.pos);
                    return;
                }
                c => {
                    value.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn tok(src: &str) -> Vec<Token> {
        lex(src).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn range_is_not_a_float() {
        assert_eq!(
            tok("0..3"),
            vec![Token::Int(0), Token::DotDot, Token::Int(3), Token::Eof]
        );
        assert_eq!(tok("1.5e2"), vec![Token::Float(150.0), Token::Eof]);
        assert_eq!(tok("1_000"), vec![Token::Int(1000), Token::Eof]);
    }

    #[test]
    fn python_spellings_map_to_keywords() {
        assert_eq!(
            tok("def True None and"),
            vec![Token::Fn, Token::True, Token::Null, Token::And, Token::Eof]
        );
        assert_eq!(
            tok("import os"),
            vec![Token::Reserved("import".into()), Token::Ident("os".into()), Token::Eof]
        );
    }

    #[test]
    fn no_newline_inside_brackets() {
        assert_eq!(
            tok("f(1,\n2)\nx"),
            vec![
                Token::Ident("f".into()),
                Token::LParen,
                Token::Int(1),
                Token::Comma,
                Token::Int(2),
                Token::RParen,
                Token::Newline,
                Token::Ident("x".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn leading_operator_continuation() {
        assert_eq!(
            tok("a\n+ b"),
            vec![Token::Ident("a".into()), Token::Plus, Token::Ident("b".into()), Token::Eof]
        );
    }

    #[test]
    fn comments_and_blank_lines_collapse() {
        assert_eq!(
            tok("a # note\n\n   # more\nb"),
            vec![Token::Ident("a".into()), Token::Newline, Token::Ident("b".into()), Token::Eof]
        );
    }

    #[test]
    fn tokens_carry_line_indent() {
        let tokens = lex("for i in xs:\n    f(i)\ng()").unwrap();
        let f = tokens.iter().find(|t| t.token == Token::Ident("f".into())).unwrap();
        let g = tokens.iter().find(|t| t.token == Token::Ident("g".into())).unwrap();
        assert_eq!(f.indent, 4);
        assert_eq!(g.indent, 0);
    }

    #[test]
    fn strings_take_either_quote_and_escapes() {
        assert_eq!(
            tok(r#"'it\'s' "a\tb""#),
            vec![Token::Str("it's".into()), Token::Str("a\tb".into()), Token::Eof]
        );
        assert!(lex("\"open").is_err());
    }

    #[test]
    fn compound_assignment_tokens() {
        assert_eq!(
            tok("x += 1 // 2"),
            vec![
                Token::Ident("x".into()),
                Token::PlusEq,
                Token::Int(1),
                Token::SlashSlash,
                Token::Int(2),
                Token::Eof
            ]
        );
    }

    #[test]
    fn stray_characters_are_reported() {
        let errs = lex("x = $").unwrap_err();
        assert_eq!(errs[0].message, "unexpected character '$'");
    }
}
