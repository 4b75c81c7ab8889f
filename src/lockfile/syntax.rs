//! Lexer and parser for the block-structured lock file syntax.
//!
//! The accepted language is a small subset of HCL: a body is a sequence of
//! attributes (`name = value`) and blocks (`type "label" { body }`), values
//! are quoted strings, bare identifiers, or bracketed lists of values.
//! Comments start with `#` or `//`, or are enclosed in `/* */`.
//!
//! Parsing stops at the first syntax error; semantic checks live in
//! [`super::decode`].

use crate::core::diagnostics::{Diagnostic, SourcePos};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    String(String),
    Ident(String),
    List(Vec<(Expr, SourcePos)>),
}

impl Expr {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Ident(_) => "identifier",
            Self::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub pos: SourcePos,
    pub value: Expr,
    pub value_pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: String,
    pub pos: SourcePos,
    pub labels: Vec<(String, SourcePos)>,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Attribute(Attribute),
    Block(Block),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    pub items: Vec<Item>,
}

impl Body {
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.items.iter().filter_map(|i| match i {
            Item::Attribute(a) => Some(a),
            Item::Block(_) => None,
        })
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|i| match i {
            Item::Block(b) => Some(b),
            Item::Attribute(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Comma,
    Newline,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(s) => format!("identifier {s:?}"),
            Self::Str(_) => "quoted string".to_string(),
            Self::LBrace => "\"{\"".to_string(),
            Self::RBrace => "\"}\"".to_string(),
            Self::LBracket => "\"[\"".to_string(),
            Self::RBracket => "\"]\"".to_string(),
            Self::Equals => "\"=\"".to_string(),
            Self::Comma => "\",\"".to_string(),
            Self::Newline => "end of line".to_string(),
            Self::Eof => "end of file".to_string(),
        }
    }
}

fn syntax_error(pos: SourcePos, detail: impl Into<String>) -> Diagnostic {
    Diagnostic::error("Invalid lock file syntax", detail).at(pos)
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn pos(&self) -> SourcePos {
        SourcePos {
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_line(&mut self) {
        while self.chars.peek().is_some_and(|&c| c != '\n') {
            self.bump();
        }
    }

    fn tokenize(mut self) -> Result<Vec<(Token, SourcePos)>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            let pos = self.pos();
            let Some(&c) = self.chars.peek() else {
                tokens.push((Token::Eof, pos));
                return Ok(tokens);
            };
            let token = match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                    continue;
                }
                '\n' => {
                    self.bump();
                    Token::Newline
                }
                '#' => {
                    self.skip_line();
                    continue;
                }
                '/' => {
                    self.bump();
                    match self.bump() {
                        Some('/') => self.skip_line(),
                        Some('*') => self.skip_block_comment(pos)?,
                        _ => return Err(syntax_error(pos, "unexpected \"/\"")),
                    }
                    continue;
                }
                '{' | '}' | '[' | ']' | '=' | ',' => {
                    self.bump();
                    match c {
                        '{' => Token::LBrace,
                        '}' => Token::RBrace,
                        '[' => Token::LBracket,
                        ']' => Token::RBracket,
                        '=' => Token::Equals,
                        _ => Token::Comma,
                    }
                }
                '"' => Token::Str(self.string(pos)?),
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if !(c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                            break;
                        }
                        ident.push(c);
                        self.bump();
                    }
                    Token::Ident(ident)
                }
                other => return Err(syntax_error(pos, format!("unexpected character {other:?}"))),
            };
            tokens.push((token, pos));
        }
    }

    fn skip_block_comment(&mut self, start: SourcePos) -> Result<(), Diagnostic> {
        loop {
            match self.bump() {
                Some('*') if self.chars.peek() == Some(&'/') => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(syntax_error(start, "unterminated comment")),
            }
        }
    }

    fn string(&mut self, start: SourcePos) -> Result<String, Diagnostic> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        other => {
                            return Err(syntax_error(
                                self.pos(),
                                format!("invalid escape sequence \\{}", other.unwrap_or(' ')),
                            ));
                        }
                    };
                    out.push(escaped);
                }
                Some('\n') | None => return Err(syntax_error(start, "unterminated string")),
                Some(c) => out.push(c),
            }
        }
    }
}

struct Parser {
    tokens: Vec<(Token, SourcePos)>,
    next: usize,
}

impl Parser {
    fn peek(&self) -> &(Token, SourcePos) {
        // the token list always ends with Eof
        &self.tokens[self.next.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> (Token, SourcePos) {
        let tok = self.peek().clone();
        if self.next < self.tokens.len() {
            self.next += 1;
        }
        tok
    }

    fn skip_newlines(&mut self) {
        while self.peek().0 == Token::Newline {
            self.advance();
        }
    }

    fn expect(&mut self, want: &Token, context: &str) -> Result<SourcePos, Diagnostic> {
        let (tok, pos) = self.advance();
        if &tok == want {
            Ok(pos)
        } else {
            Err(syntax_error(
                pos,
                format!("expected {} {context}, found {}", want.describe(), tok.describe()),
            ))
        }
    }

    fn body(&mut self, nested: bool) -> Result<Body, Diagnostic> {
        let mut body = Body::default();
        loop {
            self.skip_newlines();
            let (tok, pos) = self.peek().clone();
            match tok {
                Token::Eof if !nested => return Ok(body),
                Token::RBrace if nested => return Ok(body),
                Token::Eof => {
                    return Err(syntax_error(
                        pos,
                        "expected \"}\" to close the block, found end of file".to_string(),
                    ));
                }
                Token::Ident(name) => {
                    self.advance();
                    body.items.push(self.item(name, pos)?);
                }
                other => {
                    return Err(syntax_error(
                        pos,
                        format!("expected an attribute or block, found {}", other.describe()),
                    ));
                }
            }
        }
    }

    fn item(&mut self, name: String, pos: SourcePos) -> Result<Item, Diagnostic> {
        if self.peek().0 == Token::Equals {
            self.advance();
            let value_pos = self.peek().1;
            let value = self.expr()?;
            self.end_of_item()?;
            return Ok(Item::Attribute(Attribute {
                name,
                pos,
                value,
                value_pos,
            }));
        }

        let mut labels = Vec::new();
        loop {
            let (tok, label_pos) = self.advance();
            match tok {
                Token::Str(label) | Token::Ident(label) => labels.push((label, label_pos)),
                Token::LBrace => break,
                other => {
                    return Err(syntax_error(
                        label_pos,
                        format!(
                            "expected \"=\", a block label or \"{{\" after {name:?}, found {}",
                            other.describe()
                        ),
                    ));
                }
            }
        }
        let body = self.body(true)?;
        self.expect(&Token::RBrace, "to close the block")?;
        self.end_of_item()?;
        Ok(Item::Block(Block {
            kind: name,
            pos,
            labels,
            body,
        }))
    }

    /// An item ends at a newline, at end of input, or right before the
    /// closing brace of a single-line block.
    fn end_of_item(&mut self) -> Result<(), Diagnostic> {
        match self.peek().0 {
            Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::Eof | Token::RBrace => Ok(()),
            ref other => Err(syntax_error(
                self.peek().1,
                format!("expected end of line, found {}", other.describe()),
            )),
        }
    }

    fn expr(&mut self) -> Result<Expr, Diagnostic> {
        let (tok, pos) = self.advance();
        match tok {
            Token::Str(s) => Ok(Expr::String(s)),
            Token::Ident(s) => Ok(Expr::Ident(s)),
            Token::LBracket => {
                let mut items = Vec::new();
                loop {
                    self.skip_newlines();
                    if self.peek().0 == Token::RBracket {
                        self.advance();
                        return Ok(Expr::List(items));
                    }
                    let item_pos = self.peek().1;
                    items.push((self.expr()?, item_pos));
                    self.skip_newlines();
                    match self.advance() {
                        (Token::Comma, _) => {}
                        (Token::RBracket, _) => return Ok(Expr::List(items)),
                        (other, p) => {
                            return Err(syntax_error(
                                p,
                                format!("expected \",\" or \"]\" in list, found {}", other.describe()),
                            ));
                        }
                    }
                }
            }
            other => Err(syntax_error(pos, format!("expected a value, found {}", other.describe()))),
        }
    }
}

/// Parse a whole file into its top-level body.
pub fn parse(src: &str) -> Result<Body, Diagnostic> {
    let tokens = Lexer::new(src).tokenize()?;
    Parser { tokens, next: 0 }.body(false)
}
