//! Tokenizer for query text.
//!
//! Produces a flat token stream with byte offsets so the parser can report
//! positional errors against the original (possibly multi-line) source.
//! Keywords are not distinguished here; they surface as [`Tok::Ident`] and
//! are matched case-insensitively by the parser, since most keywords are
//! also legal attribute names in other positions.

use std::fmt;

use crate::error::ParseError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Identifier or keyword. May contain `_` and `-` (index and table
    /// names routinely carry hyphens, so `a-b` is one identifier; arithmetic
    /// requires spaces).
    Ident(String),
    /// A quoted string with quotes stripped and escapes applied.
    Str(String),
    /// An unsigned numeric literal, kept as raw text.
    Num(String),
    /// A binary literal `b'...'`, decoded to raw bytes.
    Bin(Vec<u8>),
    /// `=`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `+=`
    PlusEq,
    /// `-=`
    MinusEq,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `;`
    Semi,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// End of input.
    Eof,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "identifier '{s}'"),
            Self::Str(s) => write!(f, "string '{s}'"),
            Self::Num(n) => write!(f, "number {n}"),
            Self::Bin(b) => write!(f, "binary ({} bytes)", b.len()),
            Self::Eq => write!(f, "'='"),
            Self::Ne => write!(f, "'<>'"),
            Self::Lt => write!(f, "'<'"),
            Self::Le => write!(f, "'<='"),
            Self::Gt => write!(f, "'>'"),
            Self::Ge => write!(f, "'>='"),
            Self::Plus => write!(f, "'+'"),
            Self::Minus => write!(f, "'-'"),
            Self::Star => write!(f, "'*'"),
            Self::Slash => write!(f, "'/'"),
            Self::PlusEq => write!(f, "'+='"),
            Self::MinusEq => write!(f, "'-='"),
            Self::Shl => write!(f, "'<<'"),
            Self::Shr => write!(f, "'>>'"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::LBracket => write!(f, "'['"),
            Self::RBracket => write!(f, "']'"),
            Self::LBrace => write!(f, "'{{'"),
            Self::RBrace => write!(f, "'}}'"),
            Self::Comma => write!(f, "','"),
            Self::Semi => write!(f, "';'"),
            Self::Colon => write!(f, "':'"),
            Self::Dot => write!(f, "'.'"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with the byte offset where it starts in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token.
    pub tok: Tok,
    /// Byte offset of the token's first character.
    pub offset: usize,
}

/// Tokenizer over raw query text.
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl fmt::Debug for Lexer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lexer").field("pos", &self.pos).finish()
    }
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `input`.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            src: input.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the entire input, appending a trailing [`Tok::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.tok == Tok::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                // `--` comment to end of line.
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, ParseError> {
        self.skip_trivia();
        let offset = self.pos;

        let Some(c) = self.peek() else {
            return Ok(Spanned {
                tok: Tok::Eof,
                offset,
            });
        };

        let tok = match c {
            b'\'' | b'"' => Tok::Str(self.read_quoted(offset)?),
            b'b' | b'B' if matches!(self.peek_at(1), Some(b'\'' | b'"')) => {
                self.pos += 1;
                Tok::Bin(self.read_quoted(offset)?.into_bytes())
            }
            c if c.is_ascii_digit() => Tok::Num(self.read_number()),
            c if c.is_ascii_alphabetic() || c == b'_' => Tok::Ident(self.read_ident()),
            b'=' => {
                self.pos += 1;
                Tok::Eq
            }
            b'!' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Tok::Ne
                } else {
                    return Err(ParseError::new("unexpected character '!'", offset));
                }
            }
            b'<' => {
                self.pos += 1;
                match self.peek() {
                    Some(b'=') => {
                        self.pos += 1;
                        Tok::Le
                    }
                    Some(b'>') => {
                        self.pos += 1;
                        Tok::Ne
                    }
                    Some(b'<') => {
                        self.pos += 1;
                        Tok::Shl
                    }
                    _ => Tok::Lt,
                }
            }
            b'>' => {
                self.pos += 1;
                match self.peek() {
                    Some(b'=') => {
                        self.pos += 1;
                        Tok::Ge
                    }
                    Some(b'>') => {
                        self.pos += 1;
                        Tok::Shr
                    }
                    _ => Tok::Gt,
                }
            }
            b'+' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Tok::PlusEq
                } else {
                    Tok::Plus
                }
            }
            b'-' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Tok::MinusEq
                } else {
                    Tok::Minus
                }
            }
            b'*' => {
                self.pos += 1;
                Tok::Star
            }
            b'/' => {
                self.pos += 1;
                Tok::Slash
            }
            b'(' => {
                self.pos += 1;
                Tok::LParen
            }
            b')' => {
                self.pos += 1;
                Tok::RParen
            }
            b'[' => {
                self.pos += 1;
                Tok::LBracket
            }
            b']' => {
                self.pos += 1;
                Tok::RBracket
            }
            b'{' => {
                self.pos += 1;
                Tok::LBrace
            }
            b'}' => {
                self.pos += 1;
                Tok::RBrace
            }
            b',' => {
                self.pos += 1;
                Tok::Comma
            }
            b';' => {
                self.pos += 1;
                Tok::Semi
            }
            b':' => {
                self.pos += 1;
                Tok::Colon
            }
            b'.' => {
                self.pos += 1;
                Tok::Dot
            }
            other => {
                return Err(ParseError::new(
                    format!("unexpected character '{}'", char::from(other)),
                    offset,
                ));
            }
        };

        Ok(Spanned { tok, offset })
    }

    /// Read a quoted string, applying `\` escapes. The opening quote is at
    /// the current position.
    fn read_quoted(&mut self, start: usize) -> Result<String, ParseError> {
        let quote = self.bump().unwrap_or(b'\'');
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::new("unterminated string", start)),
                Some(c) if c == quote => {
                    return String::from_utf8(out)
                        .map_err(|_| ParseError::new("invalid UTF-8 in string", start));
                }
                Some(b'\\') => match self.bump() {
                    None => return Err(ParseError::new("unterminated string", start)),
                    Some(b'n') => out.push(b'\n'),
                    Some(b't') => out.push(b'\t'),
                    Some(escaped) => out.push(escaped),
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Read an unsigned number: digits with optional fraction and exponent.
    fn read_number(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mut ahead = 1;
            if matches!(self.peek_at(1), Some(b'+' | b'-')) {
                ahead = 2;
            }
            if self.peek_at(ahead).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += ahead;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn read_ident(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'-')
        {
            // A `--` inside an identifier position starts a comment, not a
            // hyphenated name.
            if self.peek() == Some(b'-') && self.peek_at(1) == Some(b'-') {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }
}

/// Tokenize `input`, returning the spanned token stream.
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    Lexer::new(input).tokenize()
}
