use super::SyntaxError;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, PartialEq)]
pub(crate) enum TokenKind {
    Word { text: String, quoted: bool },
    Semicolon,
    BlockStart,
    BlockEnd,
    Comment(String),
}

#[derive(Debug, PartialEq, derive_new::new)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer {
        chars: input.chars().peekable(),
        line: 1,
    };

    let mut tokens = vec![];
    while let Some(c) = lexer.chars.next() {
        let line = lexer.line;
        let kind = match c {
            '\n' => {
                lexer.line += 1;
                continue;
            }
            c if c.is_whitespace() => continue,
            ';' => TokenKind::Semicolon,
            '{' => TokenKind::BlockStart,
            '}' => TokenKind::BlockEnd,
            '#' => TokenKind::Comment(lexer.rest_of_line()),
            '"' | '\'' => TokenKind::Word {
                text: lexer.quoted(c)?,
                quoted: true,
            },
            c => TokenKind::Word {
                text: lexer.bare(c),
                quoted: false,
            },
        };

        tokens.push(Token::new(kind, line));
    }

    Ok(tokens)
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl Lexer<'_> {
    fn next_counted(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn rest_of_line(&mut self) -> String {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.chars.next();
        }
        text
    }

    /// Reads up to the closing `quote`
    ///
    /// Escaped quotes and backslashes lose their backslash, any other escape is kept verbatim.
    fn quoted(&mut self, quote: char) -> Result<String, SyntaxError> {
        let start = self.line;
        let mut text = String::new();

        loop {
            match self.next_counted() {
                None => return Err(SyntaxError::UnterminatedQuote(start)),
                Some(c) if c == quote => return Ok(text),
                Some('\\') => match self.next_counted() {
                    None => return Err(SyntaxError::UnterminatedQuote(start)),
                    Some(c) if c == quote || c == '\\' => text.push(c),
                    Some(c) => {
                        text.push('\\');
                        text.push(c);
                    }
                },
                Some(c) => text.push(c),
            }
        }
    }

    /// Reads an unquoted word starting with `first`
    fn bare(&mut self, first: char) -> String {
        let mut text = String::new();
        let mut current = Some(first);

        while let Some(c) = current {
            text.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = self.next_counted() {
                        text.push(escaped);
                    }
                }
                // `${name}` is a variable, not a block
                '$' if self.chars.peek() == Some(&'{') => {
                    while let Some(c) = self.next_counted() {
                        text.push(c);
                        if c == '}' {
                            break;
                        }
                    }
                }
                _ => {}
            }

            current = match self.chars.peek() {
                Some(&c) if c.is_whitespace() || matches!(c, ';' | '{' | '}') => None,
                Some(_) => self.chars.next(),
                None => None,
            };
        }

        text
    }
}
