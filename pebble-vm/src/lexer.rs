//! Tokenizer for method source text (grounded on
//! `original_source/src/lex.c`).
//!
//! A faithful, line-by-line port of `nextToken`'s character-class
//! dispatch and one-character (occasionally two-deep) pushback scheme,
//! rebuilt over a `Vec<char>` cursor instead of a raw `char *` and a
//! fixed pushback array.

/// One lexical token, carrying whatever payload `original_source`'s
/// `TokenVal` fields held for that `TokenType`.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A lowercase identifier, e.g. a variable name.
    NameConst(String),
    /// An identifier immediately followed by `:`, e.g. a keyword part.
    NameColon(String),
    /// An integer literal.
    IntConst(i32),
    /// A floating point literal.
    FloatConst(f64),
    /// A `$c` character literal.
    CharConst(char),
    /// A `#symbol` literal.
    SymConst(String),
    /// The `#(` array-literal opener.
    ArrayBegin,
    /// A `'...'` string literal, with doubled `''` already unescaped.
    StrConst(String),
    /// A binary selector, one or two characters.
    Binary(String),
    /// One of the expression-closing characters: `. ] ) ; " '`.
    Closing(char),
    /// End of input.
    InputEnd,
}

fn is_closing(c: char) -> bool {
    matches!(c, '.' | ']' | ')' | ';' | '"' | '\'')
}

fn is_symbol_char(c: char) -> bool {
    if c.is_ascii_digit() || c.is_ascii_alphabetic() {
        return true;
    }
    !(c.is_whitespace() || is_closing(c))
}

fn is_single_binary(c: char) -> bool {
    matches!(c, '[' | '(' | ')' | ']')
}

fn is_binary_second(c: char) -> bool {
    !(c.is_ascii_alphabetic() || c.is_ascii_digit() || c.is_whitespace() || is_closing(c) || is_single_binary(c))
}

/// A pull-based tokenizer over one chunk of source text.
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    pushback: Vec<char>,
    cc: char,
}

const EOF: char = '\0';

impl Lexer {
    /// Start lexing `text`.
    pub fn new(text: &str) -> Self {
        Lexer {
            input: text.chars().collect(),
            pos: 0,
            pushback: Vec::new(),
            cc: EOF,
        }
    }

    fn next_char(&mut self) -> char {
        self.cc = if let Some(c) = self.pushback.pop() {
            c
        } else if self.pos < self.input.len() {
            let c = self.input[self.pos];
            self.pos += 1;
            c
        } else {
            EOF
        };
        self.cc
    }

    fn push_back(&mut self, c: char) {
        self.pushback.push(c);
    }

    /// Look at the next character without consuming it.
    pub fn peek(&mut self) -> char {
        let c = self.next_char();
        self.push_back(c);
        c
    }

    fn lex_number(&mut self) -> Token {
        let mut text = String::new();
        text.push(self.cc);
        let mut long_result: i64 = self.cc as i64 - '0' as i64;
        while self.next_char() != EOF && self.cc.is_ascii_digit() {
            text.push(self.cc);
            long_result = long_result * 10 + (self.cc as i64 - '0' as i64);
        }
        let fits_int = long_result <= i32::MAX as i64;
        let mut token = if fits_int {
            Token::IntConst(long_result as i32)
        } else {
            Token::FloatConst(long_result as f64)
        };

        if self.cc == '.' {
            if self.next_char() != EOF && self.cc.is_ascii_digit() {
                text.push('.');
                loop {
                    text.push(self.cc);
                    if self.next_char() == EOF || !self.cc.is_ascii_digit() {
                        break;
                    }
                }
                if self.cc != EOF {
                    self.push_back(self.cc);
                }
                token = Token::FloatConst(text.parse().unwrap_or(0.0));
            } else {
                if self.cc != EOF {
                    self.push_back(self.cc);
                }
                self.push_back('.');
            }
        } else {
            self.push_back(self.cc);
        }

        if self.next_char() != EOF && self.cc == 'e' {
            let sign = if self.next_char() != EOF && self.cc == '-' {
                self.next_char();
                true
            } else {
                false
            };
            if self.cc != EOF && self.cc.is_ascii_digit() {
                text.push('e');
                if sign {
                    text.push('-');
                }
                while self.cc != EOF && self.cc.is_ascii_digit() {
                    text.push(self.cc);
                    self.next_char();
                }
                if self.cc != EOF {
                    self.push_back(self.cc);
                }
                token = Token::FloatConst(text.parse().unwrap_or(0.0));
            } else {
                if self.cc != EOF {
                    self.push_back(self.cc);
                }
                if sign {
                    self.push_back('-');
                }
                self.push_back('e');
            }
        } else if self.cc != EOF {
            self.push_back(self.cc);
        }

        token
    }

    fn lex_string(&mut self) -> String {
        let mut s = String::new();
        loop {
            loop {
                let c = self.next_char();
                if c == EOF || c == '\'' {
                    break;
                }
                s.push(c);
            }
            if self.cc != EOF {
                let c2 = self.next_char();
                if c2 == '\'' {
                    s.push('\'');
                    continue;
                }
            }
            self.push_back(self.cc);
            break;
        }
        s
    }

    /// Read the next token, skipping whitespace and `"double-quoted"`
    /// comments first.
    pub fn next_token(&mut self) -> Token {
        loop {
            let c = self.next_char();
            if c == EOF || !(c.is_whitespace() || c == '"') {
                break;
            }
            if c == '"' {
                while self.next_char() != EOF && self.cc != '"' {}
                if self.cc == EOF {
                    break;
                }
            }
        }

        if self.cc == EOF {
            return Token::InputEnd;
        }

        if self.cc.is_ascii_alphabetic() {
            let mut text = String::new();
            text.push(self.cc);
            while self.next_char() != EOF && self.cc.is_ascii_alphanumeric() {
                text.push(self.cc);
            }
            return if self.cc == ':' {
                text.push(':');
                Token::NameColon(text)
            } else {
                self.push_back(self.cc);
                Token::NameConst(text)
            };
        }

        if self.cc.is_ascii_digit() {
            return self.lex_number();
        }

        if self.cc == '$' {
            let c = self.next_char();
            return Token::CharConst(c);
        }

        if self.cc == '#' {
            if self.next_char() == '(' {
                return Token::ArrayBegin;
            }
            self.push_back(self.cc);
            let mut text = String::new();
            while self.next_char() != EOF && is_symbol_char(self.cc) {
                text.push(self.cc);
            }
            self.push_back(self.cc);
            return Token::SymConst(text);
        }

        if self.cc == '\'' {
            return Token::StrConst(self.lex_string());
        }

        if is_closing(self.cc) {
            return Token::Closing(self.cc);
        }

        if is_single_binary(self.cc) {
            return Token::Binary(self.cc.to_string());
        }

        let mut text = String::new();
        text.push(self.cc);
        let first = self.cc;
        if self.next_char() != EOF && is_binary_second(self.cc) {
            text.push(self.cc);
        } else {
            self.push_back(self.cc);
        }
        let _ = first;
        Token::Binary(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lex = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lex.next_token();
            if t == Token::InputEnd {
                break;
            }
            out.push(t);
        }
        out
    }

    #[test]
    fn identifiers_and_keywords() {
        assert_eq!(
            tokens("foo at: 3"),
            vec![
                Token::NameConst("foo".into()),
                Token::NameColon("at:".into()),
                Token::IntConst(3),
            ]
        );
    }

    #[test]
    fn integers_and_a_trailing_period() {
        assert_eq!(
            tokens("3."),
            vec![Token::IntConst(3), Token::Closing('.')]
        );
    }

    #[test]
    fn floats_with_fraction_and_exponent() {
        assert_eq!(tokens("3.5"), vec![Token::FloatConst(3.5)]);
        assert_eq!(tokens("2e3"), vec![Token::FloatConst(2000.0)]);
    }

    #[test]
    fn char_and_symbol_and_array_literals() {
        assert_eq!(tokens("$a"), vec![Token::CharConst('a')]);
        assert_eq!(tokens("#foo:bar:"), vec![Token::SymConst("foo:bar:".into())]);
        assert_eq!(tokens("#("), vec![Token::ArrayBegin]);
    }

    #[test]
    fn string_literal_with_doubled_quote_escape() {
        assert_eq!(
            tokens("'it''s'"),
            vec![Token::StrConst("it's".into())]
        );
    }

    #[test]
    fn binary_selectors_one_and_two_chars() {
        assert_eq!(tokens("+"), vec![Token::Binary("+".into())]);
        assert_eq!(tokens("<="), vec![Token::Binary("<=".into())]);
        assert_eq!(tokens("~="), vec![Token::Binary("~=".into())]);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(tokens("\"a comment\" 1"), vec![Token::IntConst(1)]);
    }
}
