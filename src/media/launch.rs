//! Launch description parser
//!
//! Turns a declarative pipeline description into a [`Bin`]. The syntax is a
//! subset of the familiar launch-line format:
//!
//! ```text
//! ( videotestsrc is-live=true ! x264enc ! rtph264pay name=pay0 pt=96
//!   audiotestsrc ! opusenc ! rtpopuspay name=pay1 pt=97 )
//! ```
//!
//! - Elements are a type name followed by `key=value` properties. Values may
//!   be double-quoted to contain whitespace.
//! - `!` links the element on its left to the element on its right.
//! - An element that does not follow a `!` starts a new chain.
//! - The whole description may be wrapped in one pair of parentheses.
//! - `name=` sets the element name; unnamed elements get `<type><n>`.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

use super::pipeline::{Bin, Element};

/// Name given to the bin produced by [`parse_launch`]
pub const LAUNCH_BIN_NAME: &str = "media-bin";

/// Error returned for a malformed launch description
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("empty launch description")]
    Empty,
    #[error("unterminated quoted value for property '{0}'")]
    UnterminatedQuote(String),
    #[error("property '{0}' has no value")]
    EmptyValue(String),
    #[error("property '{0}' does not follow an element")]
    DanglingProperty(String),
    #[error("link '!' without an element on both sides")]
    DanglingLink,
    #[error("unbalanced parentheses")]
    Unbalanced,
    #[error("nested bins are not supported")]
    NestedBin,
    #[error("duplicate element name '{0}'")]
    DuplicateName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Link,
    Open,
    Close,
    Word(String),
    Property(String, String),
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '!' | '(' | ')')
}

fn read_while(chars: &mut Peekable<Chars<'_>>, stop: impl Fn(char) -> bool) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if stop(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>, key: &str) -> Result<String, LaunchError> {
    // opening quote
    chars.next();

    let mut out = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(out),
            Some('\\') => match chars.next() {
                Some(c) => out.push(c),
                None => return Err(LaunchError::UnterminatedQuote(key.to_string())),
            },
            Some(c) => out.push(c),
            None => return Err(LaunchError::UnterminatedQuote(key.to_string())),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, LaunchError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '!' => {
                chars.next();
                tokens.push(Token::Link);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            _ => {
                let word = read_while(&mut chars, |c| is_delimiter(c) || c == '=');

                if chars.peek() != Some(&'=') {
                    tokens.push(Token::Word(word));
                    continue;
                }

                chars.next();
                if word.is_empty() {
                    return Err(LaunchError::DanglingProperty(String::from("=")));
                }

                let value = if chars.peek() == Some(&'"') {
                    read_quoted(&mut chars, &word)?
                } else {
                    let value = read_while(&mut chars, is_delimiter);
                    if value.is_empty() {
                        return Err(LaunchError::EmptyValue(word));
                    }
                    value
                };

                tokens.push(Token::Property(word, value));
            }
        }
    }

    Ok(tokens)
}

struct Builder {
    bin: Bin,
    counters: HashMap<String, usize>,
}

impl Builder {
    fn add(&mut self, kind: String, properties: Vec<(String, String)>) -> Result<String, LaunchError> {
        let explicit = properties
            .iter()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.clone());

        let name = match explicit {
            Some(name) => name,
            None => loop {
                let counter = self.counters.entry(kind.clone()).or_insert(0);
                let candidate = format!("{}{}", kind, counter);
                *counter += 1;
                if self.bin.by_name(&candidate).is_none() {
                    break candidate;
                }
            },
        };

        if self.bin.by_name(&name).is_some() {
            return Err(LaunchError::DuplicateName(name));
        }

        let mut element = Element::new(kind, name.clone());
        for (key, value) in properties {
            if key != "name" {
                element.set_property(key, value);
            }
        }
        self.bin.add(element);

        Ok(name)
    }
}

/// Parse a launch description into a bin
pub fn parse_launch(description: &str) -> Result<Bin, LaunchError> {
    let mut tokens = tokenize(description)?;

    if tokens.first() == Some(&Token::Open) {
        if tokens.last() != Some(&Token::Close) {
            return Err(LaunchError::Unbalanced);
        }
        tokens.remove(0);
        tokens.pop();
    }

    if tokens.is_empty() {
        return Err(LaunchError::Empty);
    }

    let mut builder = Builder {
        bin: Bin::new(LAUNCH_BIN_NAME),
        counters: HashMap::new(),
    };

    let mut tokens = tokens.into_iter().peekable();
    let mut previous: Option<String> = None;
    let mut pending_link = false;

    while let Some(token) = tokens.next() {
        match token {
            Token::Word(kind) => {
                let mut properties = Vec::new();
                while let Some(Token::Property(_, _)) = tokens.peek() {
                    if let Some(Token::Property(k, v)) = tokens.next() {
                        properties.push((k, v));
                    }
                }

                let name = builder.add(kind, properties)?;
                if pending_link {
                    if let Some(src) = previous.take() {
                        builder.bin.link(src, name.clone());
                    }
                    pending_link = false;
                }
                previous = Some(name);
            }
            Token::Link => {
                if previous.is_none() || pending_link {
                    return Err(LaunchError::DanglingLink);
                }
                pending_link = true;
            }
            Token::Property(key, _) => return Err(LaunchError::DanglingProperty(key)),
            Token::Open => return Err(LaunchError::NestedBin),
            Token::Close => return Err(LaunchError::Unbalanced),
        }
    }

    if pending_link {
        return Err(LaunchError::DanglingLink);
    }

    Ok(builder.bin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_chain() {
        let bin = parse_launch("( videotestsrc ! x264enc ! rtph264pay name=pay0 pt=96 )").unwrap();

        assert_eq!(bin.len(), 3);
        assert!(bin.by_name("videotestsrc0").is_some());
        assert!(bin.by_name("x264enc0").is_some());

        let pay = bin.by_name("pay0").unwrap();
        assert_eq!(pay.kind(), "rtph264pay");
        assert_eq!(pay.property("pt"), Some("96"));
        assert_eq!(pay.property("name"), None);

        assert_eq!(bin.links().len(), 2);
        assert_eq!(bin.links()[1].src, "x264enc0");
        assert_eq!(bin.links()[1].sink, "pay0");
    }

    #[test]
    fn test_parse_multiple_chains() {
        let bin = parse_launch(
            "videotestsrc ! rtpvrawpay name=pay0 audiotestsrc ! rtpL16pay name=pay1",
        )
        .unwrap();

        assert_eq!(bin.len(), 4);
        assert_eq!(bin.links().len(), 2);
        assert!(bin.links().iter().all(|l| l.src != "pay0"));
    }

    #[test]
    fn test_auto_names_count_per_type() {
        let bin = parse_launch("queue ! queue ! fakesink").unwrap();

        assert!(bin.by_name("queue0").is_some());
        assert!(bin.by_name("queue1").is_some());
        assert!(bin.by_name("fakesink0").is_some());
    }

    #[test]
    fn test_quoted_value() {
        let bin = parse_launch(r#"textoverlay text="hello \"world\"" ! fakesink"#).unwrap();

        let overlay = bin.by_name("textoverlay0").unwrap();
        assert_eq!(overlay.property("text"), Some("hello \"world\""));
    }

    #[test]
    fn test_malformed_descriptions() {
        assert_eq!(parse_launch(""), Err(LaunchError::Empty));
        assert_eq!(parse_launch("( )"), Err(LaunchError::Empty));
        assert_eq!(parse_launch("( fakesrc"), Err(LaunchError::Unbalanced));
        assert_eq!(parse_launch("fakesrc ) "), Err(LaunchError::Unbalanced));
        assert_eq!(parse_launch("fakesrc !"), Err(LaunchError::DanglingLink));
        assert_eq!(parse_launch("! fakesink"), Err(LaunchError::DanglingLink));
        assert_eq!(parse_launch("fakesrc ! ! fakesink"), Err(LaunchError::DanglingLink));
        assert_eq!(parse_launch("( a ( b ) )"), Err(LaunchError::NestedBin));
        assert_eq!(
            parse_launch("pt=96 fakesrc"),
            Err(LaunchError::DanglingProperty("pt".into()))
        );
        assert_eq!(
            parse_launch("fakesrc num-buffers= ! fakesink"),
            Err(LaunchError::EmptyValue("num-buffers".into()))
        );
        assert_eq!(
            parse_launch(r#"textoverlay text="oops"#),
            Err(LaunchError::UnterminatedQuote("text".into()))
        );
        assert_eq!(
            parse_launch("fakesrc name=a ! fakesink name=a"),
            Err(LaunchError::DuplicateName("a".into()))
        );
    }
}
