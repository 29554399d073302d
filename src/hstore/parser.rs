//! hstore text format
//!
//! Output side writes what PostgreSQL itself prints: `"k"=>"v"` pairs joined
//! by `", "`, with `"` and `\` backslash-escaped. The input side accepts the
//! full input syntax: optional quoting, backslash escapes in either form,
//! arbitrary whitespace, and the unquoted value `NULL`.

use crate::core::errors::{DbError, DbResult};
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::CharIndices;
use tracing::debug;

/// Parse hstore text into its pairs; a `NULL` value yields `None`
pub fn parse_hstore(text: &str) -> DbResult<Vec<(String, Option<String>)>> {
    HstoreParser::new(text).parse()
}

/// Parse hstore text into a map, dropping NULL-valued pairs and repeated keys
pub fn parse_hstore_map(text: &str) -> DbResult<BTreeMap<String, String>> {
    let mut pairs: BTreeMap<String, Option<String>> = BTreeMap::new();
    for (key, value) in parse_hstore(text)? {
        if pairs.contains_key(&key) {
            debug!("duplicate hstore key '{}' ignored", key);
            continue;
        }
        pairs.insert(key, value);
    }
    Ok(pairs
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect())
}

/// Render pairs in hstore text form
pub fn write_hstore<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| match value {
            Some(value) => format!("{}=>{}", quote(key), quote(value)),
            None => format!("{}=>NULL", quote(key)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// A token reader over hstore text that tracks its position
struct HstoreParser<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

/// A key or value as read, remembering whether it was quoted
struct Token {
    text: String,
    quoted: bool,
}

impl<'a> HstoreParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
        }
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.text.len())
    }

    fn error(&mut self, message: &str) -> DbError {
        let position = self.position();
        DbError::decode(format!("malformed hstore at offset {}: {}", position, message))
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn parse(mut self) -> DbResult<Vec<(String, Option<String>)>> {
        let mut pairs = Vec::new();

        loop {
            self.skip_whitespace();
            if self.chars.peek().is_none() {
                break;
            }

            let key = self.read_token()?;
            self.expect_arrow()?;
            let value = self.read_token()?;

            let value = if !value.quoted && value.text.eq_ignore_ascii_case("NULL") {
                None
            } else {
                Some(value.text)
            };
            pairs.push((key.text, value));

            self.skip_whitespace();
            match self.chars.next() {
                None => break,
                Some((_, ',')) => {
                    self.skip_whitespace();
                    if self.chars.peek().is_none() {
                        return Err(self.error("trailing comma"));
                    }
                }
                Some(_) => return Err(self.error("expected ',' between pairs")),
            }
        }

        Ok(pairs)
    }

    fn expect_arrow(&mut self) -> DbResult<()> {
        self.skip_whitespace();
        match (self.chars.next(), self.chars.next()) {
            (Some((_, '=')), Some((_, '>'))) => Ok(()),
            _ => Err(self.error("expected '=>'")),
        }
    }

    fn read_token(&mut self) -> DbResult<Token> {
        self.skip_whitespace();
        match self.chars.peek() {
            None => Err(self.error("unexpected end of input")),
            Some((_, '"')) => {
                self.chars.next();
                self.read_quoted()
            }
            Some(_) => self.read_unquoted(),
        }
    }

    fn read_quoted(&mut self) -> DbResult<Token> {
        let mut text = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.error("unterminated quoted string")),
                Some((_, '"')) => break,
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, escaped)) => text.push(escaped),
                    None => return Err(self.error("dangling escape")),
                },
                Some((_, c)) => text.push(c),
            }
        }
        Ok(Token { text, quoted: true })
    }

    fn read_unquoted(&mut self) -> DbResult<Token> {
        let mut text = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() || c == ',' || c == '=' || c == '"' {
                break;
            }
            self.chars.next();
            if c == '\\' {
                match self.chars.next() {
                    Some((_, escaped)) => text.push(escaped),
                    None => return Err(self.error("dangling escape")),
                }
            } else {
                text.push(c);
            }
        }

        if text.is_empty() {
            return Err(self.error("expected a key or value"));
        }
        Ok(Token {
            text,
            quoted: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_output() {
        let pairs = parse_hstore(r#""en"=>"hello", "es"=>"hola", "gone"=>NULL"#).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("en".to_string(), Some("hello".to_string())),
                ("es".to_string(), Some("hola".to_string())),
                ("gone".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_parse_input_syntax_variants() {
        let pairs = parse_hstore("a=>1,  b =>  \"two words\" ,c=>null").unwrap();
        assert_eq!(pairs[0], ("a".to_string(), Some("1".to_string())));
        assert_eq!(pairs[1], ("b".to_string(), Some("two words".to_string())));
        assert_eq!(pairs[2], ("c".to_string(), None));

        // A quoted "NULL" is a real string
        let pairs = parse_hstore(r#""k"=>"NULL""#).unwrap();
        assert_eq!(pairs[0].1.as_deref(), Some("NULL"));
    }

    #[test]
    fn test_parse_escapes() {
        let pairs = parse_hstore(r#""say \"hi\""=>"back\\slash""#).unwrap();
        assert_eq!(pairs[0].0, "say \"hi\"");
        assert_eq!(pairs[0].1.as_deref(), Some("back\\slash"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_hstore("").unwrap().is_empty());
        assert!(parse_hstore("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_hstore(r#""a"=>"#).is_err());
        assert!(parse_hstore(r#""a"->"b""#).is_err());
        assert!(parse_hstore(r#""a"=>"b"#).is_err());
        assert!(parse_hstore(r#""a"=>"b","#).is_err());
        assert!(parse_hstore(r#""a"=>"b" "c"=>"d""#).is_err());
    }

    #[test]
    fn test_map_drops_nulls_and_keeps_first_duplicate() {
        let map = parse_hstore_map(r#""a"=>"1", "b"=>NULL, "a"=>"2", "b"=>"3""#).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_write_hstore() {
        let text = write_hstore(vec![("a", Some("1")), ("q\"", Some("x\\y")), ("n", None)]);
        assert_eq!(text, r#""a"=>"1", "q\""=>"x\\y", "n"=>NULL"#);
        assert_eq!(write_hstore(Vec::<(&str, Option<&str>)>::new()), "");
    }
}
