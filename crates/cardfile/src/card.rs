//! Fixed-width header cards.
//!
//! A card is one 80-byte line of a header:
//!
//! ```text
//! KEYWORD = value / comment
//! ```
//!
//! The keyword occupies bytes 0..8 (left-justified, upper-case). Value cards
//! carry `"= "` at bytes 8..10 followed by the value field: logicals and
//! integers are right-justified in a 20-byte field, text values are quoted
//! and left-justified. Because the value field is fixed-width, patching a
//! value never changes the card's length.

use crate::FormatError;

/// Size of one header card in bytes.
pub const CARD_SIZE: usize = 80;

/// Width of the right-justified field used for logical and integer values.
const VALUE_FIELD: usize = 20;

/// A typed card value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `T` or `F`.
    Logical(bool),
    /// Right-justified decimal integer.
    Integer(i64),
    /// Quoted text, trailing padding stripped on parse.
    Text(String),
}

/// One 80-byte header card: keyword, optional value, optional comment.
///
/// A card without a value is a commentary card (`COMMENT`, `HISTORY`, or the
/// terminating `END`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    keyword: String,
    value: Option<Value>,
    comment: Option<String>,
}

impl Card {
    fn new(keyword: &str, value: Option<Value>) -> Self {
        Self {
            keyword: keyword.to_ascii_uppercase(),
            value,
            comment: None,
        }
    }

    /// A logical-valued card (`T`/`F`).
    pub fn logical(keyword: &str, value: bool) -> Self {
        Self::new(keyword, Some(Value::Logical(value)))
    }

    /// An integer-valued card.
    pub fn integer(keyword: &str, value: i64) -> Self {
        Self::new(keyword, Some(Value::Integer(value)))
    }

    /// A text-valued card.
    pub fn text(keyword: &str, value: &str) -> Self {
        Self::new(keyword, Some(Value::Text(value.to_owned())))
    }

    /// A commentary card (no value).
    pub fn commentary(keyword: &str, comment: &str) -> Self {
        Self {
            keyword: keyword.to_ascii_uppercase(),
            value: None,
            comment: Some(comment.to_owned()),
        }
    }

    /// The `END` card terminating a header.
    pub fn end() -> Self {
        Self::new("END", None)
    }

    /// Attaches a comment to a value card.
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_owned());
        self
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Replaces the card's value, keeping keyword and comment.
    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = Some(value);
    }

    /// Encodes the card into its fixed 80-byte representation.
    ///
    /// Fails with [`FormatError::BadCard`] if the keyword is longer than 8
    /// bytes, the content is not ASCII, or the rendered card exceeds 80
    /// bytes (e.g. an over-long text value).
    pub fn encode(&self) -> Result<[u8; CARD_SIZE], FormatError> {
        if self.keyword.len() > 8 {
            return Err(FormatError::BadCard(format!(
                "keyword {:?} longer than 8 bytes",
                self.keyword
            )));
        }
        let mut line = format!("{:<8}", self.keyword);
        match &self.value {
            Some(value) => {
                line.push_str("= ");
                match value {
                    Value::Logical(v) => {
                        let field = if *v { "T" } else { "F" };
                        line.push_str(&format!("{field:>VALUE_FIELD$}"));
                    }
                    Value::Integer(v) => line.push_str(&format!("{v:>VALUE_FIELD$}")),
                    Value::Text(v) => {
                        if v.contains('\'') {
                            return Err(FormatError::BadCard(format!(
                                "text value {v:?} contains a quote"
                            )));
                        }
                        line.push_str(&format!("'{v:<8}'"));
                    }
                }
                if let Some(comment) = &self.comment {
                    line.push_str(" / ");
                    line.push_str(comment);
                }
            }
            None => {
                if let Some(comment) = &self.comment {
                    line.push_str(comment);
                }
            }
        }
        if !line.is_ascii() {
            return Err(FormatError::BadCard(format!(
                "card for {:?} contains non-ASCII bytes",
                self.keyword
            )));
        }
        if line.len() > CARD_SIZE {
            return Err(FormatError::BadCard(format!(
                "card for {:?} is {} bytes, limit {}",
                self.keyword,
                line.len(),
                CARD_SIZE
            )));
        }
        let mut raw = [b' '; CARD_SIZE];
        raw[..line.len()].copy_from_slice(line.as_bytes());
        Ok(raw)
    }

    /// Parses one 80-byte card.
    ///
    /// Returns `Ok(None)` for an all-blank padding card. `raw` must be at
    /// least [`CARD_SIZE`] bytes; only the first 80 are examined.
    pub fn parse(raw: &[u8]) -> Result<Option<Card>, FormatError> {
        let raw = raw
            .get(..CARD_SIZE)
            .ok_or_else(|| FormatError::BadCard(format!("card shorter than {CARD_SIZE} bytes")))?;
        if !raw.is_ascii() {
            return Err(FormatError::BadCard("card contains non-ASCII bytes".to_owned()));
        }
        let line = std::str::from_utf8(raw)
            .map_err(|_| FormatError::BadCard("card contains non-ASCII bytes".to_owned()))?;
        let keyword = line[..8].trim_end();
        if keyword.is_empty() {
            return Ok(None);
        }
        if &line[8..10] != "= " {
            // commentary card: everything after the keyword is free text
            let comment = line[8..].trim();
            return Ok(Some(Card {
                keyword: keyword.to_owned(),
                value: None,
                comment: (!comment.is_empty()).then(|| comment.to_owned()),
            }));
        }

        let body = &line[10..];
        let (value, rest) = if let Some(after_quote) = body.trim_start().strip_prefix('\'') {
            let close = after_quote.find('\'').ok_or_else(|| {
                FormatError::BadCard(format!("unterminated text value in card {keyword:?}"))
            })?;
            let text = after_quote[..close].trim_end().to_owned();
            (Value::Text(text), &after_quote[close + 1..])
        } else {
            let (field, rest) = match body.find(" /") {
                Some(i) => (&body[..i], &body[i..]),
                None => (body, ""),
            };
            let token = field.trim();
            let value = match token {
                "T" => Value::Logical(true),
                "F" => Value::Logical(false),
                _ => Value::Integer(token.parse::<i64>().map_err(|_| {
                    FormatError::BadCard(format!("card {keyword:?} has bad value {token:?}"))
                })?),
            };
            (value, rest)
        };

        let comment = rest
            .trim_start()
            .strip_prefix('/')
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());

        Ok(Some(Card {
            keyword: keyword.to_owned(),
            value: Some(value),
            comment,
        }))
    }
}
