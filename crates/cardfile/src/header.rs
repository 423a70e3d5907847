//! Header model: an ordered list of cards plus block-granular encode/decode.

use std::io::{Read, Write};

use crate::card::{Card, Value, CARD_SIZE};
use crate::{bytes_to_blocks, FormatError, BLOCK_SIZE};

/// A header: the ordered cards of one section, without the terminating `END`
/// card (added on encode) or padding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    /// An empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default primary header for a fresh container.
    pub fn primary_default() -> Self {
        let mut h = Self::new();
        h.push(Card::logical("SIMPLE", true).with_comment("conforms to the container format"));
        h.push(Card::integer("BITPIX", 8));
        h.push(Card::integer("NAXIS", 0));
        h.push(Card::logical("EXTEND", true));
        h
    }

    /// A binary-table header for `row_count` rows of `item_size` bytes,
    /// stored as a single byte-array column named after the table.
    pub fn bintable(name: &str, item_size: usize, row_count: usize) -> Self {
        let mut h = Self::new();
        h.push(Card::text("XTENSION", "BINTABLE").with_comment("binary table extension"));
        h.push(Card::integer("BITPIX", 8));
        h.push(Card::integer("NAXIS", 2));
        h.push(Card::integer("NAXIS1", item_size as i64).with_comment("bytes per row"));
        h.push(Card::integer("NAXIS2", row_count as i64).with_comment("number of rows"));
        h.push(Card::integer("PCOUNT", 0));
        h.push(Card::integer("GCOUNT", 1));
        h.push(Card::integer("TFIELDS", 1));
        h.push(Card::text("TTYPE1", name));
        h.push(Card::text("TFORM1", &format!("{item_size}A")));
        h
    }

    /// Appends a card.
    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Returns the first card with the given keyword.
    pub fn card(&self, keyword: &str) -> Option<&Card> {
        self.cards
            .iter()
            .find(|c| c.keyword().eq_ignore_ascii_case(keyword))
    }

    /// Returns the integer value of `keyword`, if present and integer-typed.
    pub fn integer(&self, keyword: &str) -> Option<i64> {
        match self.card(keyword)?.value()? {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the logical value of `keyword`, if present and logical-typed.
    pub fn logical(&self, keyword: &str) -> Option<bool> {
        match self.card(keyword)?.value()? {
            Value::Logical(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text value of `keyword`, if present and text-typed.
    pub fn text(&self, keyword: &str) -> Option<&str> {
        match self.card(keyword)?.value()? {
            Value::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Sets `keyword` to an integer value, replacing the existing card's
    /// value in place (keeping its comment) or appending a new card.
    pub fn set_integer(&mut self, keyword: &str, value: i64) {
        match self
            .cards
            .iter_mut()
            .find(|c| c.keyword().eq_ignore_ascii_case(keyword))
        {
            Some(card) => card.set_value(Value::Integer(value)),
            None => self.push(Card::integer(keyword, value)),
        }
    }

    /// Number of cards, excluding the implicit `END`.
    pub fn n_cards(&self) -> usize {
        self.cards.len()
    }

    /// Iterates over the cards in order.
    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter()
    }

    /// The encoded size in bytes: cards plus `END`, rounded up to whole
    /// blocks.
    pub fn byte_len(&self) -> usize {
        let content = (self.cards.len() + 1) * CARD_SIZE;
        (bytes_to_blocks(content as u64) as usize) * BLOCK_SIZE
    }

    /// The size of the data section this header describes, in bytes
    /// (before block padding).
    ///
    /// Computed from `NAXIS`/`NAXISn`/`BITPIX` plus `PCOUNT`; a header with
    /// `NAXIS = 0` (the primary header) has no data.
    pub fn data_len(&self) -> Result<u64, FormatError> {
        let naxis = self
            .integer("NAXIS")
            .ok_or_else(|| FormatError::MissingKeyword("NAXIS".to_owned()))?;
        if naxis == 0 {
            return Ok(0);
        }
        let bitpix = self
            .integer("BITPIX")
            .ok_or_else(|| FormatError::MissingKeyword("BITPIX".to_owned()))?;
        let mut elements: u64 = 1;
        for i in 1..=naxis {
            let keyword = format!("NAXIS{i}");
            let axis = self
                .integer(&keyword)
                .ok_or(FormatError::MissingKeyword(keyword))?;
            if axis < 0 {
                return Err(FormatError::BadCard(format!("negative axis NAXIS{i}")));
            }
            elements *= axis as u64;
        }
        let bytes_per_element = (bitpix.unsigned_abs() / 8).max(1);
        let pcount = self.integer("PCOUNT").unwrap_or(0).max(0) as u64;
        Ok(elements * bytes_per_element + pcount)
    }

    /// Encodes the header (cards, `END`, space padding to a block boundary)
    /// to `w`, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<usize, FormatError> {
        let mut written = 0;
        for card in &self.cards {
            w.write_all(&card.encode()?)?;
            written += CARD_SIZE;
        }
        w.write_all(&Card::end().encode()?)?;
        written += CARD_SIZE;
        let blank = [b' '; CARD_SIZE];
        while written % BLOCK_SIZE != 0 {
            w.write_all(&blank)?;
            written += CARD_SIZE;
        }
        Ok(written)
    }

    /// Reads a header from `r`, consuming whole blocks until the `END` card.
    ///
    /// Returns the header and the number of bytes consumed. Fails with
    /// [`FormatError::Truncated`] on a partial block, or
    /// [`FormatError::MissingEnd`] if the stream ends cleanly between blocks
    /// before `END` was seen.
    pub fn read_from<R: Read>(r: &mut R) -> Result<(Self, usize), FormatError> {
        Self::read_from_opt(r)?.ok_or(FormatError::MissingEnd)
    }

    /// Like [`Header::read_from`], but returns `Ok(None)` when the stream is
    /// already at a clean end-of-file (no header starts here at all). Used
    /// by the section scanner to detect the end of the container.
    pub fn read_from_opt<R: Read>(r: &mut R) -> Result<Option<(Self, usize)>, FormatError> {
        let Some(block) = read_block_opt(r)? else {
            return Ok(None);
        };
        let mut cards = Vec::new();
        let mut consumed = BLOCK_SIZE;
        let mut done = collect_cards(&block, &mut cards)?;
        while !done {
            let block = read_block_opt(r)?.ok_or(FormatError::MissingEnd)?;
            consumed += BLOCK_SIZE;
            done = collect_cards(&block, &mut cards)?;
        }
        Ok(Some((Self { cards }, consumed)))
    }
}

/// Parses one block's cards into `out`; returns `true` once `END` is seen.
fn collect_cards(block: &[u8; BLOCK_SIZE], out: &mut Vec<Card>) -> Result<bool, FormatError> {
    for raw in block.chunks_exact(CARD_SIZE) {
        match Card::parse(raw)? {
            Some(card) if card.keyword() == "END" => return Ok(true),
            Some(card) => out.push(card),
            None => {}
        }
    }
    Ok(false)
}

/// Reads one full block, `Ok(None)` on clean EOF at a block boundary,
/// [`FormatError::Truncated`] on a partial block.
fn read_block_opt<R: Read>(r: &mut R) -> Result<Option<[u8; BLOCK_SIZE]>, FormatError> {
    let mut block = [0u8; BLOCK_SIZE];
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        let n = r.read(&mut block[filled..])?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(FormatError::Truncated)
            };
        }
        filled += n;
    }
    Ok(Some(block))
}
