//! Word-wise byte-order reversal.
//!
//! The container stores multi-byte fields in a canonical byte order; a caller
//! working in host order uses the flipped append path, which runs these
//! helpers over a private copy of each row before it is written.

/// Reverses the byte order of a single word in place.
pub fn swap_word(word: &mut [u8]) {
    word.reverse();
}

/// Reverses the byte order of every `word_size`-wide word in `buf` in place.
///
/// # Panics
///
/// Panics if `word_size` is zero or `buf.len()` is not a multiple of
/// `word_size`.
pub fn swap_words(buf: &mut [u8], word_size: usize) {
    assert!(word_size > 0, "word size must be non-zero");
    assert_eq!(
        buf.len() % word_size,
        0,
        "buffer length {} is not a multiple of word size {}",
        buf.len(),
        word_size
    );
    for word in buf.chunks_exact_mut(word_size) {
        word.reverse();
    }
}
