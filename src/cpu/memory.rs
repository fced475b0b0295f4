use std::collections::HashMap;

use itertools::Itertools;

/// Sparse byte-addressed memory
///
/// Storage is a map from word-aligned byte addresses to 32-bit words,
/// so only locations that have been written cost anything; everything
/// else reads as zero. Word accesses force-align the address by
/// clearing its low two bits rather than faulting. Byte accesses
/// address the little-endian lanes of the containing word. The
/// address space is the full 32 bits; instructions and data share it.
#[derive(Debug, Default)]
pub struct Memory {
    words: HashMap<u32, u32>,
}

impl Memory {
    /// Read the word containing the address (zero if never written)
    pub fn read_word(&self, address: u32) -> u32 {
        self.words.get(&(address & !3)).copied().unwrap_or(0)
    }

    /// Write a word at the (force-aligned) address
    pub fn write_word(&mut self, address: u32, value: u32) {
        self.words.insert(address & !3, value);
    }

    /// Read one byte, little-endian within its word
    pub fn read_byte(&self, address: u32) -> u32 {
        let lane = address & 3;
        self.read_word(address) >> (8 * lane) & 0xff
    }

    /// Write one byte without disturbing the rest of its word
    pub fn write_byte(&mut self, address: u32, value: u32) {
        let lane = address & 3;
        let mask = 0xff << (8 * lane);
        let word = self.read_word(address) & !mask | (value & 0xff) << (8 * lane);
        self.write_word(address, word);
    }

    /// Empty the store; every address reads as zero again
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Non-zero words in ascending address order
    pub fn nonzero_words(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.words
            .iter()
            .filter(|(_, &word)| word != 0)
            .map(|(&address, &word)| (address, word))
            .sorted()
    }
}
