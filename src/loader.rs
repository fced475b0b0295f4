//! Hex program-image loading
//!
//! An image is UTF-8 text with one 32-bit instruction per line in
//! base 16 (no 0x prefix). Empty lines and lines starting with '#'
//! are comments. Malformed lines are reported and skipped and
//! over-width values are masked, so a damaged image still loads as
//! far as possible; only failing to read the file at all is an error.

use std::fs::File;
use std::io::{BufRead, BufReader};

use log::{debug, warn};
use thiserror::Error;

use crate::cpu::memory::Memory;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read program image: {0}")]
    Io(#[from] std::io::Error),
}

/// Load a hex image into memory at consecutive words from
/// start_address, returning the number of instructions loaded
pub fn load_hex_file(
    path: &str,
    memory: &mut Memory,
    start_address: u32,
) -> Result<u32, LoadError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut count = 0;
    let mut address = start_address;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let word = match u128::from_str_radix(line, 16) {
            Ok(value) => {
                if value > 0xffff_ffff {
                    warn!("line {}: value 0x{value:X} wider than 32 bits, masking", n + 1);
                }
                value as u32
            }
            Err(_) => {
                warn!("line {}: invalid hex '{line}', skipping", n + 1);
                continue;
            }
        };
        memory.write_word(address, word);
        address = address.wrapping_add(4);
        count += 1;
    }

    debug!("loaded {count} instructions from {path}");
    Ok(count)
}
