#![allow(dead_code)]

pub mod command;
pub mod file;

/// Hexdump of index bytes, so mismatches show up as readable line diffs
pub fn to_hexdump(data: &[u8]) -> String {
    let mut result = String::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        result.push_str(&format!("{:08x}: ", i * 16));

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                result.push(' ');
            }
            result.push_str(&format!("{byte:02x} "));
        }
        for j in chunk.len()..16 {
            if j == 8 {
                result.push(' ');
            }
            result.push_str("   ");
        }

        result.push_str(" |");
        for byte in chunk {
            if byte.is_ascii_graphic() {
                result.push(*byte as char);
            } else {
                result.push('.');
            }
        }
        result.push_str("|\n");
    }
    result
}

#[macro_export]
macro_rules! assert_index_eq {
    ($bitcore_content:expr, $git_content:expr) => {
        if $bitcore_content != $git_content {
            pretty_assertions::assert_eq!(
                common::to_hexdump($bitcore_content),
                common::to_hexdump($git_content),
                "\n=== INDEX CONTENTS DIFFER ===\nbitcore index ({} bytes) vs git index ({} bytes)",
                $bitcore_content.len(),
                $git_content.len()
            );
        }
    };
}
