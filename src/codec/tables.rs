//! Short-code lookup tables, built once on first use

use std::sync::OnceLock;

/// Prefix width probed by the exponential-Golomb decode table
pub const EG_PEEK_BITS: u32 = 16;

/// Values below this bound have their code length tabulated
const EG_LEN_VALUES: usize = 4096;

static EG_DECODE: OnceLock<Vec<u16>> = OnceLock::new();
static EG_LENGTH: OnceLock<Vec<u8>> = OnceLock::new();

/// Decode table indexed by the next 16 stream bits.
///
/// Entry layout: `code_len << 8 | value`; zero means the code is longer than
/// the probe and the caller falls back to the bit-serial decoder.
pub(crate) fn eg_decode_table() -> &'static [u16] {
    EG_DECODE.get_or_init(|| {
        (0u32..1 << EG_PEEK_BITS)
            .map(|prefix| {
                let zeros = prefix.leading_zeros() - (32 - EG_PEEK_BITS);
                let len = 2 * zeros + 1;
                if len > EG_PEEK_BITS {
                    return 0;
                }
                let w = prefix >> (EG_PEEK_BITS - len);
                ((len << 8) | (w - 1)) as u16
            })
            .collect()
    })
}

/// Code length of the plain exponential-Golomb code of `value`
pub fn exp_golomb_len(value: u64) -> u32 {
    if value < EG_LEN_VALUES as u64 {
        let table = EG_LENGTH.get_or_init(|| {
            (0..EG_LEN_VALUES as u64)
                .map(|v| computed_len(v) as u8)
                .collect()
        });
        return table[value as usize] as u32;
    }
    computed_len(value)
}

fn computed_len(value: u64) -> u32 {
    let w = value as u128 + 1;
    let k = 127 - w.leading_zeros();
    2 * k + 1
}
