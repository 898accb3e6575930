//! BCH code over GF(2^6) used by ID markers.
//!
//! The length-63 primitive BCH code with designed distance 9 (roots
//! `α^1..α^8`) has a degree-24 generator. Shortened to 36 bits it carries a
//! 12-bit message and corrects up to four bit errors.

/// `x^6 + x + 1`
const PRIMITIVE: u16 = 0b100_0011;
const FIELD: usize = 64;
const ORDER: usize = FIELD - 1;

/// Codeword length of the shortened code.
pub const CODE_BITS: usize = 36;
/// Message length.
pub const DATA_BITS: usize = 12;
/// Guaranteed correctable errors.
pub const CORRECTABLE: u32 = 4;

/// Exponent/log tables of GF(64).
#[derive(Clone, Debug)]
struct Gf64 {
    exp: [u8; 2 * ORDER],
    log: [u8; FIELD],
}

impl Gf64 {
    fn new() -> Self {
        let mut exp = [0u8; 2 * ORDER];
        let mut log = [0u8; FIELD];
        let mut x: u16 = 1;
        for i in 0..ORDER {
            exp[i] = x as u8;
            exp[i + ORDER] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & (FIELD as u16) != 0 {
                x ^= PRIMITIVE;
            }
        }
        Self { exp, log }
    }

    #[inline]
    fn mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            return 0;
        }
        self.exp[self.log[a as usize] as usize + self.log[b as usize] as usize]
    }

    #[inline]
    fn alpha_pow(&self, e: usize) -> u8 {
        self.exp[e % ORDER]
    }

    /// Minimal polynomial of `α^e` as a GF(2) bitmask.
    fn minimal_polynomial(&self, e: usize) -> u64 {
        // coefficients in GF(64), lowest degree first
        let mut poly: Vec<u8> = vec![1];
        let mut conj = e % ORDER;
        loop {
            let root = self.alpha_pow(conj);
            let mut next = vec![0u8; poly.len() + 1];
            for (i, &c) in poly.iter().enumerate() {
                next[i + 1] ^= c;
                next[i] ^= self.mul(c, root);
            }
            poly = next;
            conj = (conj * 2) % ORDER;
            if conj == e % ORDER {
                break;
            }
        }
        poly.iter()
            .enumerate()
            .filter(|(_, &c)| c != 0)
            .fold(0u64, |acc, (i, _)| acc | (1 << i))
    }
}

fn gf2_mul(a: u64, b: u64) -> u64 {
    let mut out = 0u64;
    let mut b = b;
    let mut shift = 0;
    while b != 0 {
        if b & 1 != 0 {
            out ^= a << shift;
        }
        b >>= 1;
        shift += 1;
    }
    out
}

#[inline]
fn degree(p: u64) -> u32 {
    63 - p.leading_zeros()
}

/// Systematic encoder for the shortened BCH(36, 12) code.
#[derive(Clone, Debug)]
pub struct BchCode {
    generator: u64,
}

impl Default for BchCode {
    fn default() -> Self {
        Self::new()
    }
}

impl BchCode {
    pub fn new() -> Self {
        let gf = Gf64::new();
        let mut generator = 1u64;
        let mut seen = Vec::with_capacity(4);
        for e in [1usize, 3, 5, 7] {
            let m = gf.minimal_polynomial(e);
            if !seen.contains(&m) {
                generator = gf2_mul(generator, m);
                seen.push(m);
            }
        }
        debug_assert_eq!(degree(generator) as usize, CODE_BITS - DATA_BITS);
        Self { generator }
    }

    #[inline]
    pub fn generator(&self) -> u64 {
        self.generator
    }

    /// `data << 24 | (data << 24 mod g)`; `data` is truncated to 12 bits.
    pub fn encode(&self, data: u16) -> u64 {
        let parity_bits = degree(self.generator);
        let shifted = ((data as u64) & ((1 << DATA_BITS) - 1)) << parity_bits;
        let mut rem = shifted;
        for bit in (parity_bits..CODE_BITS as u32).rev() {
            if rem >> bit & 1 != 0 {
                rem ^= self.generator << (bit - parity_bits);
            }
        }
        shifted | rem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_tables_are_consistent() {
        let gf = Gf64::new();
        for a in 1..64u8 {
            assert_eq!(gf.exp[gf.log[a as usize] as usize], a);
            // a * a^-1 == 1
            let inv = gf.alpha_pow(ORDER - gf.log[a as usize] as usize);
            assert_eq!(gf.mul(a, inv), 1);
        }
    }

    #[test]
    fn minimal_polynomial_of_alpha_is_primitive() {
        let gf = Gf64::new();
        assert_eq!(gf.minimal_polynomial(1), PRIMITIVE as u64);
        assert_eq!(gf.minimal_polynomial(2), PRIMITIVE as u64);
    }

    #[test]
    fn generator_has_expected_form() {
        let code = BchCode::new();
        assert_eq!(code.generator(), 0x1DB_2777);
        assert_eq!(degree(code.generator()), 24);
    }

    #[test]
    fn codewords_are_multiples_of_generator() {
        let code = BchCode::new();
        for data in [0u16, 1, 42, 1234, 4095] {
            let cw = code.encode(data);
            assert_eq!(cw >> 24, data as u64);
            let mut rem = cw;
            for bit in (24..36u32).rev() {
                if rem >> bit & 1 != 0 {
                    rem ^= code.generator() << (bit - 24);
                }
            }
            assert_eq!(rem, 0);
        }
    }

    #[test]
    fn distinct_messages_differ_in_many_bits() {
        let code = BchCode::new();
        let words: Vec<u64> = (0..256u16).map(|d| code.encode(d)).collect();
        for (i, a) in words.iter().enumerate() {
            for b in &words[i + 1..] {
                assert!((a ^ b).count_ones() >= 2 * CORRECTABLE + 1);
            }
        }
    }
}
