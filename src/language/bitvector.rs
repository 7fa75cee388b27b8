use std::fmt;

/// Arbitrary-width bitvector. Bit 0 is the least significant bit; `Display`
/// renders most-significant first, as in source literals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitvector {
    bits: Vec<bool>,
}

impl Bitvector {
    pub fn zeros(width: usize) -> Self {
        Self {
            bits: vec![false; width],
        }
    }

    /// Parse a `'0101'`-style literal body (no quotes). Underscores are
    /// separators and ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let mut bits = Vec::with_capacity(text.len());
        for ch in text.chars().rev() {
            match ch {
                '0' => bits.push(false),
                '1' => bits.push(true),
                '_' | ' ' => {}
                _ => return None,
            }
        }
        Some(Self { bits })
    }

    pub fn from_int(value: i128, width: usize) -> Self {
        let bits = (0..width)
            .map(|i| (value >> i.min(127)) & 1 == 1)
            .collect();
        Self { bits }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn bit(&self, index: usize) -> Option<bool> {
        self.bits.get(index).copied()
    }

    /// Unsigned integer value; `None` when the width exceeds what `i128`
    /// can represent without wrapping.
    pub fn to_uint(&self) -> Option<i128> {
        if self.bits.len() > 127 {
            return None;
        }
        let mut acc: i128 = 0;
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit {
                acc |= 1 << i;
            }
        }
        Some(acc)
    }

    /// Two's-complement signed value. The empty bitvector reads as 0.
    pub fn to_sint(&self) -> Option<i128> {
        let unsigned = self.to_uint()?;
        let width = self.bits.len();
        if width == 0 || !self.bits[width - 1] {
            Some(unsigned)
        } else {
            Some(unsigned - (1 << width))
        }
    }

    /// Extract `(offset, length)` fields and concatenate them, first field
    /// most significant.
    pub fn extract_slices(&self, positions: &[(usize, usize)]) -> Option<Self> {
        let mut bits = Vec::new();
        for &(offset, length) in positions.iter().rev() {
            if offset + length > self.bits.len() {
                return None;
            }
            bits.extend_from_slice(&self.bits[offset..offset + length]);
        }
        Some(Self { bits })
    }

    /// Read-modify-write: overwrite the given `(offset, length)` fields with
    /// the bits of `src`, whose most-significant part feeds the first field.
    /// `src` must be exactly as wide as the fields combined.
    pub fn write_slices(&self, positions: &[(usize, usize)], src: &Self) -> Option<Self> {
        let total: usize = positions.iter().map(|&(_, len)| len).sum();
        if src.len() != total {
            return None;
        }
        let mut bits = self.bits.clone();
        let mut cursor = 0;
        for &(offset, length) in positions.iter().rev() {
            if offset + length > bits.len() {
                return None;
            }
            bits[offset..offset + length].copy_from_slice(&src.bits[cursor..cursor + length]);
            cursor += length;
        }
        Some(Self { bits })
    }

    /// Concatenate, first part most significant.
    pub fn concat(parts: &[Self]) -> Self {
        let mut bits = Vec::new();
        for part in parts.iter().rev() {
            bits.extend_from_slice(&part.bits);
        }
        Self { bits }
    }

    pub fn and(&self, other: &Self) -> Option<Self> {
        self.zip_with(other, |a, b| a && b)
    }

    pub fn or(&self, other: &Self) -> Option<Self> {
        self.zip_with(other, |a, b| a || b)
    }

    pub fn xor(&self, other: &Self) -> Option<Self> {
        self.zip_with(other, |a, b| a != b)
    }

    pub fn not(&self) -> Self {
        Self {
            bits: self.bits.iter().map(|b| !b).collect(),
        }
    }

    fn zip_with(&self, other: &Self, f: impl Fn(bool, bool) -> bool) -> Option<Self> {
        if self.len() != other.len() {
            return None;
        }
        let bits = self
            .bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| f(*a, *b))
            .collect();
        Some(Self { bits })
    }
}

impl fmt::Display for Bitvector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'")?;
        for bit in self.bits.iter().rev() {
            write!(f, "{}", if *bit { '1' } else { '0' })?;
        }
        write!(f, "'")
    }
}

/// A `'10x1'`-style bit mask: `1` requires a set bit, `0` a clear bit, `x`
/// accepts either.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    text: String,
    set: Bitvector,
    unset: Bitvector,
}

impl Mask {
    pub fn parse(text: &str) -> Option<Self> {
        let mut set = Vec::new();
        let mut unset = Vec::new();
        for ch in text.chars().rev() {
            match ch {
                '1' => {
                    set.push(true);
                    unset.push(false);
                }
                '0' => {
                    set.push(false);
                    unset.push(true);
                }
                'x' => {
                    set.push(false);
                    unset.push(false);
                }
                '_' | ' ' => {}
                _ => return None,
            }
        }
        Some(Self {
            text: text.to_string(),
            set: Bitvector { bits: set },
            unset: Bitvector { bits: unset },
        })
    }

    pub fn width(&self) -> usize {
        self.set.len()
    }

    /// Bits the mask requires set.
    pub fn set_bits(&self) -> &Bitvector {
        &self.set
    }

    /// Bits the mask requires clear.
    pub fn unset_bits(&self) -> &Bitvector {
        &self.unset
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let bv = Bitvector::parse("1010").expect("parse");
        assert_eq!(bv.len(), 4);
        assert_eq!(bv.to_uint(), Some(10));
        assert_eq!(bv.to_string(), "'1010'");
    }

    #[test]
    fn signed_conversion_uses_twos_complement() {
        let bv = Bitvector::parse("1111").expect("parse");
        assert_eq!(bv.to_uint(), Some(15));
        assert_eq!(bv.to_sint(), Some(-1));
        let bv = Bitvector::parse("0111").expect("parse");
        assert_eq!(bv.to_sint(), Some(7));
    }

    #[test]
    fn extract_concatenates_first_field_high() {
        let bv = Bitvector::parse("11001010").expect("parse");
        let out = bv.extract_slices(&[(4, 4), (0, 4)]).expect("extract");
        assert_eq!(out.to_string(), "'11001010'");
        let out = bv.extract_slices(&[(0, 4), (4, 4)]).expect("extract");
        assert_eq!(out.to_string(), "'10101100'");
    }

    #[test]
    fn write_slices_is_read_modify_write() {
        let bv = Bitvector::parse("00000000").expect("parse");
        let src = Bitvector::parse("1111").expect("parse");
        let out = bv.write_slices(&[(0, 4)], &src).expect("write");
        assert_eq!(out.to_uint(), Some(15));
        let out = bv.write_slices(&[(6, 2), (0, 2)], &src).expect("write");
        assert_eq!(out.to_string(), "'11000011'");
        assert!(bv.write_slices(&[(0, 3)], &src).is_none());
    }

    #[test]
    fn mask_matching() {
        let mask = Mask::parse("1x0").expect("mask");
        let set = mask.set_bits();
        let unset = mask.unset_bits();
        for (text, expected) in [("100", true), ("110", true), ("101", false)] {
            let v = Bitvector::parse(text).expect("parse");
            let masked = v
                .and(set)
                .and_then(|hi| v.not().and(unset).and_then(|lo| hi.or(&lo)))
                .expect("widths agree");
            let want = set.or(unset).expect("widths agree");
            assert_eq!(masked == want, expected, "value {text}");
        }
    }
}
