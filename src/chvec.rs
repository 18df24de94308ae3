use std::fmt::Display;
use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::errinput;
use crate::error::Result;

/// Number of bits in a composite hash, and so the number of choice-vector
/// items.
pub const MAX_CHVEC: usize = 32;

/// One choice-vector item: composite-hash bit `i` is bit `bit` of the digest
/// of attribute `att`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChVecItem {
    pub att: u8,
    pub bit: u8,
}

/// An ordered list of MAX_CHVEC items mapping composite-hash bits to
/// attribute-hash bits. Parsed once at relation creation and persisted in
/// the info file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceVector {
    items: [ChVecItem; MAX_CHVEC],
}

impl ChoiceVector {
    /// Parses a choice vector from `att:bit,att:bit,…` syntax. Fewer than
    /// MAX_CHVEC entries are permitted; trailing items are zero-filled.
    pub fn parse(s: &str, nattrs: u32) -> Result<Self> {
        let mut items = [ChVecItem::default(); MAX_CHVEC];
        if s.is_empty() {
            return Ok(Self { items });
        }
        let mut count = 0;
        for pair in s.split(',') {
            if count == MAX_CHVEC {
                return errinput!("choice vector has more than {MAX_CHVEC} items");
            }
            let (att, bit) = match pair.split_once(':') {
                Some(parts) => parts,
                None => return errinput!("choice vector item {pair} is not att:bit"),
            };
            let att: u32 = match att.trim().parse() {
                Ok(n) => n,
                Err(_) => return errinput!("choice vector attribute {att} is not a number"),
            };
            let bit: u32 = match bit.trim().parse() {
                Ok(n) => n,
                Err(_) => return errinput!("choice vector bit {bit} is not a number"),
            };
            if att >= nattrs {
                return errinput!("choice vector attribute {att} out of range (nattrs {nattrs})");
            }
            if bit as usize >= MAX_CHVEC {
                return errinput!("choice vector bit {bit} out of range");
            }
            items[count] = ChVecItem {
                att: att as u8,
                bit: bit as u8,
            };
            count += 1;
        }
        Ok(Self { items })
    }

    /// The item sourcing composite-hash bit `i`.
    pub fn item(&self, i: usize) -> ChVecItem {
        self.items[i]
    }

    /// Writes the descriptor form: MAX_CHVEC (att, bit) byte pairs.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        for item in &self.items {
            writer.write_u8(item.att)?;
            writer.write_u8(item.bit)?;
        }
        Ok(())
    }

    /// Reads the descriptor form back.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut items = [ChVecItem::default(); MAX_CHVEC];
        for item in &mut items {
            item.att = reader.read_u8()?;
            item.bit = reader.read_u8()?;
        }
        Ok(Self { items })
    }
}

impl Display for ChoiceVector {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}:{}", item.att, item.bit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_parse_and_zero_fill() {
        let cv = ChoiceVector::parse("0:0,1:0,0:1,2:0", 3).unwrap();
        assert_eq!(cv.item(0), ChVecItem { att: 0, bit: 0 });
        assert_eq!(cv.item(1), ChVecItem { att: 1, bit: 0 });
        assert_eq!(cv.item(2), ChVecItem { att: 0, bit: 1 });
        assert_eq!(cv.item(3), ChVecItem { att: 2, bit: 0 });
        // Trailing items are zero-filled.
        for i in 4..MAX_CHVEC {
            assert_eq!(cv.item(i), ChVecItem { att: 0, bit: 0 });
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ChoiceVector::parse("0:0,junk", 2),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            ChoiceVector::parse("0:x", 2),
            Err(Error::InvalidInput(_))
        ));
        // Attribute index past the schema width.
        assert!(matches!(
            ChoiceVector::parse("2:0", 2),
            Err(Error::InvalidInput(_))
        ));
        // Bit index past the hash width.
        assert!(matches!(
            ChoiceVector::parse("0:32", 2),
            Err(Error::InvalidInput(_))
        ));
        // One item too many.
        let long = (0..=MAX_CHVEC).map(|_| "0:0").collect::<Vec<_>>().join(",");
        assert!(matches!(
            ChoiceVector::parse(&long, 2),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let cv = ChoiceVector::parse("0:0,1:5,0:31,1:2", 2).unwrap();
        let mut buf = Vec::new();
        cv.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 2 * MAX_CHVEC);
        let decoded = ChoiceVector::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(cv, decoded);
    }

    #[test]
    fn test_display() {
        let cv = ChoiceVector::parse("0:0,1:1", 2).unwrap();
        let s = cv.to_string();
        assert!(s.starts_with("0:0,1:1,0:0"));
        assert_eq!(s.split(',').count(), MAX_CHVEC);
    }
}
