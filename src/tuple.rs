use crate::errinput;
use crate::error::Result;
use crate::hash;

/// A fixed-arity record: comma-separated attribute values, stored on disk as
/// `v1,v2,…,vN\0`. Values are non-empty and contain neither commas nor NULs.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tuple {
    raw: String,
}

impl Tuple {
    /// Parses a tuple against the expected arity.
    pub fn parse(s: &str, nattrs: u32) -> Result<Self> {
        let fields: Vec<&str> = s.split(',').collect();
        if fields.len() != nattrs as usize {
            return errinput!("tuple {s} has {} attributes, expected {nattrs}", fields.len());
        }
        for field in &fields {
            if field.is_empty() {
                return errinput!("tuple {s} has an empty attribute");
            }
            if field.contains('\0') {
                return errinput!("tuple attribute contains a NUL byte");
            }
        }
        Ok(Self { raw: s.to_string() })
    }

    /// Reconstructs a tuple from its on-disk form, without re-validation.
    pub(crate) fn from_raw(raw: String) -> Self {
        Self { raw }
    }

    /// The comma-separated form, without the trailing NUL.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of bytes the tuple occupies in a page, including the NUL
    /// terminator.
    pub fn encoded_len(&self) -> usize {
        self.raw.len() + 1
    }

    /// The attribute values in order.
    pub fn vals(&self) -> impl Iterator<Item = &str> {
        self.raw.split(',')
    }

    /// Per-attribute 32-bit digests, in attribute order.
    pub fn attr_hashes(&self) -> Vec<u32> {
        self.vals().map(|v| hash::hash_bytes(v.as_bytes())).collect()
    }
}

impl std::fmt::Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// A query pattern: one field per attribute, where `?` marks an unknown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    fields: Vec<Option<String>>,
}

impl Pattern {
    /// Parses a pattern against the expected arity. `?` fields are
    /// wildcards; anything else is matched literally.
    pub fn parse(s: &str, nattrs: u32) -> Result<Self> {
        let fields: Vec<&str> = s.split(',').collect();
        if fields.len() != nattrs as usize {
            return errinput!(
                "pattern {s} has {} attributes, expected {nattrs}",
                fields.len()
            );
        }
        let fields = fields
            .into_iter()
            .map(|field| match field {
                "?" => Ok(None),
                "" => errinput!("pattern {s} has an empty attribute"),
                lit => Ok(Some(lit.to_string())),
            })
            .collect::<Result<_>>()?;
        Ok(Self { fields })
    }

    /// The literal for attribute `i`, or None if it is wildcarded.
    pub fn literal(&self, i: usize) -> Option<&str> {
        self.fields[i].as_deref()
    }

    /// Whether the tuple matches: every literal field equals the
    /// corresponding tuple value bytewise.
    pub fn matches(&self, tuple: &Tuple) -> bool {
        let mut vals = tuple.vals();
        for field in &self.fields {
            let val = match vals.next() {
                Some(v) => v,
                None => return false,
            };
            if let Some(lit) = field {
                if lit != val {
                    return false;
                }
            }
        }
        vals.next().is_none()
    }
}
