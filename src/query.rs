use crate::bits;
use crate::error::Result;
use crate::hash;
use crate::page::{PageId, NO_PAGE};
use crate::reln::Relation;
use crate::tuple::{Pattern, Tuple};

/// A partial-match scan over a relation.
///
/// The pattern's literal attributes pin the composite-hash bits their
/// choice-vector items source; wildcarded attributes leave "star" bits free.
/// Every assignment of the star bits within the bottom `depth + 1` hash bits
/// names one candidate bucket, so the scan visits at most `2^nstars`
/// buckets, streaming each bucket's primary page and overflow chain in
/// order.
///
/// The query borrows the relation, so the relation outlives every open scan.
pub struct Query<'a> {
    rel: &'a Relation,
    pattern: Pattern,

    /// Composite-hash bits pinned by literal attributes.
    known: u32,
    /// Positions of the free bits within `0..=depth`, ascending.
    star_bits: Vec<u32>,
    /// Whether bit `depth` itself is free. If so, candidate addresses use
    /// `depth + 1` bits unconditionally: addressing with `depth` bits would
    /// revisit the `0xx` buckets while trying their `1xx` buddies, and a
    /// `1xx` buddy may not have been allocated yet.
    gated: bool,

    /// Current assignment of the star bits, counting up to `bit_seq_max`.
    bit_seq: u32,
    bit_seq_max: u32,

    /// Decoded tuples of the page being scanned.
    tuples: Vec<Tuple>,
    next_tup: usize,
    /// Overflow link of the page being scanned.
    cur_ovflow: PageId,

    buckets_fetched: usize,
    done: bool,
}

impl<'a> Query<'a> {
    /// Compiles a pattern string and positions the scan on the first
    /// candidate bucket.
    pub(crate) fn start(rel: &'a Relation, pattern: &str) -> Result<Query<'a>> {
        let pattern = Pattern::parse(pattern, rel.nattrs())?;

        // Digest each literal attribute once.
        let hashes: Vec<Option<u32>> = (0..rel.nattrs() as usize)
            .map(|i| pattern.literal(i).map(|lit| hash::hash_bytes(lit.as_bytes())))
            .collect();

        // Pin the known bits and record the stars across the depth + 1
        // bits that addressing can consult.
        let mut known = 0;
        let mut star_bits = Vec::new();
        for i in 0..=rel.depth() {
            let item = rel.chvec().item(i as usize);
            match hashes[item.att as usize] {
                Some(h) => {
                    if bits::bit_is_set(h, item.bit as u32) {
                        known = bits::set_bit(known, i);
                    }
                }
                None => star_bits.push(i),
            }
        }

        let mut bit_seq_max = 0;
        for i in 0..star_bits.len() {
            bit_seq_max = bits::set_bit(bit_seq_max, i as u32);
        }
        let gated = star_bits.last() == Some(&rel.depth());

        let mut query = Query {
            rel,
            pattern,
            known,
            star_bits,
            gated,
            bit_seq: 0,
            bit_seq_max,
            tuples: Vec::new(),
            next_tup: 0,
            cur_ovflow: NO_PAGE,
            buckets_fetched: 0,
            done: false,
        };
        // The first candidate has every star bit zero, so it always exists.
        let first = query.address(query.known);
        query.load_bucket(first)?;
        Ok(query)
    }

    /// Number of primary pages fetched so far; bounded by `2^nstars`.
    pub fn buckets_fetched(&self) -> usize {
        self.buckets_fetched
    }

    /// The normal addressing rule for a composite hash.
    fn address(&self, mal: u32) -> PageId {
        let p = bits::lower(mal, self.rel.depth());
        if p < self.rel.split_pointer() {
            return bits::lower(mal, self.rel.depth() + 1);
        }
        p
    }

    /// The current star-bit assignment scattered into hash-bit positions.
    fn scatter(&self) -> u32 {
        let mut unknown = 0;
        for (i, &pos) in self.star_bits.iter().enumerate() {
            if bits::bit_is_set(self.bit_seq, i as u32) {
                unknown = bits::set_bit(unknown, pos);
            }
        }
        unknown
    }

    fn load_bucket(&mut self, id: PageId) -> Result<()> {
        self.buckets_fetched += 1;
        let page = self.rel.data_file().read_page(id)?;
        self.tuples = page.tuples()?;
        self.next_tup = 0;
        self.cur_ovflow = page.ovflow();
        Ok(())
    }

    fn load_ovflow(&mut self, id: PageId) -> Result<()> {
        let page = self.rel.ovflow_file().read_page(id)?;
        self.tuples = page.tuples()?;
        self.next_tup = 0;
        self.cur_ovflow = page.ovflow();
        Ok(())
    }
}

impl Iterator for Query<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            // Drain the current page.
            while self.next_tup < self.tuples.len() {
                let i = self.next_tup;
                self.next_tup += 1;
                if self.pattern.matches(&self.tuples[i]) {
                    return Some(Ok(self.tuples[i].clone()));
                }
            }

            // Follow the bucket's overflow chain.
            if self.cur_ovflow != NO_PAGE {
                if let Err(err) = self.load_ovflow(self.cur_ovflow) {
                    self.done = true;
                    return Some(Err(err));
                }
                continue;
            }

            // Bucket exhausted; advance to the next candidate.
            loop {
                if self.bit_seq == self.bit_seq_max {
                    self.done = true;
                    return None;
                }
                self.bit_seq += 1;
                let mal = self.known | self.scatter();
                let id = if self.gated {
                    let p = bits::lower(mal, self.rel.depth() + 1);
                    if p >= self.rel.npages() {
                        // This buddy bucket has not been allocated yet.
                        continue;
                    }
                    p
                } else {
                    self.address(mal)
                };
                match self.load_bucket(id) {
                    Ok(()) => break,
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
            }
        }
    }
}
