use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::chvec::{ChoiceVector, MAX_CHVEC};
use crate::config::RelnConfig;
use crate::error::{Error, Result};
use crate::page::{Page, PageFile, PageId, DATA_SIZE, NO_PAGE, PAGE_SIZE};
use crate::query::Query;
use crate::tuple::Tuple;
use crate::{bits, errdata, errinput, hash};

/// Descriptor: eight 32-bit counters followed by the choice vector.
const DESC_SIZE: usize = 8 * 4 + 2 * MAX_CHVEC;

/// An open relation: the descriptor plus handles on the three backing files
/// `<name>.info`, `<name>.data` and `<name>.ovflow`. A relation is owned by
/// exactly one process; there is no concurrent access.
///
/// Tuples are placed by linear hashing: bucket addresses are the low `depth`
/// bits of the composite hash, or `depth + 1` bits for buckets below the
/// split pointer. Each time `capacity` tuples have been inserted the bucket
/// at the split pointer is split, growing the address space by one.
pub struct Relation {
    name: String,
    nattrs: u32,
    depth: u32,
    sp: u32,
    npages: u32,
    ntups: u32,
    capacity: u32,
    insertion: u32,
    splitting: bool,
    chvec: ChoiceVector,
    info: File,
    data: PageFile,
    ovflow: PageFile,
    closed: bool,
}

impl Relation {
    /// Creates a new relation: three empty files, `npages` pre-allocated
    /// primary pages, and the descriptor persisted to the info file.
    pub fn create(name: &str, config: &RelnConfig) -> Result<Relation> {
        if config.nattrs == 0 {
            return errinput!("relation must have at least one attribute");
        }
        if config.nattrs > u8::MAX as u32 {
            return errinput!("relation cannot have more than {} attributes", u8::MAX);
        }
        if config.depth >= 32 {
            return errinput!("depth {} out of range", config.depth);
        }
        if config.npages != 1 << config.depth {
            return errinput!(
                "npages {} does not match depth {} (expected {})",
                config.npages,
                config.depth,
                1u32 << config.depth
            );
        }
        let chvec = ChoiceVector::parse(&config.chvec, config.nattrs)?;

        let info = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(Self::info_path(name))?;
        let mut data = PageFile::create(&Self::data_path(name))?;
        let ovflow = PageFile::create(&Self::ovflow_path(name))?;
        for _ in 0..config.npages {
            data.append_page()?;
        }

        let reln = Relation {
            name: name.to_string(),
            nattrs: config.nattrs,
            depth: config.depth,
            sp: 0,
            npages: config.npages,
            ntups: 0,
            capacity: PAGE_SIZE as u32 / (10 * config.nattrs),
            insertion: 0,
            splitting: false,
            chvec,
            info,
            data,
            ovflow,
            closed: false,
        };
        reln.write_descriptor()?;
        tracing::info!(
            name = %reln.name,
            nattrs = reln.nattrs,
            npages = reln.npages,
            depth = reln.depth,
            "created relation"
        );
        Ok(reln)
    }

    /// Whether a relation of this name exists on disk.
    pub fn exists(name: &str) -> bool {
        Self::info_path(name).exists()
    }

    /// Opens an existing relation, rehydrating the descriptor from the info
    /// file.
    pub fn open(name: &str) -> Result<Relation> {
        if !Self::exists(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        let info = File::options()
            .read(true)
            .write(true)
            .open(Self::info_path(name))?;
        let data = PageFile::open(&Self::data_path(name))?;
        let ovflow = PageFile::open(&Self::ovflow_path(name))?;

        let mut buf = vec![0u8; DESC_SIZE];
        let mut file = &info;
        file.seek(SeekFrom::Start(0))?;
        match file.read_exact(&mut buf) {
            Ok(()) => (),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return errdata!("info file for {name} is truncated");
            }
            Err(e) => return Err(e.into()),
        }

        let mut reader: &[u8] = &buf;
        let nattrs = reader.read_u32::<NativeEndian>()?;
        let depth = reader.read_u32::<NativeEndian>()?;
        let sp = reader.read_u32::<NativeEndian>()?;
        let npages = reader.read_u32::<NativeEndian>()?;
        let ntups = reader.read_u32::<NativeEndian>()?;
        let capacity = reader.read_u32::<NativeEndian>()?;
        let insertion = reader.read_u32::<NativeEndian>()?;
        let splitting = reader.read_u32::<NativeEndian>()?;
        let chvec = ChoiceVector::decode(&mut reader)?;

        if nattrs == 0 || depth >= 32 {
            return errdata!("descriptor for {name} is corrupt");
        }
        if sp >= 1 << depth || npages != (1 << depth) + sp {
            return errdata!(
                "descriptor for {name} is inconsistent: depth {depth} sp {sp} npages {npages}"
            );
        }
        for i in 0..MAX_CHVEC {
            if chvec.item(i).att as u32 >= nattrs {
                return errdata!("choice vector for {name} references attribute out of range");
            }
        }

        tracing::debug!(name, nattrs, depth, sp, npages, ntups, "opened relation");
        Ok(Relation {
            name: name.to_string(),
            nattrs,
            depth,
            sp,
            npages,
            ntups,
            capacity,
            insertion,
            splitting: splitting != 0,
            chvec,
            info,
            data,
            ovflow,
            closed: false,
        })
    }

    /// Closes the relation, persisting the descriptor. Dropping without
    /// closing writes the descriptor back best-effort.
    pub fn close(mut self) -> Result<()> {
        self.write_descriptor()?;
        self.closed = true;
        Ok(())
    }

    fn info_path(name: &str) -> PathBuf {
        PathBuf::from(format!("{name}.info"))
    }

    fn data_path(name: &str) -> PathBuf {
        PathBuf::from(format!("{name}.data"))
    }

    fn ovflow_path(name: &str) -> PathBuf {
        PathBuf::from(format!("{name}.ovflow"))
    }

    fn write_descriptor(&self) -> Result<()> {
        let mut buf = Vec::with_capacity(DESC_SIZE);
        buf.write_u32::<NativeEndian>(self.nattrs)?;
        buf.write_u32::<NativeEndian>(self.depth)?;
        buf.write_u32::<NativeEndian>(self.sp)?;
        buf.write_u32::<NativeEndian>(self.npages)?;
        buf.write_u32::<NativeEndian>(self.ntups)?;
        buf.write_u32::<NativeEndian>(self.capacity)?;
        buf.write_u32::<NativeEndian>(self.insertion)?;
        buf.write_u32::<NativeEndian>(self.splitting as u32)?;
        self.chvec.encode(&mut buf)?;

        let mut file = &self.info;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&buf)?;
        Ok(())
    }

    /// The composite MAH hash of a tuple under this relation's choice
    /// vector.
    fn tuple_hash(&self, tuple: &Tuple) -> u32 {
        hash::composite(&tuple.attr_hashes(), &self.chvec)
    }

    /// The bucket a hash addresses: the low `depth` bits, except that
    /// already-split buckets below the split pointer use `depth + 1` bits.
    fn bucket_of(&self, hash: u32) -> PageId {
        let p = bits::lower(hash, self.depth);
        if p < self.sp {
            return bits::lower(hash, self.depth + 1);
        }
        p
    }

    /// Inserts a tuple, splitting the bucket at the split pointer first if
    /// `capacity` tuples have arrived since the last split. Returns the
    /// bucket the tuple was placed in (the insertion page itself may be an
    /// overflow page).
    pub fn insert(&mut self, tuple: &Tuple) -> Result<PageId> {
        if tuple.vals().count() as u32 != self.nattrs {
            return errinput!(
                "tuple {tuple} has {} attributes, expected {}",
                tuple.vals().count(),
                self.nattrs
            );
        }
        if self.insertion == self.capacity {
            self.insertion = 0;
            self.splitting = true;
            let split = self.split();
            self.splitting = false;
            split?;
        }
        let bucket = self.place(tuple)?;
        self.ntups += 1;
        self.insertion += 1;
        Ok(bucket)
    }

    /// Places a tuple in its bucket without touching the insert counters.
    /// The split protocol re-inserts through here directly.
    fn place(&mut self, tuple: &Tuple) -> Result<PageId> {
        if tuple.encoded_len() > DATA_SIZE {
            return Err(Error::NoSpace);
        }
        let bucket = self.bucket_of(self.tuple_hash(tuple));

        let mut page = self.data.read_page(bucket)?;
        if page.add_tuple(tuple) {
            self.data.write_page(bucket, &page)?;
            return Ok(bucket);
        }

        // Primary page is full. An empty chain gets its first overflow page.
        if page.ovflow() == NO_PAGE {
            let newp = self.ovflow.append_page()?;
            page.set_ovflow(newp);
            self.data.write_page(bucket, &page)?;
            let mut newpg = self.ovflow.read_page(newp)?;
            if !newpg.add_tuple(tuple) {
                return Err(Error::NoSpace);
            }
            self.ovflow.write_page(newp, &newpg)?;
            return Ok(bucket);
        }

        // Walk the chain for the first page with room.
        let mut prev: Option<(PageId, Page)> = None;
        let mut ovp = page.ovflow();
        while ovp != NO_PAGE {
            let mut ovpg = self.ovflow.read_page(ovp)?;
            if ovpg.add_tuple(tuple) {
                self.ovflow.write_page(ovp, &ovpg)?;
                return Ok(bucket);
            }
            let next = ovpg.ovflow();
            prev = Some((ovp, ovpg));
            ovp = next;
        }

        // Chain exhausted: append a fresh page and link it as the new tail.
        let Some((prevp, mut prevpg)) = prev else {
            return errdata!("overflow chain for bucket {bucket} vanished mid-walk");
        };
        let newp = self.ovflow.append_page()?;
        let mut newpg = self.ovflow.read_page(newp)?;
        if !newpg.add_tuple(tuple) {
            return Err(Error::NoSpace);
        }
        self.ovflow.write_page(newp, &newpg)?;
        prevpg.set_ovflow(newp);
        self.ovflow.write_page(prevp, &prevpg)?;
        Ok(bucket)
    }

    /// Splits the bucket at the split pointer: allocates its buddy primary
    /// page, snapshots the bucket's pages, clears them on disk (each keeps
    /// its chain link), and re-inserts every snapshot tuple under the
    /// deepened addressing. Advancing the split pointer before re-inserting
    /// is what makes `bucket_of` use `depth + 1` bits for the source.
    fn split(&mut self) -> Result<()> {
        let buddy = self.data.append_page()?;
        if buddy != self.npages {
            return errdata!("data file out of sync: new page {buddy}, npages {}", self.npages);
        }
        self.npages += 1;
        tracing::debug!(
            name = %self.name,
            sp = self.sp,
            depth = self.depth,
            npages = self.npages,
            "splitting bucket"
        );

        let primary = self.data.read_page(self.sp)?;
        let mut cleared = Page::new();
        cleared.set_ovflow(primary.ovflow());
        self.data.write_page(self.sp, &cleared)?;

        let mut chain = Vec::new();
        let mut ovp = primary.ovflow();
        while ovp != NO_PAGE {
            let pg = self.ovflow.read_page(ovp)?;
            let mut cleared = Page::new();
            cleared.set_ovflow(pg.ovflow());
            self.ovflow.write_page(ovp, &cleared)?;
            ovp = pg.ovflow();
            chain.push(pg);
        }

        self.sp += 1;

        for tuple in primary.tuples()? {
            self.place(&tuple)?;
        }
        for page in &chain {
            for tuple in page.tuples()? {
                self.place(&tuple)?;
            }
        }

        if self.sp == 1 << self.depth {
            self.depth += 1;
            self.sp = 0;
            tracing::debug!(name = %self.name, depth = self.depth, "address space doubled");
        }
        Ok(())
    }

    /// Starts a partial-match scan. The relation must outlive the query.
    pub fn query(&self, pattern: &str) -> Result<Query<'_>> {
        Query::start(self, pattern)
    }

    /// Writes global counters, the choice vector, and each bucket's chain
    /// of `(pageID, #tuples, freebytes, ovflow)` entries in walk order.
    pub fn stats<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "Global Info:")?;
        writeln!(
            w,
            "#attrs:{}  #pages:{}  #tuples:{}  d:{}  sp:{}",
            self.nattrs, self.npages, self.ntups, self.depth, self.sp
        )?;
        writeln!(w, "Choice vector")?;
        writeln!(w, "{}", self.chvec)?;
        writeln!(w, "Bucket Info:")?;
        writeln!(w, "{:<4} {}", "#", "Info on pages in bucket")?;
        writeln!(w, "{:<4} {}", "", "(pageID,#tuples,freebytes,ovflow)")?;
        for pid in 0..self.npages {
            write!(w, "[{pid:2}]  ")?;
            let page = self.data.read_page(pid)?;
            write!(
                w,
                "(d{pid},{},{},{})",
                page.ntuples(),
                page.free_space(),
                page.ovflow() as i32
            )?;
            let mut ovid = page.ovflow();
            while ovid != NO_PAGE {
                let page = self.ovflow.read_page(ovid)?;
                write!(
                    w,
                    " -> (ov{ovid},{},{},{})",
                    page.ntuples(),
                    page.free_space(),
                    page.ovflow() as i32
                )?;
                ovid = page.ovflow();
            }
            writeln!(w)?;
        }
        Ok(())
    }

    pub fn nattrs(&self) -> u32 {
        self.nattrs
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn split_pointer(&self) -> u32 {
        self.sp
    }

    pub fn npages(&self) -> u32 {
        self.npages
    }

    pub fn ntuples(&self) -> u32 {
        self.ntups
    }

    pub fn chvec(&self) -> &ChoiceVector {
        &self.chvec
    }

    pub(crate) fn data_file(&self) -> &PageFile {
        &self.data
    }

    pub(crate) fn ovflow_file(&self) -> &PageFile {
        &self.ovflow
    }
}

impl Drop for Relation {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.write_descriptor() {
                tracing::warn!(name = %self.name, error = %err, "failed to persist descriptor");
            }
        }
    }
}
