use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::errdata;
use crate::error::{Error, Result};
use crate::tuple::Tuple;

/// Size of one page on disk. Page `i` of a file occupies bytes
/// `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`.
pub const PAGE_SIZE: usize = 1024;

/// Page header: tuple count, free-space cursor, overflow link.
pub const HEADER_SIZE: usize = 12;

/// Bytes available for the packed tuple run.
pub const DATA_SIZE: usize = PAGE_SIZE - HEADER_SIZE;

/// Index of a page within its file.
pub type PageId = u32;

/// Sentinel for "no overflow page".
pub const NO_PAGE: PageId = PageId::MAX;

/// A fixed-size block holding a packed run of NUL-terminated tuples. The
/// header tracks the tuple count, the byte offset where the next tuple would
/// be appended, and the id of the next page in the bucket's overflow chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    ntuples: u32,
    free: u32,
    ovflow: PageId,
    data: [u8; DATA_SIZE],
}

impl Page {
    /// An empty page with no overflow link.
    pub fn new() -> Self {
        Self {
            ntuples: 0,
            free: 0,
            ovflow: NO_PAGE,
            data: [0; DATA_SIZE],
        }
    }

    /// Appends the tuple's serialized form (with terminator) iff it fits.
    pub fn add_tuple(&mut self, tuple: &Tuple) -> bool {
        let needed = tuple.encoded_len();
        if needed > self.free_space() {
            return false;
        }
        let start = self.free as usize;
        self.data[start..start + needed - 1].copy_from_slice(tuple.as_str().as_bytes());
        self.data[start + needed - 1] = 0;
        self.free += needed as u32;
        self.ntuples += 1;
        true
    }

    pub fn ntuples(&self) -> u32 {
        self.ntuples
    }

    /// Bytes still available in the data area.
    pub fn free_space(&self) -> usize {
        DATA_SIZE - self.free as usize
    }

    pub fn ovflow(&self) -> PageId {
        self.ovflow
    }

    pub fn set_ovflow(&mut self, id: PageId) {
        self.ovflow = id;
    }

    /// Decodes the packed tuple run. Fails with InvalidData if a terminator
    /// is missing or the run does not end exactly at the free cursor.
    pub fn tuples(&self) -> Result<Vec<Tuple>> {
        let used = self.free as usize;
        let data = &self.data[..used];
        let mut tuples = Vec::with_capacity(self.ntuples as usize);
        let mut pos = 0;
        for _ in 0..self.ntuples {
            let len = match data[pos..].iter().position(|&b| b == 0) {
                Some(len) => len,
                None => return errdata!("page tuple run is missing a terminator"),
            };
            let raw = std::str::from_utf8(&data[pos..pos + len])
                .map_err(|_| Error::InvalidData("page tuple is not valid utf-8".to_string()))?;
            tuples.push(Tuple::from_raw(raw.to_string()));
            pos += len + 1;
        }
        if pos != used {
            return errdata!("page tuple run ends at byte {pos}, free cursor says {used}");
        }
        Ok(tuples)
    }

    /// Serializes the page into its on-disk form.
    fn encode(&self) -> Result<[u8; PAGE_SIZE]> {
        let mut buf = [0u8; PAGE_SIZE];
        let mut header: &mut [u8] = &mut buf[..HEADER_SIZE];
        header.write_u32::<NativeEndian>(self.ntuples)?;
        header.write_u32::<NativeEndian>(self.free)?;
        header.write_u32::<NativeEndian>(self.ovflow)?;
        buf[HEADER_SIZE..].copy_from_slice(&self.data);
        Ok(buf)
    }

    /// Deserializes a page, validating the header against the data area.
    fn decode(buf: &[u8; PAGE_SIZE]) -> Result<Self> {
        let mut header: &[u8] = &buf[..HEADER_SIZE];
        let ntuples = header.read_u32::<NativeEndian>()?;
        let free = header.read_u32::<NativeEndian>()?;
        let ovflow = header.read_u32::<NativeEndian>()?;
        if free as usize > DATA_SIZE {
            return errdata!("page free cursor {free} past data area");
        }
        // Each stored tuple is at least one byte plus its terminator.
        if ntuples as usize * 2 > free as usize {
            return errdata!("page claims {ntuples} tuples in {free} bytes");
        }
        let mut data = [0u8; DATA_SIZE];
        data.copy_from_slice(&buf[HEADER_SIZE..]);
        Ok(Self {
            ntuples,
            free,
            ovflow,
            data,
        })
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

/// A page-aligned file. Reads hand out fresh owned pages; nothing is cached
/// across operations.
#[derive(Debug)]
pub struct PageFile {
    file: File,
}

impl PageFile {
    /// Creates an empty page file, truncating any existing one.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Opens an existing page file for reading and writing.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Reads page `id` into a fresh buffer owned by the caller.
    pub fn read_page(&self, id: PageId) -> Result<Page> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(id as u64 * PAGE_SIZE as u64))?;
        let mut buf = [0u8; PAGE_SIZE];
        file.read_exact(&mut buf)?;
        Page::decode(&buf)
    }

    /// Writes the page at `id`, consuming nothing; the caller keeps the
    /// buffer.
    pub fn write_page(&mut self, id: PageId, page: &Page) -> Result<()> {
        let buf = page.encode()?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(id as u64 * PAGE_SIZE as u64))?;
        file.write_all(&buf)?;
        Ok(())
    }

    /// Appends a fresh empty page and returns its id.
    pub fn append_page(&mut self) -> Result<PageId> {
        let mut file = &self.file;
        let len = file.seek(SeekFrom::End(0))?;
        let id = (len / PAGE_SIZE as u64) as PageId;
        let buf = Page::new().encode()?;
        file.write_all(&buf)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tuple(s: &str) -> Tuple {
        Tuple::parse(s, s.split(',').count() as u32).unwrap()
    }

    #[test]
    fn test_empty_page() {
        let page = Page::new();
        assert_eq!(page.ntuples(), 0);
        assert_eq!(page.free_space(), DATA_SIZE);
        assert_eq!(page.ovflow(), NO_PAGE);
        assert_eq!(page.tuples().unwrap(), vec![]);
    }

    #[test]
    fn test_add_tuple_until_full() {
        let mut page = Page::new();
        let t = tuple("0123456789,0123456789"); // 22 bytes encoded
        let mut added = 0;
        while page.add_tuple(&t) {
            added += 1;
        }
        assert_eq!(added, DATA_SIZE / t.encoded_len());
        assert_eq!(page.ntuples(), added as u32);
        assert!(page.free_space() < t.encoded_len());
        // The decoded run returns every stored tuple in insertion order.
        let stored = page.tuples().unwrap();
        assert_eq!(stored.len(), added);
        assert!(stored.iter().all(|s| s == &t));
    }

    #[test]
    fn test_oversized_tuple_rejected() {
        let mut page = Page::new();
        let t = tuple(&"x".repeat(DATA_SIZE));
        assert!(!page.add_tuple(&t));
        assert_eq!(page.ntuples(), 0);
        // Exactly at capacity still fits.
        let t = tuple(&"x".repeat(DATA_SIZE - 1));
        assert!(page.add_tuple(&t));
        assert_eq!(page.free_space(), 0);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut pf = PageFile::create(&dir.path().join("t.data")).unwrap();

        assert_eq!(pf.append_page().unwrap(), 0);
        assert_eq!(pf.append_page().unwrap(), 1);
        assert_eq!(pf.append_page().unwrap(), 2);

        let mut page = Page::new();
        assert!(page.add_tuple(&tuple("alpha,bravo")));
        assert!(page.add_tuple(&tuple("charlie,delta")));
        page.set_ovflow(7);
        pf.write_page(1, &page).unwrap();

        let read = pf.read_page(1).unwrap();
        assert_eq!(read, page);
        assert_eq!(read.ovflow(), 7);
        assert_eq!(
            read.tuples().unwrap(),
            vec![tuple("alpha,bravo"), tuple("charlie,delta")]
        );

        // Neighboring pages are untouched.
        assert_eq!(pf.read_page(0).unwrap(), Page::new());
        assert_eq!(pf.read_page(2).unwrap(), Page::new());
    }

    #[test]
    fn test_decode_rejects_bad_header() {
        let mut buf = [0u8; PAGE_SIZE];
        {
            let mut header: &mut [u8] = &mut buf[..HEADER_SIZE];
            // free cursor past the data area
            header.write_u32::<NativeEndian>(0).unwrap();
            header
                .write_u32::<NativeEndian>(DATA_SIZE as u32 + 1)
                .unwrap();
            header.write_u32::<NativeEndian>(NO_PAGE).unwrap();
        }
        assert!(matches!(Page::decode(&buf), Err(Error::InvalidData(_))));

        {
            let mut header: &mut [u8] = &mut buf[..HEADER_SIZE];
            // more tuples than the free cursor can hold
            header.write_u32::<NativeEndian>(10).unwrap();
            header.write_u32::<NativeEndian>(4).unwrap();
            header.write_u32::<NativeEndian>(NO_PAGE).unwrap();
        }
        assert!(matches!(Page::decode(&buf), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_tuples_rejects_truncated_run() {
        let mut page = Page::new();
        assert!(page.add_tuple(&tuple("alpha,bravo")));
        // Claim one more tuple than the run holds.
        page.ntuples += 1;
        assert!(matches!(page.tuples(), Err(Error::InvalidData(_))));
    }
}
