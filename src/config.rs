/// Parameters for creating a new relation.
#[derive(Debug, Clone)]
pub struct RelnConfig {
    /// Number of attributes per tuple (default: 2)
    pub nattrs: u32,

    /// Initial number of primary pages; must equal 2^depth (default: 1)
    pub npages: u32,

    /// Initial hash depth (default: 0)
    pub depth: u32,

    /// Choice vector in `att:bit,att:bit,…` syntax; trailing items are
    /// zero-filled (default: empty)
    pub chvec: String,
}

impl Default for RelnConfig {
    fn default() -> Self {
        Self {
            nattrs: 2,
            npages: 1,
            depth: 0,
            chvec: String::new(),
        }
    }
}

impl RelnConfig {
    /// Create a new config with the given schema width
    pub fn new(nattrs: u32) -> Self {
        Self {
            nattrs,
            ..Default::default()
        }
    }

    /// Set the initial primary-page count
    pub fn npages(mut self, npages: u32) -> Self {
        self.npages = npages;
        self
    }

    /// Set the initial hash depth
    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Set the choice vector
    pub fn chvec(mut self, chvec: impl Into<String>) -> Self {
        self.chvec = chvec.into();
        self
    }
}
