//! Pseudo-random IPv4 origin addresses for the NewBing `X-Forwarded-For` header.
//!
//! Selection is two-stage: a range is picked uniformly, then an address is
//! picked inside it. Small ranges are therefore over-represented. This is
//! not meant to be cryptographic or globally uniform.

use std::net::Ipv4Addr;

use rand::Rng;

use chatai_core::config::schema::IpRangeConfig;

/// Inclusive IPv4 range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    pub low: Ipv4Addr,
    pub high: Ipv4Addr,
}

impl AddressRange {
    pub const fn new(low: Ipv4Addr, high: Ipv4Addr) -> Self {
        Self { low, high }
    }

    /// Number of addresses in the range (0 when `low > high`).
    pub fn size(&self) -> u64 {
        let (low, high) = (u32::from(self.low) as u64, u32::from(self.high) as u64);
        if high < low {
            0
        } else {
            high - low + 1
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.low <= addr && addr <= self.high
    }
}

impl From<IpRangeConfig> for AddressRange {
    fn from(cfg: IpRangeConfig) -> Self {
        // Accept reversed bounds from hand-edited configs.
        if cfg.0 <= cfg.1 {
            Self::new(cfg.0, cfg.1)
        } else {
            Self::new(cfg.1, cfg.0)
        }
    }
}

const fn range(low: [u8; 4], high: [u8; 4]) -> AddressRange {
    AddressRange::new(
        Ipv4Addr::new(low[0], low[1], low[2], low[3]),
        Ipv4Addr::new(high[0], high[1], high[2], high[3]),
    )
}

/// Azure cloud blocks (EastUS2, JapanEast, NorthEurope, SouthCentralUS,
/// WestCentralUS, WestEurope).
pub const DEFAULT_RANGES: &[AddressRange] = &[
    // EastUS2
    range([4, 150, 64, 0], [4, 150, 127, 255]),
    range([4, 152, 0, 0], [4, 153, 255, 255]),
    range([13, 68, 0, 0], [13, 68, 127, 255]),
    range([13, 104, 216, 0], [13, 104, 216, 255]),
    range([20, 1, 128, 0], [20, 1, 255, 255]),
    range([20, 7, 0, 0], [20, 7, 255, 255]),
    range([20, 22, 0, 0], [20, 22, 255, 255]),
    range([40, 84, 0, 0], [40, 84, 127, 255]),
    range([40, 123, 0, 0], [40, 123, 127, 255]),
    // JapanEast
    range([4, 214, 0, 0], [4, 215, 255, 255]),
    range([4, 241, 0, 0], [4, 241, 255, 255]),
    range([40, 115, 128, 0], [40, 115, 255, 255]),
    range([52, 140, 192, 0], [52, 140, 255, 255]),
    range([104, 41, 160, 0], [104, 41, 191, 255]),
    range([138, 91, 0, 0], [138, 91, 15, 255]),
    range([151, 206, 65, 0], [151, 206, 79, 255]),
    range([191, 237, 240, 0], [191, 237, 241, 255]),
    // NorthEurope
    range([4, 208, 0, 0], [4, 209, 255, 255]),
    range([52, 169, 0, 0], [52, 169, 255, 255]),
    range([68, 219, 0, 0], [68, 219, 127, 255]),
    range([65, 52, 64, 0], [65, 52, 79, 255]),
    range([98, 71, 0, 0], [98, 71, 127, 255]),
    range([74, 234, 0, 0], [74, 234, 127, 255]),
    // SouthCentralUS
    range([4, 151, 0, 0], [4, 151, 255, 255]),
    range([13, 84, 0, 0], [13, 85, 255, 255]),
    // WestCentralUS
    range([4, 255, 128, 0], [4, 255, 255, 255]),
    range([13, 78, 128, 0], [13, 78, 255, 255]),
    // WestEurope
    range([4, 175, 0, 0], [4, 175, 255, 255]),
    range([13, 80, 0, 0], [13, 81, 255, 255]),
    range([20, 73, 0, 0], [20, 73, 255, 255]),
];

/// A fixed set of ranges to draw addresses from.
#[derive(Clone, Debug)]
pub struct IpPool {
    ranges: Vec<AddressRange>,
}

impl Default for IpPool {
    fn default() -> Self {
        Self {
            ranges: DEFAULT_RANGES.to_vec(),
        }
    }
}

impl IpPool {
    /// Build a pool; an empty (or all-empty) list falls back to [`DEFAULT_RANGES`].
    pub fn new(ranges: Vec<AddressRange>) -> Self {
        let ranges: Vec<_> = ranges.into_iter().filter(|r| r.size() > 0).collect();
        if ranges.is_empty() {
            Self::default()
        } else {
            Self { ranges }
        }
    }

    pub fn from_config(ranges: &[IpRangeConfig]) -> Self {
        Self::new(ranges.iter().copied().map(AddressRange::from).collect())
    }

    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    pub fn random_address(&self) -> Ipv4Addr {
        self.random_address_with(&mut rand::thread_rng())
    }

    pub fn random_address_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Ipv4Addr {
        let range = self.ranges[rng.gen_range(0..self.ranges.len())];
        let low = u32::from(range.low) as u64;
        let offset = rng.next_u32() as u64 % range.size();
        Ipv4Addr::from((low + offset) as u32)
    }
}
