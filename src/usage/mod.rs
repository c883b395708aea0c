//! Address lookups and memory usage arithmetic over memory regions and map
//! sections.

use crate::addr::Range;
use crate::parse::{LiteralError, MemoryRegion, SectionRecord, parse_literal};
use std::fmt;
use thiserror::Error;

//===========================================================================//

/// Something that occupies a named range of addresses.
pub trait Extent {
    /// Returns the item's name.
    fn name(&self) -> &str;

    /// Returns the addresses the item occupies.
    fn range(&self) -> Range;
}

impl Extent for MemoryRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn range(&self) -> Range {
        MemoryRegion::range(self)
    }
}

impl Extent for SectionRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn range(&self) -> Range {
        Range::with_len(self.address, self.size)
            .unwrap_or_else(|| Range::with_bounds(self.address, u64::MAX))
    }
}

//===========================================================================//

/// An index over a list of extents, answering which of them contains a given
/// address.  Where extents overlap, the one declared first wins.
pub struct AddressIndex<'a, T> {
    items: &'a [T],
    /// Positions into `items`, sorted by start address and then by
    /// declaration order.
    by_start: Vec<usize>,
}

impl<'a, T: Extent> AddressIndex<'a, T> {
    /// Builds an index over `items`, which are kept in declaration order.
    pub fn new(items: &'a [T]) -> AddressIndex<'a, T> {
        let mut by_start: Vec<usize> = (0..items.len()).collect();
        by_start.sort_by_key(|&position| {
            (items[position].range().start(), position)
        });
        AddressIndex { items, by_start }
    }

    /// Returns the indexed items, in declaration order.
    pub fn items(&self) -> &'a [T] {
        self.items
    }

    /// Returns the declaration position of the first-declared item that
    /// contains `address`.
    pub fn position_containing(&self, address: u64) -> Option<usize> {
        let candidates = self.by_start.partition_point(|&position| {
            self.items[position].range().start() <= address
        });
        self.by_start[..candidates]
            .iter()
            .copied()
            .filter(|&position| self.items[position].range().contains(address))
            .min()
    }

    /// Returns the first-declared item that contains `address`.
    pub fn containing(&self, address: u64) -> Option<&'a T> {
        let items = self.items;
        self.position_containing(address).map(|position| &items[position])
    }

    /// Returns the items whose name matches `name`, ignoring ASCII case.
    pub fn named<'s>(
        &'s self,
        name: &'s str,
    ) -> impl Iterator<Item = &'a T> + 's {
        self.items
            .iter()
            .filter(move |item| item.name().eq_ignore_ascii_case(name))
    }

    /// Returns the combined length of the items whose name matches `name`,
    /// ignoring ASCII case.
    pub fn total_length(&self, name: &str) -> u64 {
        self.named(name)
            .fold(0u64, |total, item| total.saturating_add(item.range().len()))
    }

    /// Returns every pair of items that share at least one address, each
    /// pair ordered by declaration.
    pub fn overlaps(&self) -> Vec<(&'a T, &'a T)> {
        let mut pairs = Vec::new();
        for (index, &first) in self.by_start.iter().enumerate() {
            let range = self.items[first].range();
            for &second in &self.by_start[index + 1..] {
                let other = self.items[second].range();
                if other.start() >= range.end() {
                    break;
                }
                if range.overlaps(other) {
                    let (a, b) = (first.min(second), first.max(second));
                    pairs.push((&self.items[a], &self.items[b]));
                }
            }
        }
        pairs
    }
}

//===========================================================================//

/// A percentage with two decimal places, stored as hundredths of a percent.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Percent(u64);

impl Percent {
    /// Returns `part` as a percentage of `whole`, rounded half up to the
    /// nearest hundredth.  A zero `whole` gives zero.
    pub fn of(part: u64, whole: u64) -> Percent {
        if whole == 0 {
            return Percent(0);
        }
        let (part, whole) = (u128::from(part), u128::from(whole));
        let hundredths = (part * 10_000 + whole / 2) / whole;
        Percent(u64::try_from(hundredths).unwrap_or(u64::MAX))
    }

    /// Returns the percentage in hundredths of a percent (`5000` is 50%).
    pub fn hundredths(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

//===========================================================================//

/// How much of some span of memory a number of bytes uses.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegionUsage {
    /// The name of the region (or memory type) measured.
    pub region: String,
    /// The address the measured span starts at.
    pub address: u64,
    /// The number of bytes in the measured span.
    pub available: u64,
    /// The number of bytes used.
    pub used: u64,
    /// The number of bytes left over.
    pub free: u64,
    /// `used` as a percentage of `available`.
    pub usage_percent: Percent,
}

impl RegionUsage {
    /// Measures `used` bytes against a span of `available` bytes.
    pub fn new(
        region: &str,
        address: u64,
        available: u64,
        used: u64,
    ) -> RegionUsage {
        RegionUsage {
            region: region.to_string(),
            address,
            available,
            used,
            free: available.saturating_sub(used),
            usage_percent: Percent::of(used, available),
        }
    }
}

impl fmt::Display for RegionUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ 0x{:08x}: {} used, {} free of {} ({}%)",
            self.region,
            self.address,
            self.used,
            self.free,
            self.available,
            self.usage_percent
        )
    }
}

//===========================================================================//

/// An error from a memory usage query.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum UsageError {
    /// The script declared no memory regions at all.
    #[error("no MEMORY section")]
    NoMemorySection,
    /// No declared region contains the address.
    #[error("address 0x{0:08x} is not inside any memory region")]
    AddressOutOfRange(u64),
    /// The budget doesn't fit between the address and the end of its region.
    #[error(
        "budget of {budget} bytes exceeds the {available} bytes left in \
         {region} from 0x{address:08x}"
    )]
    OverBudget {
        /// The region containing the address.
        region: String,
        /// The queried address.
        address: u64,
        /// The requested budget.
        budget: u64,
        /// The bytes from the address to the end of the region.
        available: u64,
    },
    /// The address text was not a numeric literal.
    #[error("invalid address `{text}`: {source}")]
    InvalidAddress {
        /// The address as given.
        text: String,
        /// Why it couldn't be evaluated.
        source: LiteralError,
    },
    /// No declared region has the requested name.
    #[error("no memory region named `{0}`")]
    UnknownMemoryType(String),
    /// The declared size of a memory type is larger than the budget.
    #[error(
        "declared {memory_type} size of {declared} bytes exceeds the budget \
         of {budget} bytes"
    )]
    DeclaredOverBudget {
        /// The requested memory type.
        memory_type: String,
        /// The combined length of the matching regions.
        declared: u64,
        /// The requested budget.
        budget: u64,
    },
}

/// Computes how much of the region containing `address` a `budget` of bytes
/// starting there would use.  The first declared region containing the
/// address is measured, from the address to the end of the region.
pub fn region_usage(
    regions: &[MemoryRegion],
    address: u64,
    budget: u64,
) -> Result<RegionUsage, UsageError> {
    if regions.is_empty() {
        return Err(UsageError::NoMemorySection);
    }
    let region = AddressIndex::new(regions)
        .containing(address)
        .ok_or(UsageError::AddressOutOfRange(address))?;
    let available = region
        .range()
        .remaining_from(address)
        .ok_or(UsageError::AddressOutOfRange(address))?;
    if budget > available {
        return Err(UsageError::OverBudget {
            region: region.name.clone(),
            address,
            budget,
            available,
        });
    }
    log::debug!("{budget} bytes at {address:#x} fall in {}", region.name);
    Ok(RegionUsage::new(&region.name, address, available, budget))
}

/// Like `region_usage`, but with the address given as literal text such as
/// `0x20000000` or `536870912`.
pub fn region_usage_str(
    regions: &[MemoryRegion],
    address: &str,
    budget: u64,
) -> Result<RegionUsage, UsageError> {
    let value = parse_literal(address).map_err(|source| {
        UsageError::InvalidAddress { text: address.to_string(), source }
    })?;
    region_usage(regions, value, budget)
}

/// Measures the combined declared size of every region named `memory_type`
/// (ignoring case) against a `budget` of bytes.
pub fn declared_usage(
    regions: &[MemoryRegion],
    memory_type: &str,
    budget: u64,
) -> Result<RegionUsage, UsageError> {
    if regions.is_empty() {
        return Err(UsageError::NoMemorySection);
    }
    let index = AddressIndex::new(regions);
    let first = index
        .named(memory_type)
        .next()
        .ok_or_else(|| UsageError::UnknownMemoryType(memory_type.to_string()))?;
    let declared = index.total_length(memory_type);
    if declared > budget {
        return Err(UsageError::DeclaredOverBudget {
            memory_type: memory_type.to_string(),
            declared,
            budget,
        });
    }
    Ok(RegionUsage::new(memory_type, first.origin, budget, declared))
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::{
        AddressIndex, Percent, RegionUsage, UsageError, declared_usage,
        region_usage, region_usage_str,
    };
    use crate::parse::{LiteralError, MemoryRegion, SectionRecord};

    fn region(name: &str, origin: u64, length: u64) -> MemoryRegion {
        MemoryRegion {
            name: name.to_string(),
            access_attributes: None,
            origin,
            length,
        }
    }

    fn stm32() -> Vec<MemoryRegion> {
        vec![
            region("RAM", 0x2000_0000, 0x2_0000),
            region("FLASH", 0x0800_0000, 0x8_0000),
        ]
    }

    #[test]
    fn half_of_ram() {
        let usage = region_usage(&stm32(), 0x2000_0000, 65536).unwrap();
        assert_eq!(usage.region, "RAM");
        assert_eq!(usage.used, 65536);
        assert_eq!(usage.free, 65536);
        assert_eq!(usage.usage_percent.to_string(), "50.00");
    }

    #[test]
    fn usage_measures_from_address() {
        let usage = region_usage(&stm32(), 0x0807_0000, 0x4000).unwrap();
        assert_eq!(usage.region, "FLASH");
        assert_eq!(usage.available, 0x1_0000);
        assert_eq!(usage.free, 0xC000);
        assert_eq!(usage.usage_percent.to_string(), "25.00");
        assert_eq!(
            usage.to_string(),
            "FLASH @ 0x08070000: 16384 used, 49152 free of 65536 (25.00%)"
        );
    }

    #[test]
    fn usage_errors() {
        assert_eq!(
            region_usage(&[], 0x2000_0000, 1),
            Err(UsageError::NoMemorySection)
        );
        assert_eq!(
            region_usage(&stm32(), 0x1000_0000, 1),
            Err(UsageError::AddressOutOfRange(0x1000_0000))
        );
        assert_eq!(
            region_usage(&stm32(), 0x2002_0000, 0),
            Err(UsageError::AddressOutOfRange(0x2002_0000))
        );
        let error = region_usage(&stm32(), 0x2001_ffff, 2).unwrap_err();
        assert_eq!(
            error,
            UsageError::OverBudget {
                region: "RAM".to_string(),
                address: 0x2001_ffff,
                budget: 2,
                available: 1,
            }
        );
        assert_eq!(
            error.to_string(),
            "budget of 2 bytes exceeds the 1 bytes left in RAM from 0x2001ffff"
        );
    }

    #[test]
    fn usage_from_text() {
        let usage = region_usage_str(&stm32(), "0x20000000", 65536).unwrap();
        assert_eq!(usage.usage_percent.hundredths(), 5000);
        let usage = region_usage_str(&stm32(), "536870912", 65536).unwrap();
        assert_eq!(usage.region, "RAM");
        assert_eq!(
            region_usage_str(&stm32(), "RAM", 1),
            Err(UsageError::InvalidAddress {
                text: "RAM".to_string(),
                source: LiteralError::NotALiteral,
            })
        );
    }

    #[test]
    fn first_declared_region_wins() {
        let regions = vec![
            region("CCM", 0x2001_0000, 0x1_0000),
            region("RAM", 0x2000_0000, 0x2_0000),
        ];
        let index = AddressIndex::new(&regions);
        let name = |address| index.containing(address).map(|r| &r.name[..]);
        assert_eq!(name(0x2000_0000), Some("RAM"));
        assert_eq!(name(0x2001_0000), Some("CCM"));
        assert_eq!(name(0x2001_ffff), Some("CCM"));
        assert_eq!(name(0x2002_0000), None);
        let overlaps = index.overlaps();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].0.name, "CCM");
        assert_eq!(overlaps[0].1.name, "RAM");
    }

    #[test]
    fn disjoint_regions_do_not_overlap() {
        let regions = stm32();
        assert!(AddressIndex::new(&regions).overlaps().is_empty());
    }

    #[test]
    fn sections_as_extents() {
        let sections = vec![
            SectionRecord {
                name: ".text".to_string(),
                address: 0x0800_0000,
                size: 0x100,
                load_address: None,
            },
            SectionRecord {
                name: ".data".to_string(),
                address: 0x2000_0000,
                size: 0x10,
                load_address: Some(0x0800_0100),
            },
        ];
        let index = AddressIndex::new(&sections);
        assert_eq!(
            index.containing(0x0800_00ff).map(|s| s.name.as_str()),
            Some(".text")
        );
        assert!(index.containing(0x0800_0100).is_none());
        assert_eq!(index.items().len(), 2);
    }

    #[test]
    fn names_match_case_insensitively() {
        let regions = vec![
            region("RAM", 0x2000_0000, 0x1_0000),
            region("FLASH", 0x0800_0000, 0x8_0000),
            region("ram", 0x2001_0000, 0x1_0000),
        ];
        let index = AddressIndex::new(&regions);
        assert_eq!(index.named("Ram").count(), 2);
        assert_eq!(index.total_length("RAM"), 0x2_0000);
        assert_eq!(index.total_length("SRAM"), 0);
    }

    #[test]
    fn declared_usage_of_memory_type() {
        let usage = declared_usage(&stm32(), "flash", 1024 * 1024).unwrap();
        assert_eq!(usage.region, "flash");
        assert_eq!(usage.address, 0x0800_0000);
        assert_eq!(usage.used, 0x8_0000);
        assert_eq!(usage.free, 0x8_0000);
        assert_eq!(usage.usage_percent.to_string(), "50.00");
        assert_eq!(
            declared_usage(&stm32(), "EEPROM", 1),
            Err(UsageError::UnknownMemoryType("EEPROM".to_string()))
        );
        assert!(matches!(
            declared_usage(&stm32(), "RAM", 1024),
            Err(UsageError::DeclaredOverBudget { declared: 0x2_0000, .. })
        ));
        assert_eq!(
            declared_usage(&[], "RAM", 1),
            Err(UsageError::NoMemorySection)
        );
    }

    #[test]
    fn percent_rounding() {
        assert_eq!(Percent::of(1, 3).to_string(), "33.33");
        assert_eq!(Percent::of(2, 3).to_string(), "66.67");
        assert_eq!(Percent::of(0, 10).to_string(), "0.00");
        assert_eq!(Percent::of(10, 10).to_string(), "100.00");
        assert_eq!(Percent::of(5, 0), Percent::default());
        assert_eq!(Percent::of(u64::MAX, u64::MAX).hundredths(), 10_000);
    }

    #[test]
    fn region_usage_saturates_free_space() {
        let usage = RegionUsage::new("RAM", 0, 10, 20);
        assert_eq!(usage.free, 0);
        assert_eq!(usage.usage_percent.to_string(), "200.00");
    }
}

//===========================================================================//
