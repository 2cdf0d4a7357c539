use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::{HarnessError, HarnessResult};

/// Selects test cases by numeric identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TestFilter {
    #[default]
    All,
    Ranges(Vec<RangeInclusive<u32>>),
}

impl TestFilter {
    pub fn matches(&self, id: u32) -> bool {
        match self {
            TestFilter::All => true,
            TestFilter::Ranges(ranges) => ranges.iter().any(|range| range.contains(&id)),
        }
    }

    /// Keep the matching items, in their original order.
    pub fn apply<T>(&self, items: Vec<T>, id_of: impl Fn(&T) -> u32) -> Vec<T> {
        items.into_iter().filter(|item| self.matches(id_of(item))).collect()
    }
}

impl FromStr for TestFilter {
    type Err = HarnessError;

    /// `all`, or whitespace-separated `a-b` / `n` items.
    fn from_str(text: &str) -> HarnessResult<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("all") {
            return Ok(TestFilter::All);
        }

        let ranges = text
            .split_whitespace()
            .map(parse_range)
            .collect::<HarnessResult<Vec<_>>>()?;
        if ranges.is_empty() {
            return Err(HarnessError::config("test filter is empty"));
        }
        Ok(TestFilter::Ranges(ranges))
    }
}

fn parse_range(item: &str) -> HarnessResult<RangeInclusive<u32>> {
    let bound = |text: &str| {
        text.parse::<u32>().map_err(|_| {
            HarnessError::config(format!("invalid test filter item `{item}`"))
        })
    };

    let (start, end) = match item.split_once('-') {
        Some((start, end)) => (bound(start)?, bound(end)?),
        None => {
            let single = bound(item)?;
            (single, single)
        }
    };
    if start > end {
        return Err(HarnessError::config(format!(
            "test filter range `{item}` is reversed"
        )));
    }
    Ok(start..=end)
}

impl fmt::Display for TestFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestFilter::All => f.write_str("all"),
            TestFilter::Ranges(ranges) => {
                for (index, range) in ranges.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    if range.start() == range.end() {
                        write!(f, "{}", range.start())?;
                    } else {
                        write!(f, "{}-{}", range.start(), range.end())?;
                    }
                }
                Ok(())
            }
        }
    }
}
