//! Fixed-width base-36 ranks. Equal width makes byte order match numeric
//! order, so rank columns sort correctly as plain text.

pub const WIDTH: usize = 16;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const BASE: u128 = 36;
/// 36^16; every rank value is strictly between 0 and `MAX`.
const SPACE: u128 = 7_958_661_109_946_400_884_391_936;
const MAX: u128 = SPACE - 1;
/// Distance between consecutive appended ranks.
const STEP: u128 = 2_821_109_907_456; // 36^8

fn value(rank: &str) -> Option<u128> {
    if rank.len() != WIDTH {
        return None;
    }
    rank.bytes().try_fold(0u128, |acc, b| {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'z' => b - b'a' + 10,
            _ => return None,
        };
        Some(acc * BASE + u128::from(digit))
    })
}

fn format(mut n: u128) -> String {
    let mut out = [b'0'; WIDTH];
    for slot in out.iter_mut().rev() {
        *slot = DIGITS[(n % BASE) as usize];
        n /= BASE;
    }
    out.iter().map(|&b| char::from(b)).collect()
}

fn bounds(prev: Option<&str>, next: Option<&str>) -> Option<(u128, u128)> {
    let lo = match prev {
        Some(rank) => value(rank)?,
        None => 0,
    };
    let hi = match next {
        Some(rank) => value(rank)?,
        None => MAX,
    };
    Some((lo, hi))
}

/// A rank strictly between `prev` and `next`; `None` stands for the open
/// end on either side. Returns `None` when the two are adjacent or either
/// rank is malformed, in which case the caller re-ranks.
pub fn between(prev: Option<&str>, next: Option<&str>) -> Option<String> {
    let (lo, hi) = bounds(prev, next)?;
    if hi <= lo + 1 {
        return None;
    }
    let mut mid = lo + (hi - lo) / 2;
    if mid == lo {
        mid += 1;
    } else if mid == hi {
        mid -= 1;
    }
    Some(format(mid))
}

pub fn first() -> String {
    format(MAX / 2)
}

/// Rank for an item appended after `prev`.
pub fn after(prev: Option<&str>) -> Option<String> {
    let Some(prev) = prev else {
        return Some(first());
    };
    let lo = value(prev)?;
    if MAX - lo > 2 * STEP {
        Some(format(lo + STEP))
    } else {
        between(Some(prev), None)
    }
}

/// `n` evenly spaced ranks covering the whole space.
pub fn spread(n: usize) -> Vec<String> {
    let gap = MAX / (n as u128 + 1);
    (1..=n as u128).map(|i| format(gap * i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_matches_width() {
        assert_eq!(BASE.pow(WIDTH as u32), SPACE);
        assert_eq!(BASE.pow(8), STEP);
        assert_eq!(format(MAX), "z".repeat(WIDTH));
        assert_eq!(value(&format(12345)), Some(12345));
    }

    #[test]
    fn between_is_strict_and_sorted() {
        let a = first();
        let b = between(Some(&a), None).unwrap();
        let c = between(Some(&a), Some(&b)).unwrap();
        let z = between(None, Some(&a)).unwrap();
        assert!(z < a && a < c && c < b);
        assert!([&a, &b, &c, &z].iter().all(|r| r.len() == WIDTH));
    }

    #[test]
    fn adjacent_ranks_are_exhausted() {
        let lo = format(41);
        let hi = format(42);
        assert_eq!(between(Some(&lo), Some(&hi)), None);
        assert_eq!(between(Some(&lo), Some(&format(43))), Some(format(42)));
        assert_eq!(between(Some("bogus"), None), None);
    }

    #[test]
    fn after_steps_and_falls_back_near_the_end() {
        let a = first();
        let b = after(Some(&a)).unwrap();
        assert_eq!(value(&b), value(&a).map(|v| v + STEP));
        let near_end = format(MAX - 3);
        let c = after(Some(&near_end)).unwrap();
        assert!(c > near_end);
        assert_eq!(after(Some(&format(MAX - 1))), None);
        assert_eq!(after(None), Some(first()));
    }

    #[test]
    fn spread_is_increasing() {
        let ranks = spread(5);
        assert_eq!(ranks.len(), 5);
        assert!(ranks.windows(2).all(|w| w[0] < w[1]));
        assert!(spread(0).is_empty());
    }
}
