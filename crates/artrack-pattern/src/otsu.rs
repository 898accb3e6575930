//! Otsu binarization of small sample sets.

/// Grey level `t` maximizing the between-class variance of `{v <= t}` and
/// `{v > t}`.
///
/// Flat inputs return their single value; inputs with only two distinct
/// levels split halfway between them.
pub fn otsu_threshold(samples: &[u8]) -> u8 {
    let Some((&first, rest)) = samples.split_first() else {
        return 127;
    };

    let mut hist = [0u32; 256];
    let (mut lo, mut hi) = (first, first);
    hist[first as usize] += 1;
    for &v in rest {
        hist[v as usize] += 1;
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if lo == hi {
        return lo;
    }
    let levels = hist[lo as usize..=hi as usize]
        .iter()
        .filter(|&&h| h > 0)
        .count();
    if levels == 2 {
        return ((lo as u16 + hi as u16) / 2) as u8;
    }

    let total = samples.len() as u64;
    let sum_all: u64 = hist
        .iter()
        .enumerate()
        .map(|(v, &h)| v as u64 * h as u64)
        .sum();

    let (mut w_lo, mut sum_lo) = (0u64, 0u64);
    let mut best = (lo, -1.0f64);
    for t in lo..hi {
        let h = hist[t as usize] as u64;
        w_lo += h;
        sum_lo += t as u64 * h;
        let w_hi = total - w_lo;
        if w_lo == 0 || w_hi == 0 {
            continue;
        }
        let mean_lo = sum_lo as f64 / w_lo as f64;
        let mean_hi = (sum_all - sum_lo) as f64 / w_hi as f64;
        let d = mean_hi - mean_lo;
        let between = w_lo as f64 * w_hi as f64 * d * d;
        if between > best.1 {
            best = (t, between);
        }
    }
    best.0
}

/// Pack `samples` into a row-major bit code, dark (`<= threshold`) = 1.
pub fn binarize(samples: &[u8], threshold: u8) -> u64 {
    samples
        .iter()
        .enumerate()
        .filter(|(_, &v)| v <= threshold)
        .fold(0u64, |code, (i, _)| code | (1u64 << i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bimodal_samples_split_between_modes() {
        let mut s = vec![20u8, 22, 25, 30, 18];
        s.extend([200u8, 210, 190, 220, 205, 215]);
        let t = otsu_threshold(&s);
        assert!((30..190).contains(&t), "t={t}");
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(otsu_threshold(&[]), 127);
        assert_eq!(otsu_threshold(&[77, 77, 77]), 77);
        assert_eq!(otsu_threshold(&[10, 250, 10]), 130);
    }

    #[test]
    fn binarize_marks_dark_bits() {
        assert_eq!(binarize(&[0, 255, 10, 200], 100), 0b0101);
    }
}
