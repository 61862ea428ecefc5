//! Shannon entropy of a byte sample.
//!
//! A sample read at the correct baudrate is usually structured text and
//! scores low; a mismatched rate yields framing garbage whose byte
//! distribution flattens out and scores high, approaching 8 bits.

/// Shannon entropy of `sample` in bits per byte, in `[0, 8]`.
///
/// An empty sample scores 0.0; callers only score completed samples.
pub fn shannon_entropy(sample: &[u8]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }

    let mut counts = [0u32; 256];
    for &b in sample {
        counts[b as usize] += 1;
    }

    let len = sample.len() as f64;
    let weighted: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = f64::from(c) / len;
            p * p.log2()
        })
        .sum();

    // `0.0 - x` rather than `-x`: a single-valued sample sums to +0.0 and
    // plain negation would turn it into -0.0, which formats as "-0.000".
    0.0 - weighted
}
