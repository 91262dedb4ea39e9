//! Second-difference reconstruction: turns a Huffman-decoded
//! `ENCODING_SECOND_DIFF` stream back into sample values. The first two
//! inputs prime the accumulator rather than being genuine second
//! differences; see DESIGN.md for the rationale behind following the
//! original priming convention exactly.

/// A running accumulator, one value (`d2`) fed in at a time via
/// [`SecondDiffReconstructor::push`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SecondDiffReconstructor {
    previous_val: Option<i32>,
    previous_diff1: Option<i32>,
}

impl SecondDiffReconstructor {
    pub fn new() -> Self {
        SecondDiffReconstructor::default()
    }

    /// Feed one second-difference value, returning the reconstructed sample.
    pub fn push(&mut self, d2: i32) -> i32 {
        let Some(previous_val) = self.previous_val else {
            self.previous_val = Some(d2);
            return d2;
        };
        let Some(previous_diff1) = self.previous_diff1 else {
            self.previous_diff1 = Some(d2 - previous_val);
            self.previous_val = Some(d2);
            return d2;
        };
        let diff1 = previous_diff1 + d2;
        let val = previous_val + diff1;
        self.previous_val = Some(val);
        self.previous_diff1 = Some(diff1);
        val
    }
}
