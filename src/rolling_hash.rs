/// Adler-32 style weak checksum over a sliding window, used to find candidate
/// matches between a new block and windows of the old block.
///
/// `a` is the byte sum and `b` the sum of running `a` values, both mod 65521.
const MOD_ADLER: u32 = 65521;

#[derive(Debug, Clone)]
pub struct RollingHash {
    a: u32,
    b: u32,
    window_size: u32,
}

impl RollingHash {
    /// Checksum of `window`, ready to be rolled forward.
    pub fn over(window: &[u8]) -> Self {
        // Accumulate in u64 and reduce once at the end.
        let mut a: u64 = 1;
        let mut b: u64 = 0;
        for &byte in window {
            a += byte as u64;
            b += a;
        }
        Self {
            a: (a % MOD_ADLER as u64) as u32,
            b: (b % MOD_ADLER as u64) as u32,
            window_size: window.len() as u32,
        }
    }

    /// Slide the window one byte: drop `out` from the front, take `inc` at the back.
    pub fn roll(&mut self, out: u8, inc: u8) {
        let out = out as u32;
        let inc = inc as u32;
        let n = self.window_size % MOD_ADLER;

        self.a = (self.a + MOD_ADLER - out + inc) % MOD_ADLER;
        self.b = (self.b + MOD_ADLER - 1 + self.a + MOD_ADLER - (out * n) % MOD_ADLER) % MOD_ADLER;
    }

    pub fn digest(&self) -> u32 {
        (self.b << 16) | self.a
    }
}
