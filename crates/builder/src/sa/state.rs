//! Build state and the null-tolerant word buffer
//!
//! A dry run (`SaBuffer::dry`) advances the cursor without writing;
//! a real run writes words. Sizing and emission share one code path,
//! which is the crate's central correctness mechanism.

use super::params::IvSrc;

/// Word buffer that tolerates being absent.
///
/// All write primitives are no-ops when the buffer is dry, so the
/// protocol builders never branch on dry/real themselves.
pub(crate) struct SaBuffer<'a> {
    words: Option<&'a mut [u32]>,
}

impl<'a> SaBuffer<'a> {
    pub(crate) fn real(words: &'a mut [u32]) -> Self {
        SaBuffer { words: Some(words) }
    }

    pub(crate) fn dry() -> Self {
        SaBuffer { words: None }
    }

    pub(crate) fn is_dry(&self) -> bool {
        self.words.is_none()
    }

    /// Store one word.
    pub(crate) fn write(&mut self, offset: usize, value: u32) {
        if let Some(words) = self.words.as_deref_mut() {
            words[offset] = value;
        }
    }

    /// OR bits into an already written word.
    pub(crate) fn merge(&mut self, offset: usize, bits: u32) {
        if let Some(words) = self.words.as_deref_mut() {
            words[offset] |= bits;
        }
    }

    /// Pack bytes little-endian into consecutive words starting at
    /// `offset`. A trailing partial word is zero-padded.
    pub(crate) fn copy_key_mat(&mut self, offset: usize, src: &[u8]) {
        let Some(words) = self.words.as_deref_mut() else {
            return;
        };
        let mut offset = offset;
        let mut chunks = src.chunks_exact(4);
        for chunk in &mut chunks {
            words[offset] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            offset += 1;
        }
        let rem = chunks.remainder();
        if !rem.is_empty() {
            let mut w = 0u32;
            for (i, b) in rem.iter().enumerate() {
                w |= u32::from(*b) << (8 * i);
            }
            words[offset] = w;
        }
    }

    /// As [`copy_key_mat`](Self::copy_key_mat), but byte-reversed within
    /// each word (big-endian word load; MAC subkeys need this).
    pub(crate) fn copy_key_mat_swap(&mut self, offset: usize, src: &[u8]) {
        let Some(words) = self.words.as_deref_mut() else {
            return;
        };
        let mut offset = offset;
        let mut chunks = src.chunks_exact(4);
        for chunk in &mut chunks {
            words[offset] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            offset += 1;
        }
        let rem = chunks.remainder();
        if !rem.is_empty() {
            let mut w = 0u32;
            for (i, b) in rem.iter().enumerate() {
                w |= u32::from(*b) << (24 - 8 * i);
            }
            words[offset] = w;
        }
    }

    /// Write `byte_count.div_ceil(4)` zero words starting at `offset`.
    pub(crate) fn zero_fill(&mut self, offset: usize, byte_count: usize) {
        if let Some(words) = self.words.as_deref_mut() {
            for w in words.iter_mut().skip(offset).take(byte_count.div_ceil(4)) {
                *w = 0;
            }
        }
    }
}

/// Ephemeral per-build state threaded through every builder pass.
///
/// Created fresh for each build, discarded afterwards. The cursor
/// starts at 2, past the two control words.
#[derive(Debug, Clone)]
pub(crate) struct SaState {
    /// Next free word offset in the record.
    pub cursor: usize,
    /// Accumulated control word 0 (topology, algorithms, sizes).
    pub cw0: u32,
    /// Accumulated control word 1 (modes, IV handling, pad type).
    pub cw1: u32,
    /// Words occupied by the cipher key.
    pub cipher_key_words: usize,
    /// Words the IV occupies for the selected cipher.
    pub iv_words: usize,
    /// Effective IV source after protocol defaulting.
    pub iv_src: IvSrc,
    /// ARC4 running state must be reserved after the SA proper.
    pub arc4_state: bool,
    /// Record must use the large layout.
    pub large: bool,
    /// Replay mask too wide for the in-word context-size field.
    pub large_mask: bool,
}

impl SaState {
    pub(crate) fn new() -> Self {
        SaState {
            cursor: 2,
            cw0: 0,
            cw1: 0,
            cipher_key_words: 0,
            iv_words: 0,
            iv_src: IvSrc::Default,
            arc4_state: false,
            large: false,
            large_mask: false,
        }
    }
}
