//! Packed 12-bit complex samples (`sc12_item32_le`, `sc12_item32_be`)
//!
//! Three 32-bit words carry four complex samples. Each component is 12 bits
//! and samples straddle word boundaries:
//!
//! ```text
//!  31                                  0
//! |  I0 (12) |  Q0 (12) | I1[11:4] (8) |  word 0
//! | I1[3:0] |  Q1 (12) |  I2 (12) | Q2[11:8] |  word 1
//! | Q2[7:0] (8) |  I3 (12) |  Q3 (12)  |  word 2
//! ```
//!
//! Unpacking places each field in the high 12 bits of a 16-bit lane, which
//! sign-extends it for free but scales it by 16. The unpacking converter
//! divides its scalar by 16 to compensate.
//!
//! A call may start or end in the middle of a block. The head block is
//! decoded whole and the samples before the start are dropped; the tail
//! block is decoded whole and only the requested samples are written. Words
//! of a partial block that lie past the end of the input read as zero, so a
//! short final packet never faults.

use std::marker::PhantomData;

use super::{
    round_saturate, BigEndian, ConvertId, ConvertRegistry, Converter, FloatSample, InputBuffer,
    LittleEndian, OutputBuffer, WireOrder, PRIORITY_GENERAL,
};

/// Samples per packed block
pub const SAMPLES_PER_BLOCK: usize = 4;
/// Bytes per packed block (three words)
pub const BLOCK_BYTES: usize = 12;
/// Bytes per sample on the wire
pub const BYTES_PER_ITEM: usize = 3;

/// Unpacked lanes are the 12-bit value shifted left by four
const UNPACK_GROWTH: f64 = 16.0;

/// Decode one block into 16-bit lanes, `[i, q]` per sample.
///
/// The returned values are the 12-bit fields sign-extended into the high
/// bits of an `i16`, i.e. `field << 4`.
#[inline(always)]
pub fn unpack_block(line0: u32, line1: u32, line2: u32) -> [[i16; 2]; SAMPLES_PER_BLOCK] {
    let line01 = ((line0 as u64) << 32) | line1 as u64;
    let line12 = ((line1 as u64) << 32) | line2 as u64;

    let i0 = ((line0 >> 16) & 0xfff0) as u16 as i16;
    let q0 = ((line0 >> 4) & 0xfff0) as u16 as i16;

    let i1 = ((line01 >> 24) & 0xfff0) as u16 as i16;
    let q1 = ((line1 >> 12) & 0xfff0) as u16 as i16;

    let i2 = (line1 & 0xfff0) as u16 as i16;
    let q2 = ((line12 >> 20) & 0xfff0) as u16 as i16;

    let i3 = ((line2 >> 8) & 0xfff0) as u16 as i16;
    let q3 = ((line2 << 4) & 0xfff0) as u16 as i16;

    [[i0, q0], [i1, q1], [i2, q2], [i3, q3]]
}

/// Encode four samples of signed 12-bit components into three words
#[inline(always)]
pub fn pack_block(samples: &[[i16; 2]; SAMPLES_PER_BLOCK]) -> [u32; 3] {
    let f = |v: i16| (v as u16 as u32) & 0xfff;
    let [[i0, q0], [i1, q1], [i2, q2], [i3, q3]] = *samples;

    let line0 = (f(i0) << 20) | (f(q0) << 8) | (f(i1) >> 4);
    let line1 = ((f(i1) & 0xf) << 28) | (f(q1) << 16) | (f(i2) << 4) | (f(q2) >> 8);
    let line2 = ((f(q2) & 0xff) << 24) | (f(i3) << 12) | f(q3);

    [line0, line1, line2]
}

/// Read a word, treating bytes past the end of `data` as zero
#[inline]
fn read_word_lenient<O: WireOrder>(data: &[u8], byte: usize) -> u32 {
    let mut word = [0u8; 4];
    if let Some(avail) = data.get(byte..) {
        let n = avail.len().min(4);
        word[..n].copy_from_slice(&avail[..n]);
    }
    O::to_host(word)
}

#[inline]
fn read_block_lenient<O: WireOrder>(data: &[u8], block: usize) -> [u32; 3] {
    let base = block * BLOCK_BYTES;
    [
        read_word_lenient::<O>(data, base),
        read_word_lenient::<O>(data, base + 4),
        read_word_lenient::<O>(data, base + 8),
    ]
}

/// sc12_item32 -> fc32 / fc64
pub struct Sc12ToFloat<F, O> {
    scalar: f64,
    _marker: PhantomData<fn() -> (F, O)>,
}

impl<F: FloatSample, O: WireOrder> Sc12ToFloat<F, O> {
    pub fn new() -> Self {
        Self { scalar: 0.0, _marker: PhantomData }
    }

    #[inline(always)]
    fn store(&self, lanes: [i16; 2], out: &mut [u8]) {
        F::store(lanes[0] as f64 * self.scalar, &mut out[..F::BYTES]);
        F::store(lanes[1] as f64 * self.scalar, &mut out[F::BYTES..F::BYTES * 2]);
    }
}

impl<F: FloatSample, O: WireOrder> Default for Sc12ToFloat<F, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FloatSample, O: WireOrder> Converter for Sc12ToFloat<F, O> {
    fn set_scalar(&mut self, scalar: f64) {
        self.scalar = scalar / UNPACK_GROWTH;
    }

    fn convert(&mut self, inputs: &[InputBuffer<'_>], outputs: &mut [OutputBuffer<'_>], nsamps: usize) {
        if nsamps == 0 {
            return;
        }
        let input = &inputs[0];
        let data = input.data();
        let sample_bytes = F::BYTES * 2;

        let out_offset = outputs[0].offset();
        let out_start = out_offset * sample_bytes;
        let dst = &mut outputs[0].data()[out_start..out_start + nsamps * sample_bytes];

        let mut block = input.offset() / SAMPLES_PER_BLOCK;
        let head = input.offset() % SAMPLES_PER_BLOCK;
        let mut o = 0;

        // head: rewind to the enclosing block, keep samples from `head` on
        if head != 0 {
            let [l0, l1, l2] = read_block_lenient::<O>(data, block);
            let lanes = unpack_block(l0, l1, l2);
            for lane in lanes.iter().skip(head).take(nsamps) {
                self.store(*lane, &mut dst[o * sample_bytes..]);
                o += 1;
            }
            block += 1;
        }

        // body: whole blocks
        let body_blocks = (nsamps - o) / SAMPLES_PER_BLOCK;
        if body_blocks > 0 {
            let start = block * BLOCK_BYTES;
            let src = &data[start..start + body_blocks * BLOCK_BYTES];
            let out = &mut dst[o * sample_bytes..(o + body_blocks * SAMPLES_PER_BLOCK) * sample_bytes];
            for (words, samples) in src
                .chunks_exact(BLOCK_BYTES)
                .zip(out.chunks_exact_mut(SAMPLES_PER_BLOCK * sample_bytes))
            {
                let lanes = unpack_block(
                    O::to_host([words[0], words[1], words[2], words[3]]),
                    O::to_host([words[4], words[5], words[6], words[7]]),
                    O::to_host([words[8], words[9], words[10], words[11]]),
                );
                for (lane, out) in lanes.iter().zip(samples.chunks_exact_mut(sample_bytes)) {
                    self.store(*lane, out);
                }
            }
            block += body_blocks;
            o += body_blocks * SAMPLES_PER_BLOCK;
        }

        // tail: partial block, only the requested samples are written
        if o < nsamps {
            let [l0, l1, l2] = read_block_lenient::<O>(data, block);
            let lanes = unpack_block(l0, l1, l2);
            for lane in lanes.iter().take(nsamps - o) {
                self.store(*lane, &mut dst[o * sample_bytes..]);
                o += 1;
            }
        }
    }
}

/// fc32 / fc64 -> sc12_item32, rounding and saturating to 12 bits.
///
/// Partial blocks are read, patched and written back so neighbouring samples
/// already in the output survive. Words of a partial block past the end of
/// the output are skipped.
pub struct FloatToSc12<F, O> {
    scalar: f64,
    _marker: PhantomData<fn() -> (F, O)>,
}

impl<F: FloatSample, O: WireOrder> FloatToSc12<F, O> {
    pub fn new() -> Self {
        Self { scalar: 0.0, _marker: PhantomData }
    }

    #[inline(always)]
    fn load(&self, sample: &[u8]) -> [i16; 2] {
        [
            round_saturate(F::load(&sample[..F::BYTES]) * self.scalar, 12) as i16,
            round_saturate(F::load(&sample[F::BYTES..F::BYTES * 2]) * self.scalar, 12) as i16,
        ]
    }

    /// Merge samples into block `block` at positions `first..first + n`
    fn patch_block(&self, out: &mut [u8], block: usize, first: usize, src: &[u8]) {
        let sample_bytes = F::BYTES * 2;
        let [l0, l1, l2] = read_block_lenient::<O>(out, block);
        let mut lanes = unpack_block(l0, l1, l2);
        for lane in lanes.iter_mut() {
            // back to 12-bit values
            lane[0] >>= 4;
            lane[1] >>= 4;
        }
        for (k, sample) in src.chunks_exact(sample_bytes).enumerate() {
            lanes[first + k] = self.load(sample);
        }

        let base = block * BLOCK_BYTES;
        for (w, word) in pack_block(&lanes).iter().enumerate() {
            if let Some(dst) = out.get_mut(base + w * 4..base + w * 4 + 4) {
                dst.copy_from_slice(&O::to_wire(*word));
            }
        }
    }
}

impl<F: FloatSample, O: WireOrder> Default for FloatToSc12<F, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FloatSample, O: WireOrder> Converter for FloatToSc12<F, O> {
    fn set_scalar(&mut self, scalar: f64) {
        self.scalar = scalar;
    }

    fn convert(&mut self, inputs: &[InputBuffer<'_>], outputs: &mut [OutputBuffer<'_>], nsamps: usize) {
        if nsamps == 0 {
            return;
        }
        let sample_bytes = F::BYTES * 2;
        let input = &inputs[0];
        let in_start = input.offset() * sample_bytes;
        let src = &input.data()[in_start..in_start + nsamps * sample_bytes];

        let out_offset = outputs[0].offset();
        let out = outputs[0].data();

        let mut block = out_offset / SAMPLES_PER_BLOCK;
        let head = out_offset % SAMPLES_PER_BLOCK;
        let mut i = 0;

        if head != 0 {
            let n = (SAMPLES_PER_BLOCK - head).min(nsamps);
            self.patch_block(out, block, head, &src[..n * sample_bytes]);
            i += n;
            block += 1;
        }

        let body_blocks = (nsamps - i) / SAMPLES_PER_BLOCK;
        if body_blocks > 0 {
            let start = block * BLOCK_BYTES;
            let dst = &mut out[start..start + body_blocks * BLOCK_BYTES];
            let body_src = &src[i * sample_bytes..(i + body_blocks * SAMPLES_PER_BLOCK) * sample_bytes];
            for (samples, words) in body_src
                .chunks_exact(SAMPLES_PER_BLOCK * sample_bytes)
                .zip(dst.chunks_exact_mut(BLOCK_BYTES))
            {
                let mut lanes = [[0i16; 2]; SAMPLES_PER_BLOCK];
                for (lane, sample) in lanes.iter_mut().zip(samples.chunks_exact(sample_bytes)) {
                    *lane = self.load(sample);
                }
                for (w, word) in pack_block(&lanes).iter().enumerate() {
                    words[w * 4..w * 4 + 4].copy_from_slice(&O::to_wire(*word));
                }
            }
            block += body_blocks;
            i += body_blocks * SAMPLES_PER_BLOCK;
        }

        if i < nsamps {
            self.patch_block(out, block, 0, &src[i * sample_bytes..]);
        }
    }
}

fn register_order<O: WireOrder>(registry: &ConvertRegistry) {
    let otw = super::item32_format("sc12", O::ORDER);

    registry.register_converter(
        ConvertId::single(&otw, "fc32"),
        || Box::new(Sc12ToFloat::<f32, O>::new()),
        PRIORITY_GENERAL,
    );
    registry.register_converter(
        ConvertId::single(&otw, "fc64"),
        || Box::new(Sc12ToFloat::<f64, O>::new()),
        PRIORITY_GENERAL,
    );
    registry.register_converter(
        ConvertId::single("fc32", &otw),
        || Box::new(FloatToSc12::<f32, O>::new()),
        PRIORITY_GENERAL,
    );
    registry.register_converter(
        ConvertId::single("fc64", &otw),
        || Box::new(FloatToSc12::<f64, O>::new()),
        PRIORITY_GENERAL,
    );
}

/// Register the sc12 item size and converters for both byte orders
pub(crate) fn register(registry: &ConvertRegistry) {
    registry.register_bytes_per_item("sc12", BYTES_PER_ITEM);
    register_order::<LittleEndian>(registry);
    register_order::<BigEndian>(registry);
}
