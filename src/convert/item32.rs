//! `sc16_item32` converters
//!
//! One complex 16-bit sample per 32-bit word, I in the upper half and Q in
//! the lower half, each word in wire byte order.

use std::marker::PhantomData;

use super::{
    round_saturate, BigEndian, ConvertId, ConvertRegistry, Converter, FloatSample, InputBuffer,
    LittleEndian, OutputBuffer, WireOrder, PRIORITY_GENERAL,
};

const ITEM_BYTES: usize = 4;
const HOST_SC16_BYTES: usize = 4;

#[inline(always)]
fn split_item(item: u32) -> (i16, i16) {
    ((item >> 16) as u16 as i16, item as u16 as i16)
}

#[inline(always)]
fn join_item(i: i16, q: i16) -> u32 {
    ((i as u16 as u32) << 16) | (q as u16 as u32)
}

/// sc16_item32 -> fc32 / fc64
pub struct Item32ToFloat<F, O> {
    scalar: f64,
    _marker: PhantomData<fn() -> (F, O)>,
}

impl<F: FloatSample, O: WireOrder> Item32ToFloat<F, O> {
    pub fn new() -> Self {
        Self { scalar: 1.0, _marker: PhantomData }
    }
}

impl<F: FloatSample, O: WireOrder> Default for Item32ToFloat<F, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FloatSample, O: WireOrder> Converter for Item32ToFloat<F, O> {
    fn set_scalar(&mut self, scalar: f64) {
        self.scalar = scalar;
    }

    fn convert(&mut self, inputs: &[InputBuffer<'_>], outputs: &mut [OutputBuffer<'_>], nsamps: usize) {
        let input = &inputs[0];
        let in_start = input.offset() * ITEM_BYTES;
        let src = &input.data()[in_start..in_start + nsamps * ITEM_BYTES];

        let out_offset = outputs[0].offset();
        let out_start = out_offset * F::BYTES * 2;
        let dst = &mut outputs[0].data()[out_start..out_start + nsamps * F::BYTES * 2];

        for (word, out) in src.chunks_exact(ITEM_BYTES).zip(dst.chunks_exact_mut(F::BYTES * 2)) {
            let (i, q) = split_item(O::to_host([word[0], word[1], word[2], word[3]]));
            F::store(i as f64 * self.scalar, &mut out[..F::BYTES]);
            F::store(q as f64 * self.scalar, &mut out[F::BYTES..]);
        }
    }
}

/// fc32 / fc64 -> sc16_item32, rounding and saturating
pub struct FloatToItem32<F, O> {
    scalar: f64,
    _marker: PhantomData<fn() -> (F, O)>,
}

impl<F: FloatSample, O: WireOrder> FloatToItem32<F, O> {
    pub fn new() -> Self {
        Self { scalar: 1.0, _marker: PhantomData }
    }
}

impl<F: FloatSample, O: WireOrder> Default for FloatToItem32<F, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FloatSample, O: WireOrder> Converter for FloatToItem32<F, O> {
    fn set_scalar(&mut self, scalar: f64) {
        self.scalar = scalar;
    }

    fn convert(&mut self, inputs: &[InputBuffer<'_>], outputs: &mut [OutputBuffer<'_>], nsamps: usize) {
        let input = &inputs[0];
        let in_start = input.offset() * F::BYTES * 2;
        let src = &input.data()[in_start..in_start + nsamps * F::BYTES * 2];

        let out_offset = outputs[0].offset();
        let out_start = out_offset * ITEM_BYTES;
        let dst = &mut outputs[0].data()[out_start..out_start + nsamps * ITEM_BYTES];

        for (sample, out) in src.chunks_exact(F::BYTES * 2).zip(dst.chunks_exact_mut(ITEM_BYTES)) {
            let i = round_saturate(F::load(&sample[..F::BYTES]) * self.scalar, 16) as i16;
            let q = round_saturate(F::load(&sample[F::BYTES..]) * self.scalar, 16) as i16;
            out.copy_from_slice(&O::to_wire(join_item(i, q)));
        }
    }
}

/// sc16_item32 -> host sc16. Integer copy, the scalar is ignored.
pub struct Item32ToSc16<O> {
    _marker: PhantomData<fn() -> O>,
}

impl<O: WireOrder> Item32ToSc16<O> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<O: WireOrder> Default for Item32ToSc16<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: WireOrder> Converter for Item32ToSc16<O> {
    fn set_scalar(&mut self, _scalar: f64) {}

    fn convert(&mut self, inputs: &[InputBuffer<'_>], outputs: &mut [OutputBuffer<'_>], nsamps: usize) {
        let input = &inputs[0];
        let in_start = input.offset() * ITEM_BYTES;
        let src = &input.data()[in_start..in_start + nsamps * ITEM_BYTES];

        let out_offset = outputs[0].offset();
        let out_start = out_offset * HOST_SC16_BYTES;
        let dst = &mut outputs[0].data()[out_start..out_start + nsamps * HOST_SC16_BYTES];

        for (word, out) in src.chunks_exact(ITEM_BYTES).zip(dst.chunks_exact_mut(HOST_SC16_BYTES)) {
            let (i, q) = split_item(O::to_host([word[0], word[1], word[2], word[3]]));
            out[..2].copy_from_slice(&i.to_ne_bytes());
            out[2..].copy_from_slice(&q.to_ne_bytes());
        }
    }
}

/// host sc16 -> sc16_item32
pub struct Sc16ToItem32<O> {
    _marker: PhantomData<fn() -> O>,
}

impl<O: WireOrder> Sc16ToItem32<O> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<O: WireOrder> Default for Sc16ToItem32<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: WireOrder> Converter for Sc16ToItem32<O> {
    fn set_scalar(&mut self, _scalar: f64) {}

    fn convert(&mut self, inputs: &[InputBuffer<'_>], outputs: &mut [OutputBuffer<'_>], nsamps: usize) {
        let input = &inputs[0];
        let in_start = input.offset() * HOST_SC16_BYTES;
        let src = &input.data()[in_start..in_start + nsamps * HOST_SC16_BYTES];

        let out_offset = outputs[0].offset();
        let out_start = out_offset * ITEM_BYTES;
        let dst = &mut outputs[0].data()[out_start..out_start + nsamps * ITEM_BYTES];

        for (sample, out) in src.chunks_exact(HOST_SC16_BYTES).zip(dst.chunks_exact_mut(ITEM_BYTES)) {
            let i = i16::from_ne_bytes([sample[0], sample[1]]);
            let q = i16::from_ne_bytes([sample[2], sample[3]]);
            out.copy_from_slice(&O::to_wire(join_item(i, q)));
        }
    }
}

fn register_order<O: WireOrder>(registry: &ConvertRegistry) {
    let otw = super::item32_format("sc16", O::ORDER);

    registry.register_converter(
        ConvertId::single(&otw, "fc32"),
        || Box::new(Item32ToFloat::<f32, O>::new()),
        PRIORITY_GENERAL,
    );
    registry.register_converter(
        ConvertId::single(&otw, "fc64"),
        || Box::new(Item32ToFloat::<f64, O>::new()),
        PRIORITY_GENERAL,
    );
    registry.register_converter(
        ConvertId::single("fc32", &otw),
        || Box::new(FloatToItem32::<f32, O>::new()),
        PRIORITY_GENERAL,
    );
    registry.register_converter(
        ConvertId::single("fc64", &otw),
        || Box::new(FloatToItem32::<f64, O>::new()),
        PRIORITY_GENERAL,
    );
    registry.register_converter(
        ConvertId::single(&otw, "sc16"),
        || Box::new(Item32ToSc16::<O>::new()),
        PRIORITY_GENERAL,
    );
    registry.register_converter(
        ConvertId::single("sc16", &otw),
        || Box::new(Sc16ToItem32::<O>::new()),
        PRIORITY_GENERAL,
    );
}

/// Register the general sc16_item32 converters for both byte orders
pub(crate) fn register(registry: &ConvertRegistry) {
    register_order::<BigEndian>(registry);
    register_order::<LittleEndian>(registry);
}
